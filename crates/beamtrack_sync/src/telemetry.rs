use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSection;

/// Installs the global fmt subscriber. `RUST_LOG` wins over the configured filter.
pub fn init_tracing(logging: &LoggingSection) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .map_err(|err| anyhow!("invalid log filter `{}`: {err}", logging.filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

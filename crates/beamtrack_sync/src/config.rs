use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use beamtrack_backend::HttpBackendConfig;
use serde::{Deserialize, Serialize};

use crate::pagination::{BEAMS_PER_PAGE, FILES_PER_PAGE};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    pub backend: HttpBackendConfig,
    pub polling: PollingSection,
    pub paging: PagingSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingSection {
    pub list_refresh_secs: u64,
    pub live_refresh_secs: u64,
    pub relative_time_secs: u64,
    pub debounce_ms: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            list_refresh_secs: 300,
            live_refresh_secs: 5,
            relative_time_secs: 60,
            debounce_ms: 250,
        }
    }
}

impl PollingSection {
    pub fn list_refresh(&self) -> Duration {
        Duration::from_secs(self.list_refresh_secs.max(1))
    }

    pub fn live_refresh(&self) -> Duration {
        Duration::from_secs(self.live_refresh_secs.max(1))
    }

    pub fn relative_time(&self) -> Duration {
        Duration::from_secs(self.relative_time_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PagingSection {
    pub beams_per_page: u32,
    pub files_per_page: u32,
}

impl Default for PagingSection {
    fn default() -> Self {
        Self {
            beams_per_page: BEAMS_PER_PAGE,
            files_per_page: FILES_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSection {
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("invalid config TOML at {}", path.display()))
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("failed to parse sync config")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::SyncConfig;

    #[test]
    fn missing_sections_take_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            [backend]
            base_url = "https://beams.example.com/api"
            auth_token = "token"

            [polling]
            live_refresh_secs = 2
            "#,
        )
        .expect("parse config");

        assert_eq!(config.backend.base_url, "https://beams.example.com/api");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.polling.live_refresh(), Duration::from_secs(2));
        assert_eq!(config.polling.list_refresh(), Duration::from_secs(300));
        assert_eq!(config.polling.debounce(), Duration::from_millis(250));
        assert_eq!(config.paging.beams_per_page, 50);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = SyncConfig::load("/nonexistent/beamtrack.toml").unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config file"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(SyncConfig::from_toml_str("[paging]\nbeams_per_page = \"many\"").is_err());
    }
}

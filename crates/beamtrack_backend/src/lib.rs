pub mod backend;
pub mod http;
pub mod memory;

pub use backend::BeamBackend;
pub use http::{ClientBuildError, HttpBackendConfig, HttpBeamBackend};
pub use memory::{InMemoryBeamBackend, Operation};

//! Pipeline error types.

use thiserror::Error;

/// Errors that can occur while loading a descriptor or running a build.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Descriptor could not be parsed or failed validation.
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// Runner configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed database URL in the descriptor environment.
    #[error("Invalid database URL: {0}")]
    DatabaseUrl(String),

    /// Service container could not be provisioned.
    #[error("Service error: {0}")]
    Service(String),

    /// Service did not accept connections in time.
    #[error("Service {service} not ready after {secs} seconds")]
    ServiceTimeout { service: String, secs: u64 },

    /// Process spawn error.
    #[error("Process error: {0}")]
    Process(String),

    /// YAML parse error.
    #[error("YAML error: {0}")]
    Yaml(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        PipelineError::Yaml(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Json(e.to_string())
    }
}

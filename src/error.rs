use miette::{Diagnostic, Result};
use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Schedule not found: {0}")]
    #[diagnostic(code(deskboard::not_found), help("No schedule has been configured yet"))]
    NotFound(String),

    #[error("Network error: {0}")]
    #[diagnostic(code(deskboard::network), help("The request can be retried later"))]
    Network(String),

    #[error("Request rejected: {0}")]
    #[diagnostic(code(deskboard::request_rejected))]
    RequestRejected(String),

    #[error("Failed to parse schedule: {0}")]
    #[diagnostic(code(deskboard::parse))]
    Parse(String),

    #[error("Persistence error: {0}")]
    #[diagnostic(code(deskboard::persistence))]
    Persistence(String),

    #[error("Environment error: {0}")]
    #[diagnostic(code(deskboard::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(deskboard::config))]
    Config(String),

    #[error("Component error: {0}")]
    #[diagnostic(code(deskboard::component))]
    Component(String),

    #[error(transparent)]
    #[diagnostic(code(deskboard::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(deskboard::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(deskboard::other))]
    Other(String),
}

impl Error {
    /// Whether a later attempt of the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

// Implement From for TOML deserialization errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type DashResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Invalid environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create component errors
pub fn component_error(message: &str) -> Error {
    Error::Component(message.to_string())
}

/// Helper to create parse errors
pub fn parse_error(message: &str) -> Error {
    Error::Parse(message.to_string())
}

/// Helper to create network errors
pub fn network_error(message: &str) -> Error {
    Error::Network(message.to_string())
}

/// Helper to create persistence errors
pub fn persistence_error(message: &str) -> Error {
    Error::Persistence(message.to_string())
}

/// Helper to create other errors
pub fn other_error(message: &str) -> Error {
    Error::Other(message.to_string())
}

//! Error types for the agent.

use thiserror::Error;

use gatekeeper_contracts::{AuditError, ValidationError};
use gatekeeper_providers::ProviderError;

/// Main error type for the agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Bad input shape or out-of-range field. Never retryable.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Typed failure raised by a database provider.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audit storage failure
    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    /// I/O error (file, stdin)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Uncategorised internal fault
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for AgentError
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<serde_yaml::Error> for AgentError {
    fn from(err: serde_yaml::Error) -> Self {
        AgentError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Validation(ValidationError::new("payload", err.to_string()))
    }
}

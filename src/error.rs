//! Domain-specific error types for judgment-mind

use thiserror::Error;

/// Main error type for the judgment pipeline and evolution engine
#[derive(Error, Debug)]
pub enum JudgmentError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Scheduling error: {message}")]
    Scheduling { message: String },

    #[error("Stage error: {stage}: {message}")]
    Stage { stage: String, message: String },

    #[error("Timeout error: {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl JudgmentError {
    /// Shorthand used by stage bodies to fail with a message.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        JudgmentError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for JudgmentError {
    fn from(err: anyhow::Error) -> Self {
        JudgmentError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for JudgmentError {
    fn from(err: serde_json::Error) -> Self {
        JudgmentError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for JudgmentError {
    fn from(err: std::io::Error) -> Self {
        JudgmentError::Persistence {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for JudgmentError {
    fn from(err: toml::de::Error) -> Self {
        JudgmentError::Config {
            message: format!("TOML parse error: {}", err),
        }
    }
}

/// Result type alias for judgment-mind operations
pub type Result<T> = std::result::Result<T, JudgmentError>;

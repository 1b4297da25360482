//! Error types for the data protection toolkit

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdeError {
    #[error("Personal Data Encryption is not supported or not enabled on this device")]
    NotEnabled,

    #[error("Invalid protected token: {0}")]
    InvalidToken(String),

    #[error("Buffer is not a protected buffer: {0}")]
    MalformedBuffer(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PdeError {
    /// Errors caused by what the user typed or picked rather than by the
    /// device or the service.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            PdeError::InvalidToken(_) | PdeError::MalformedBuffer(_) | PdeError::InvalidSelection(_)
        )
    }
}

impl From<base64::DecodeError> for PdeError {
    fn from(e: base64::DecodeError) -> Self {
        PdeError::InvalidToken(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PdeError>;

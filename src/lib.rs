pub mod integration;
pub mod playback;
pub mod speech;
pub mod sync;
pub mod vocab;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WordcastError {
    #[error("Narration cancelled")]
    Cancelled,

    #[error("Narration unsupported: {0}")]
    Unsupported(String),

    #[error("Narration driver error: {0}")]
    DriverError(String),

    #[error("Inter-record delay interrupted")]
    DelayInterrupted,

    #[error("Vocabulary error: {0}")]
    Vocabulary(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for WordcastError {
    fn from(e: std::io::Error) -> Self {
        WordcastError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for WordcastError {
    fn from(e: serde_json::Error) -> Self {
        WordcastError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for WordcastError {
    fn from(e: toml::de::Error) -> Self {
        WordcastError::Config(e.to_string())
    }
}

impl WordcastError {
    /// Superseded work. Expected during normal navigation and never surfaced.
    pub fn is_benign(&self) -> bool {
        matches!(self, WordcastError::Cancelled | WordcastError::DelayInterrupted)
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            WordcastError::Cancelled => true,
            WordcastError::DelayInterrupted => true,
            // No speech capability on this host; retrying cannot help
            WordcastError::Unsupported(_) => false,
            // The session is aborted but a manual resume may succeed
            WordcastError::DriverError(_) => true,
            WordcastError::Vocabulary(_) => true,
            WordcastError::Storage(_) => true,
            WordcastError::Serialization(_) => true,
            WordcastError::Config(_) => false,
            WordcastError::Channel(_) => false,
            WordcastError::Io(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            WordcastError::Cancelled | WordcastError::DelayInterrupted => {
                "Playback was interrupted.".to_string()
            }
            WordcastError::Unsupported(_) => {
                "Speech output is not available on this system.".to_string()
            }
            WordcastError::DriverError(_) => {
                "Speech playback failed. Press play to try again.".to_string()
            }
            WordcastError::Vocabulary(_) => "The word list could not be updated.".to_string(),
            WordcastError::Storage(_) => "Playback state could not be saved.".to_string(),
            WordcastError::Serialization(_) => "Stored data is malformed.".to_string(),
            WordcastError::Config(_) => "Configuration error. Please check settings.".to_string(),
            WordcastError::Channel(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            WordcastError::Io(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WordcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_classes() {
        assert!(WordcastError::Cancelled.is_benign());
        assert!(WordcastError::DelayInterrupted.is_benign());
        assert!(!WordcastError::DriverError("boom".into()).is_benign());
        assert!(!WordcastError::Unsupported("none".into()).is_benign());
    }

    #[test]
    fn test_unsupported_is_fatal() {
        assert!(!WordcastError::Unsupported("none".into()).is_recoverable());
        assert!(WordcastError::DriverError("glitch".into()).is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: WordcastError = io.into();
        assert!(matches!(err, WordcastError::Io(_)));
    }
}

//! Integrity Engine Error Types

use thiserror::Error;

/// Errors surfaced by the integrity engine
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Session is not known to the game-session registry
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Event kind string does not name a member of the closed event set
    #[error("Invalid event kind: {0}")]
    InvalidEventKind(String),

    /// The per-session actor is gone (session already ended or engine shutting down)
    #[error("Session '{0}' is no longer active")]
    SessionClosed(String),

    /// JSON payload error
    #[error("Payload error: {0}")]
    Payload(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Payload(e.to_string())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

use thiserror::Error;

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error taxonomy for the attendance reconciliation engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Record or employee does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Illegal workflow transition (e.g. deciding an already-decided record).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Caller-supplied input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Roster, repository or feed I/O failure.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A reload was superseded by newer data and discarded. Never user-visible;
    /// logged at debug and swallowed by the caller.
    #[error("stale write discarded: {0}")]
    StaleWrite(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => EngineError::NotFound(e.to_string()),
            other => EngineError::UpstreamUnavailable(other.to_string()),
        }
    }
}

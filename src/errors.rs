use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecapError {
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Failed to resolve channel: {0}")]
    ResolutionError(String),

    #[error("Failed to send HTTP request: {0}")]
    HttpError(String),

    #[error("Message source returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited by message source: {0}")]
    RateLimited(String),

    #[error("Failed to generate summary: {0}")]
    GenerationError(String),

    #[error("Failed to persist output: {0}")]
    PersistenceError(String),

    #[error("Failed to relay summary: {0}")]
    RelayError(String),

    #[error("Run lock unavailable: {0}")]
    LockError(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl RecapError {
    /// Network failures, rate limiting and 5xx answers may succeed on a later attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            RecapError::HttpError(_) | RecapError::RateLimited(_) => true,
            RecapError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RecapError {
    fn from(error: reqwest::Error) -> Self {
        RecapError::HttpError(error.to_string())
    }
}

impl From<serde_json::Error> for RecapError {
    fn from(error: serde_json::Error) -> Self {
        RecapError::PersistenceError(error.to_string())
    }
}

impl From<std::io::Error> for RecapError {
    fn from(error: std::io::Error) -> Self {
        RecapError::PersistenceError(error.to_string())
    }
}

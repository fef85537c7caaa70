use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrendsError {
    #[error("API Error: {message}")]
    ApiError { status: u16, message: String },
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Parse Error: {0}")]
    ParseError(String),
    #[error("Validation Error: {0}")]
    ValidationError(String),
    #[error("Rate Limit Error: {message}")]
    RateLimitError {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("Gateway Busy: {message}")]
    GatewayBusy {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("Network Error: {0}")]
    NetworkError(String),
    #[error("Storage Error: {0}")]
    StorageError(String),
    #[error("Job Failed: {0}")]
    JobFailed(String),
    #[error("Missing POESESSID. Please configure it in Settings.")]
    MissingCredential,
    #[error("Please select at least one item base type.")]
    EmptySelection,
}

impl TrendsError {
    /// Message suitable for showing to the user as-is.
    ///
    /// Server-reported errors are passed through verbatim, without the
    /// variant prefix used by `Display`.
    pub fn user_message(&self) -> String {
        match self {
            TrendsError::ApiError { message, .. }
            | TrendsError::RateLimitError { message, .. }
            | TrendsError::GatewayBusy { message, .. } => message.clone(),
            TrendsError::NotFound(msg) | TrendsError::JobFailed(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, TrendsError::MissingCredential | TrendsError::EmptySelection)
    }

    /// Process exit status: 2 for usage problems the user can fix locally, 1 otherwise.
    pub fn exit_status(&self) -> u8 {
        if self.is_precondition() {
            2
        } else {
            1
        }
    }
}

impl From<reqwest::Error> for TrendsError {
    fn from(err: reqwest::Error) -> Self {
        TrendsError::NetworkError(err.to_string())
    }
}

impl From<serde_json::Error> for TrendsError {
    fn from(err: serde_json::Error) -> Self {
        TrendsError::ParseError(err.to_string())
    }
}

impl From<sqlx::Error> for TrendsError {
    fn from(err: sqlx::Error) -> Self {
        TrendsError::StorageError(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for TrendsError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        TrendsError::StorageError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrendsError>;

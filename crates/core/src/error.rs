//! Core error taxonomy shared by every crate in the workspace.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("media not found: {id}")]
    NotFound { id: String },

    #[error("invalid quality profile: {profile}")]
    InvalidQualityProfile { profile: String },

    #[error("indexer error ({indexer}): {message}")]
    IndexerError { indexer: String, message: String },

    #[error("download client error ({client}): {message}")]
    DownloadClientError { client: String, message: String },

    #[error("validation error: {field} - {message}")]
    ValidationError { field: String, message: String },

    #[error("state transition rejected: {from} -> {to} ({reason})")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("request to {service} timed out after {elapsed_ms}ms")]
    Timeout { service: String, elapsed_ms: u64 },

    #[error("circuit breaker open for {service}")]
    CircuitBreakerOpen { service: String },

    #[error("external service error: {service} - {error}")]
    ExternalServiceError { service: String, error: String },

    #[error("database error: {message}")]
    DatabaseError { message: String },

    #[error("import error: {operation} - {message}")]
    ImportError { operation: String, message: String },

    #[error("no valid video file found in {path}")]
    NoValidVideo { path: String },

    #[error("filesystem error: {path} - {error}")]
    FileSystemError { path: String, error: String },

    #[error("configuration error: {field} - {message}")]
    ConfigurationError { field: String, message: String },

    #[error("parse error: {input} - {message}")]
    ParseError { input: String, message: String },

    #[error("release blocked: {reason}")]
    Blocked { reason: String },

    #[error("import blocked: {reason}")]
    ImportBlocked { reason: String },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last_error: Box<CoreError>,
    },

    #[error("temporary error: {message}")]
    TemporaryError { message: String },

    #[error("authentication required for {service}: {message}")]
    AuthenticationRequired { service: String, message: String },

    #[error("rate limited by {service}{extra}", extra = retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { service: String, retry_after: Option<u64> },

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl CoreError {
    /// Whether a retry policy of `Transient` should retry this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::NetworkError { .. }
                | CoreError::Timeout { .. }
                | CoreError::ExternalServiceError { .. }
                | CoreError::TemporaryError { .. }
                | CoreError::DatabaseError { .. }
                | CoreError::RateLimited { .. }
        )
    }

    /// Closed-vocabulary reason code for errors that carry one, suitable for
    /// recording as a `TrackedDownload` block/failure reason. `None` means
    /// the display string itself is the best available reason.
    pub fn reason_code(&self) -> Option<&str> {
        match self {
            CoreError::ImportBlocked { reason } => Some(reason.as_str()),
            CoreError::Blocked { reason } => Some(reason.as_str()),
            CoreError::NoValidVideo { .. } => Some(crate::models::download::reasons::NO_VALID_VIDEO),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CoreError::Timeout {
                service: err.url().map(|u| u.to_string()).unwrap_or_default(),
                elapsed_ms: 0,
            }
        } else {
            CoreError::NetworkError {
                message: err.to_string(),
            }
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::FileSystemError {
            path: String::new(),
            error: err.to_string(),
        }
    }
}

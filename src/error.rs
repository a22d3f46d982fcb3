use thiserror::Error;

use crate::models::Cooldown;

pub type AppResult<T> = Result<T, AppError>;

/// Error surface of the compliance core. `Configuration` and
/// `InvariantViolation` are non-retryable; `TransientStorage` propagates to the
/// caller without internal retries.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("permission denied by the object store: {0}")]
    PermissionDenied(String),

    #[error("daily upload quota exhausted ({count}/{limit})")]
    QuotaExceeded {
        count: i32,
        limit: i32,
        cooldown: Cooldown,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transient object store failure: {0}")]
    TransientStorage(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("database failure: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("database pool failure: {0}")]
    Pool(String),
}

impl AppError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn transient(message: impl ToString) -> Self {
        Self::TransientStorage(message.to_string())
    }

    /// True for failures a caller may retry wholesale; multi-step writes leave
    /// a recoverable midpoint, so re-running the operation is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_) | Self::Pool(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        Self::transient(value)
    }
}

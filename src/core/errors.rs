use thiserror::Error;

/// Failure taxonomy of the lesson-processing operations.
///
/// `NotFound` deliberately covers both "absent" and "outside the caller's
/// tenant" so cross-tenant existence never leaks through error kinds.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Resource not found")]
    NotFound,
    #[error("Operation not permitted for this actor")]
    Forbidden,
    #[error("Operation not legal in the current status: {0}")]
    InvalidState(String),
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Tenant context is missing")]
    ContextMissing,
    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl CoreError {
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState(detail.into())
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::ValidationFailed(detail.into())
    }
}

/// Classification of a background job failure.
///
/// Transient failures are retried by the dispatcher until attempts run out;
/// permanent ones drive the lesson to `Error` immediately.
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("transient failure: {0}")]
    Transient(#[source] anyhow::Error),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl JobFailure {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self::Transient(err.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent(reason.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// The reason recorded on the lesson when this failure ends processing.
    pub fn reason(&self) -> String {
        match self {
            Self::Transient(err) => err.to_string(),
            Self::Permanent(reason) => reason.clone(),
        }
    }
}

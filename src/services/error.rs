//! Error type shared by the domain services

/// Error types for service operations
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The requested row does not exist (or is not visible to the caller)
    #[error("{0}")]
    NotFound(String),

    /// Invalid input
    #[error("{0}")]
    ValidationError(String),

    /// The caller may not touch this resource
    #[error("{0}")]
    Forbidden(String),

    /// The request conflicts with the current state
    #[error("{0}")]
    Conflict(String),

    /// A required integration is not configured
    #[error("{0}")]
    Unavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn not_found(what: &str) -> Self {
        ServiceError::NotFound(format!("{} not found", what))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::ValidationError(message.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

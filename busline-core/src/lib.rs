pub mod booking;
pub mod events;
pub mod fleet;
pub mod hold;
pub mod payment;
pub mod repository;
pub mod rules;
pub mod schedule;
pub mod search;
pub mod user;
pub mod validation;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Payment gateway error: {0}")]
    Payment(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

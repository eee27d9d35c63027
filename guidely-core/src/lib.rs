pub mod events;
pub mod models;
pub mod repository;

pub use models::{
    AccountRole, BookingRequest, BookingStatus, Message, NewBookingRequest, NewMessage,
    NewNotification, Notification, NotificationKind, SenderType, TripDetails, TripInput,
};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Storage unavailable: {0}")]
    TransientIo(String),
}

impl CoreError {
    /// Only store failures may be retried by the caller, and then only as a whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::TransientIo(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

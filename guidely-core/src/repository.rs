use async_trait::async_trait;

use crate::models::{
    AccountRole, BookingRequest, BookingStatus, Message, NewBookingRequest, NewMessage,
    NewNotification, Notification,
};

pub type RepoError = Box<dyn std::error::Error + Send + Sync>;
pub type RepoResult<T> = Result<T, RepoError>;

/// Builds the notification that must be committed together with a write.
/// It receives the row as stored, so store-assigned ids are available.
pub type NoticeFn<'a, T> = &'a (dyn Fn(&T) -> NewNotification + Send + Sync);

/// Repository trait for guide-booking requests
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Inserts a `pending` booking and the notification built from it in one commit.
    async fn create_booking(
        &self,
        booking: &NewBookingRequest,
        notice: NoticeFn<'_, BookingRequest>,
    ) -> RepoResult<(BookingRequest, Notification)>;

    async fn get_booking(&self, id: i64) -> RepoResult<Option<BookingRequest>>;

    /// Most recent first.
    async fn list_by_requester(&self, user_id: i64) -> RepoResult<Vec<BookingRequest>>;

    /// Most recent first.
    async fn list_by_guide(&self, guide_id: i64) -> RepoResult<Vec<BookingRequest>>;

    /// Sets `next` only if the stored status still equals `expected`, writing the
    /// notification in the same commit. `None` means the status had moved on and
    /// nothing was written.
    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: BookingStatus,
        next: BookingStatus,
        notice: NoticeFn<'_, BookingRequest>,
    ) -> RepoResult<Option<(BookingRequest, Notification)>>;
}

/// Repository trait for per-user notifications
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create_notification(&self, notification: &NewNotification) -> RepoResult<Notification>;

    async fn get_notification(&self, id: i64) -> RepoResult<Option<Notification>>;

    /// Newest first.
    async fn list_for_user(&self, user_id: i64, unread_only: bool) -> RepoResult<Vec<Notification>>;

    async fn unread_count(&self, user_id: i64) -> RepoResult<i64>;

    /// Returns false when no notification has this id. Already-read rows count as found.
    async fn mark_read(&self, id: i64) -> RepoResult<bool>;

    /// Returns how many notifications flipped from unread to read.
    async fn mark_all_read(&self, user_id: i64) -> RepoResult<u64>;
}

/// Repository trait for booking chat history
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Appends the message and the recipient's notification in one commit.
    async fn append_message(
        &self,
        message: &NewMessage,
        notice: NoticeFn<'_, Message>,
    ) -> RepoResult<(Message, Notification)>;

    /// Oldest first.
    async fn list_by_booking(&self, booking_id: i64) -> RepoResult<Vec<Message>>;
}

/// Read-only view over platform accounts
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn role_of(&self, user_id: i64) -> RepoResult<Option<AccountRole>>;
}

use guidely_core::repository::NotificationRepository;
use guidely_core::{
    BookingRequest, BookingStatus, CoreError, CoreResult, Message, NewNotification, Notification,
    NotificationKind,
};
use std::sync::Arc;
use tracing::{error, info};

/// Notification sent to the guide when a traveler asks for them.
pub fn booking_request_notice(booking: &BookingRequest) -> NewNotification {
    NewNotification {
        user_id: booking.guide_id,
        kind: NotificationKind::BookingRequest,
        title: "New booking request".to_string(),
        message: format!(
            "You have a new booking request for {} on {} ({} traveler{}).",
            booking.trip.destination,
            booking.trip.date,
            booking.trip.travelers,
            if booking.trip.travelers == 1 { "" } else { "s" }
        ),
        related_id: booking.id,
    }
}

/// Notification sent to the traveler once the guide has answered.
/// Only meaningful for terminal statuses.
pub fn decision_notice(booking: &BookingRequest) -> NewNotification {
    let (kind, title, verb) = match booking.status {
        BookingStatus::Declined => (NotificationKind::BookingDeclined, "Booking declined", "declined"),
        _ => (NotificationKind::BookingAccepted, "Booking accepted", "accepted"),
    };

    NewNotification {
        user_id: booking.requester_id,
        kind,
        title: title.to_string(),
        message: format!(
            "Your booking request for {} on {} has been {}.",
            booking.trip.destination, booking.trip.date, verb
        ),
        related_id: booking.id,
    }
}

/// Notification sent to the other party of the booking when a message arrives.
pub fn message_notice(booking: &BookingRequest, message: &Message) -> NewNotification {
    let recipient = booking.counterpart_of(message.sender_id).unwrap_or(booking.requester_id);
    let from = match message.sender_type {
        guidely_core::SenderType::Guide => "your guide",
        guidely_core::SenderType::User => "your traveler",
    };

    NewNotification {
        user_id: recipient,
        kind: NotificationKind::NewMessage,
        title: "New message".to_string(),
        message: format!("You have a new message from {} about {}.", from, booking.trip.destination),
        related_id: booking.id,
    }
}

pub(crate) fn store_failure(op: &str, e: impl std::fmt::Display) -> CoreError {
    error!("{} failed: {}", op, e);
    CoreError::TransientIo(format!("{} failed", op))
}

/// Per-user notification inbox
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    pub fn new(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { notifications }
    }

    /// Writes a standalone notification. Booking and message writes do not go
    /// through here; their notifications commit inside the store call itself.
    pub async fn emit(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: &str,
        message: &str,
        related_id: i64,
    ) -> CoreResult<Notification> {
        let notification = self
            .notifications
            .create_notification(&NewNotification {
                user_id,
                kind,
                title: title.to_string(),
                message: message.to_string(),
                related_id,
            })
            .await
            .map_err(|e| store_failure("create notification", e))?;

        info!("Notification {} ({}) emitted to user {}", notification.id, kind.as_str(), user_id);
        Ok(notification)
    }

    pub async fn list_for_user(&self, user_id: i64, unread_only: bool) -> CoreResult<Vec<Notification>> {
        self.notifications
            .list_for_user(user_id, unread_only)
            .await
            .map_err(|e| store_failure("list notifications", e))
    }

    pub async fn unread_count(&self, user_id: i64) -> CoreResult<i64> {
        self.notifications
            .unread_count(user_id)
            .await
            .map_err(|e| store_failure("count unread notifications", e))
    }

    /// Idempotent: an already-read notification is a successful no-op.
    pub async fn mark_read(&self, notification_id: i64, user_id: i64) -> CoreResult<Notification> {
        let mut notification = self
            .notifications
            .get_notification(notification_id)
            .await
            .map_err(|e| store_failure("get notification", e))?
            .ok_or_else(|| CoreError::NotFound(format!("notification {}", notification_id)))?;

        if notification.user_id != user_id {
            return Err(CoreError::Unauthorized(format!(
                "notification {} belongs to another user",
                notification_id
            )));
        }

        if notification.is_read {
            return Ok(notification);
        }

        let found = self
            .notifications
            .mark_read(notification_id)
            .await
            .map_err(|e| store_failure("mark notification read", e))?;
        if !found {
            return Err(CoreError::NotFound(format!("notification {}", notification_id)));
        }

        notification.is_read = true;
        Ok(notification)
    }

    pub async fn mark_all_read(&self, user_id: i64) -> CoreResult<u64> {
        self.notifications
            .mark_all_read(user_id)
            .await
            .map_err(|e| store_failure("mark all notifications read", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guidely_store::MemoryStore;

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let service = NotificationService::new(store.clone());

        let n = service
            .emit(42, NotificationKind::BookingAccepted, "Booking accepted", "Kyoto", 5)
            .await
            .unwrap();
        assert_eq!(service.unread_count(42).await.unwrap(), 1);

        let first = service.mark_read(n.id, 42).await.unwrap();
        let second = service.mark_read(n.id, 42).await.unwrap();

        assert!(first.is_read && second.is_read);
        assert_eq!(service.unread_count(42).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_checks_recipient_and_existence() {
        let store = Arc::new(MemoryStore::new());
        let service = NotificationService::new(store.clone());

        let n = service
            .emit(42, NotificationKind::NewMessage, "New message", "hi", 5)
            .await
            .unwrap();

        assert!(matches!(service.mark_read(n.id, 7).await, Err(CoreError::Unauthorized(_))));
        assert!(matches!(service.mark_read(999, 42).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unread_filter_and_mark_all() {
        let store = Arc::new(MemoryStore::new());
        let service = NotificationService::new(store.clone());

        for related in 1..=3 {
            service
                .emit(7, NotificationKind::BookingRequest, "New booking request", "x", related)
                .await
                .unwrap();
        }
        let newest = service.list_for_user(7, false).await.unwrap();
        assert_eq!(newest.len(), 3);
        assert_eq!(newest[0].related_id, 3);

        service.mark_read(newest[0].id, 7).await.unwrap();
        assert_eq!(service.list_for_user(7, true).await.unwrap().len(), 2);

        assert_eq!(service.mark_all_read(7).await.unwrap(), 2);
        assert_eq!(service.mark_all_read(7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_emit_surfaces_store_outage_as_transient() {
        let store = Arc::new(MemoryStore::new());
        store.fail_notification_writes(true);
        let service = NotificationService::new(store);

        let err = service
            .emit(7, NotificationKind::BookingRequest, "t", "m", 1)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}

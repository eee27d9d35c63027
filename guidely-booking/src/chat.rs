use chrono::Utc;
use guidely_core::events::{publish_best_effort, EventPublisher};
use guidely_core::models::MAX_MESSAGE_LEN;
use guidely_core::repository::{BookingRepository, MessageRepository};
use guidely_core::{BookingRequest, CoreError, CoreResult, Message, NewMessage};
use guidely_shared::events::{topics, MessageSentEvent};
use guidely_shared::Masked;
use std::sync::Arc;
use tracing::info;

use crate::notices::{message_notice, store_failure};

/// Persists booking chat. The relay only mirrors; this is the record.
pub struct ChatService {
    bookings: Arc<dyn BookingRepository>,
    messages: Arc<dyn MessageRepository>,
    events: Arc<dyn EventPublisher>,
}

impl ChatService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        messages: Arc<dyn MessageRepository>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { bookings, messages, events }
    }

    pub async fn post_message(&self, booking_id: i64, sender_id: i64, body: &str) -> CoreResult<Message> {
        let body = body.trim();
        if body.is_empty() {
            return Err(CoreError::Validation("message body is required".to_string()));
        }
        if body.chars().count() > MAX_MESSAGE_LEN {
            return Err(CoreError::Validation(format!(
                "message body must be at most {} characters",
                MAX_MESSAGE_LEN
            )));
        }

        let booking = self.party_booking(booking_id, sender_id).await?;
        let sender_type = booking
            .sender_type_of(sender_id)
            .ok_or_else(|| CoreError::Unauthorized(format!("user {} cannot post here", sender_id)))?;

        let notice = |m: &Message| message_notice(&booking, m);
        let (message, notification) = self
            .messages
            .append_message(
                &NewMessage {
                    booking_id,
                    sender_id,
                    sender_type,
                    body: Masked(body.to_string()),
                },
                &notice,
            )
            .await
            .map_err(|e| store_failure("append message", e))?;

        info!(
            "Message {} posted to booking {} by {} {} (notification {} to user {})",
            message.id,
            booking_id,
            sender_type.as_str(),
            sender_id,
            notification.id,
            notification.user_id
        );

        publish_best_effort(
            self.events.as_ref(),
            topics::MESSAGE_SENT,
            &booking_id.to_string(),
            &MessageSentEvent {
                message_id: message.id,
                booking_id,
                sender_id,
                recipient_id: notification.user_id,
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

        Ok(message)
    }

    /// Full history, oldest first. Parties only.
    pub async fn list_messages(&self, booking_id: i64, viewer_id: i64) -> CoreResult<Vec<Message>> {
        self.party_booking(booking_id, viewer_id).await?;

        self.messages
            .list_by_booking(booking_id)
            .await
            .map_err(|e| store_failure("list messages", e))
    }

    async fn party_booking(&self, booking_id: i64, user_id: i64) -> CoreResult<BookingRequest> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await
            .map_err(|e| store_failure("get booking", e))?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))?;

        if !booking.is_party(user_id) {
            return Err(CoreError::Unauthorized(format!(
                "user {} is not a party to booking {}",
                user_id, booking_id
            )));
        }
        Ok(booking)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guidely_core::repository::{MessageRepository, NoticeFn, RepoError, RepoResult};
use guidely_core::{Message, NewMessage, Notification};
use guidely_shared::Masked;
use sqlx::PgPool;

use crate::notification_repo::insert_notification;

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MESSAGE_COLUMNS: &str = "id, booking_id, sender_id, sender_type, body, message_type, created_at";

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    booking_id: i64,
    sender_id: i64,
    sender_type: String,
    body: String,
    message_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = RepoError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            booking_id: row.booking_id,
            sender_id: row.sender_id,
            sender_type: row.sender_type.parse()?,
            body: Masked(row.body),
            message_type: row.message_type,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append_message(
        &self,
        message: &NewMessage,
        notice: NoticeFn<'_, Message>,
    ) -> RepoResult<(Message, Notification)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages (booking_id, sender_id, sender_type, body, message_type) \
             VALUES ($1, $2, $3, $4, 'text') RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(message.booking_id)
        .bind(message.sender_id)
        .bind(message.sender_type.as_str())
        .bind(message.body.expose())
        .fetch_one(&mut *tx)
        .await?;

        let stored = Message::try_from(row)?;
        let notification = insert_notification(&mut tx, &notice(&stored)).await?;

        tx.commit().await?;

        Ok((stored, notification))
    }

    async fn list_by_booking(&self, booking_id: i64) -> RepoResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {} FROM messages WHERE booking_id = $1 ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }
}

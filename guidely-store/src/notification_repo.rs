use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guidely_core::repository::{NotificationRepository, RepoError, RepoResult};
use guidely_core::{NewNotification, Notification};
use sqlx::{PgConnection, PgPool};

pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, type, title, message, related_id, is_read, created_at";

#[derive(sqlx::FromRow)]
pub(crate) struct NotificationRow {
    id: i64,
    user_id: i64,
    #[sqlx(rename = "type")]
    kind: String,
    title: String,
    message: String,
    related_id: i64,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = RepoError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind.parse()?,
            title: row.title,
            message: row.message,
            related_id: row.related_id,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

/// Inserts on the given connection so callers can share their transaction.
pub(crate) async fn insert_notification(
    conn: &mut PgConnection,
    notification: &NewNotification,
) -> RepoResult<Notification> {
    let row = sqlx::query_as::<_, NotificationRow>(&format!(
        "INSERT INTO notifications (user_id, type, title, message, related_id) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {}",
        NOTIFICATION_COLUMNS
    ))
    .bind(notification.user_id)
    .bind(notification.kind.as_str())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.related_id)
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create_notification(&self, notification: &NewNotification) -> RepoResult<Notification> {
        let mut conn = self.pool.acquire().await?;
        insert_notification(&mut conn, notification).await
    }

    async fn get_notification(&self, id: i64) -> RepoResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {} FROM notifications WHERE id = $1",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Notification::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: i64, unread_only: bool) -> RepoResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {} FROM notifications \
             WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE) \
             ORDER BY created_at DESC, id DESC",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn unread_count(&self, user_id: i64) -> RepoResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_read(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: i64) -> RepoResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

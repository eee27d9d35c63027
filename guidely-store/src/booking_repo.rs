use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use guidely_core::repository::{BookingRepository, NoticeFn, RepoError, RepoResult};
use guidely_core::{BookingRequest, BookingStatus, NewBookingRequest, Notification, TripDetails};
use sqlx::PgPool;

use crate::notification_repo::insert_notification;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BOOKING_COLUMNS: &str = "id, requester_id, guide_id, destination, trip_date, trip_time, \
     duration, travelers, budget, special_requests, status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    requester_id: i64,
    guide_id: i64,
    destination: String,
    trip_date: NaiveDate,
    trip_time: Option<String>,
    duration: Option<String>,
    travelers: i32,
    budget: Option<String>,
    special_requests: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for BookingRequest {
    type Error = RepoError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(BookingRequest {
            id: row.id,
            requester_id: row.requester_id,
            guide_id: row.guide_id,
            trip: TripDetails {
                destination: row.destination,
                date: row.trip_date,
                time: row.trip_time,
                duration: row.duration,
                travelers: row.travelers,
                budget: row.budget,
                special_requests: row.special_requests,
            },
            status: row.status.parse::<BookingStatus>()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create_booking(
        &self,
        booking: &NewBookingRequest,
        notice: NoticeFn<'_, BookingRequest>,
    ) -> RepoResult<(BookingRequest, Notification)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            INSERT INTO guide_bookings (requester_id, guide_id, destination, trip_date, trip_time, duration, travelers, budget, special_requests, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(booking.requester_id)
        .bind(booking.guide_id)
        .bind(&booking.trip.destination)
        .bind(booking.trip.date)
        .bind(booking.trip.time.as_deref())
        .bind(booking.trip.duration.as_deref())
        .bind(booking.trip.travelers)
        .bind(booking.trip.budget.as_deref())
        .bind(booking.trip.special_requests.as_deref())
        .bind(BookingStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let created = BookingRequest::try_from(row)?;
        let notification = insert_notification(&mut tx, &notice(&created)).await?;

        tx.commit().await?;

        Ok((created, notification))
    }

    async fn get_booking(&self, id: i64) -> RepoResult<Option<BookingRequest>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM guide_bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BookingRequest::try_from).transpose()
    }

    async fn list_by_requester(&self, user_id: i64) -> RepoResult<Vec<BookingRequest>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM guide_bookings WHERE requester_id = $1 ORDER BY created_at DESC, id DESC",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BookingRequest::try_from).collect()
    }

    async fn list_by_guide(&self, guide_id: i64) -> RepoResult<Vec<BookingRequest>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM guide_bookings WHERE guide_id = $1 ORDER BY created_at DESC, id DESC",
            BOOKING_COLUMNS
        ))
        .bind(guide_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BookingRequest::try_from).collect()
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: BookingStatus,
        next: BookingStatus,
        notice: NoticeFn<'_, BookingRequest>,
    ) -> RepoResult<Option<(BookingRequest, Notification)>> {
        let mut tx = self.pool.begin().await?;

        // Conditional update: concurrent callers serialize on the row lock and
        // only the first sees status = expected.
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE guide_bookings SET status = $1, updated_at = NOW() \
             WHERE id = $2 AND status = $3 RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(next.as_str())
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let updated = BookingRequest::try_from(row)?;
        let notification = insert_notification(&mut tx, &notice(&updated)).await?;

        tx.commit().await?;

        Ok(Some((updated, notification)))
    }
}

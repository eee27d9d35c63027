use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use guidely_core::{AccountRole, BookingRequest, BookingStatus, TripInput};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub guide_id: i64,
    #[serde(flatten)]
    pub trip: TripInput,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/bookings
/// The caller becomes the requester.
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingRequest>), AppError> {
    let Json(req) = payload?;

    let booking = state
        .bookings
        .create_booking(user.user_id, req.guide_id, req.trip)
        .await?;
    state.metrics.bookings_created.inc();

    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /v1/bookings
pub async fn list_my_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<BookingRequest>>, AppError> {
    Ok(Json(state.bookings.list_for_user(user.user_id).await?))
}

/// GET /v1/guide/bookings
pub async fn list_guide_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<BookingRequest>>, AppError> {
    if user.role != AccountRole::Guide {
        return Err(AppError::AuthorizationError("Guide role required".to_string()));
    }
    Ok(Json(state.bookings.list_for_guide(user.user_id).await?))
}

/// GET /v1/bookings/{id}
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(booking_id): Path<i64>,
) -> Result<Json<BookingRequest>, AppError> {
    Ok(Json(state.bookings.get_booking(booking_id, user.user_id).await?))
}

/// PATCH /v1/bookings/{id}/status
/// Guide answers a pending request with `accepted` or `declined`.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(booking_id): Path<i64>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<BookingRequest>, AppError> {
    let Json(req) = payload?;

    let result = state
        .bookings
        .transition_status(booking_id, req.status, user.user_id)
        .await;

    let outcome = match &result {
        Ok(booking) => booking.status.as_str(),
        Err(_) => "refused",
    };
    state.metrics.status_transitions.with_label_values(&[outcome]).inc();

    Ok(Json(result?))
}

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use guidely_core::Message;
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub body: String,
}

/// GET /v1/bookings/{id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(booking_id): Path<i64>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(state.chat.list_messages(booking_id, user.user_id).await?))
}

/// POST /v1/bookings/{id}/messages
/// Persists the message; clients mirror it to the room over the relay themselves.
pub async fn post_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(booking_id): Path<i64>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let Json(req) = payload?;

    let message = state.chat.post_message(booking_id, user.user_id, &req.body).await?;
    state.metrics.messages_posted.inc();

    Ok((StatusCode::CREATED, Json(message)))
}

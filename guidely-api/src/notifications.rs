use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use guidely_core::Notification;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

/// GET /v1/notifications?unread=true
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(state.notifications.list_for_user(user.user_id, query.unread).await?))
}

/// GET /v1/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let count = state.notifications.unread_count(user.user_id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// POST /v1/notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(notification_id): Path<i64>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(state.notifications.mark_read(notification_id, user.user_id).await?))
}

/// POST /v1/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    let updated = state.notifications.mark_all_read(user.user_id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

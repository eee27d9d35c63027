use axum::{
    http::Method,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod error;
pub mod messages;
pub mod metrics;
pub mod middleware;
pub mod notifications;
pub mod realtime;
pub mod state;

pub use state::{AppState, AuthConfig, Backends, Limits};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let authenticated = Router::new()
        .route("/v1/bookings", post(bookings::create_booking).get(bookings::list_my_bookings))
        .route("/v1/guide/bookings", get(bookings::list_guide_bookings))
        .route("/v1/bookings/{id}", get(bookings::get_booking))
        .route("/v1/bookings/{id}/status", patch(bookings::update_status))
        .route(
            "/v1/bookings/{id}/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route("/v1/notifications", get(notifications::list_notifications))
        .route("/v1/notifications/unread-count", get(notifications::unread_count))
        .route("/v1/notifications/{id}/read", post(notifications::mark_read))
        .route("/v1/notifications/read-all", post(notifications::mark_all_read))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(authenticated)
        .route("/v1/ws", get(realtime::ws_handler))
        .route("/health", get(health))
        .route("/metrics", get(metrics::render))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        // Outermost, so 429s and every other early response carry CORS headers.
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

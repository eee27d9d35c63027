use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    pub bookings_created: IntCounter,
    /// Labelled by `outcome`: `accepted`, `declined` or `refused`.
    pub status_transitions: IntCounterVec,
    pub messages_posted: IntCounter,
    /// Frames delivered to relay peers, one per recipient.
    pub relay_frames_delivered: IntCounter,
    pub relay_connections: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("guidely".to_string()), None)?;

        let bookings_created = IntCounter::new("bookings_created_total", "Booking requests created")?;
        let status_transitions = IntCounterVec::new(
            Opts::new("booking_status_transitions_total", "Booking status change attempts by outcome"),
            &["outcome"],
        )?;
        let messages_posted = IntCounter::new("messages_posted_total", "Chat messages persisted")?;
        let relay_frames_delivered =
            IntCounter::new("relay_frames_delivered_total", "Relay frames queued to peer connections")?;
        let relay_connections = IntGauge::new("relay_connections", "Live relay connections")?;

        registry.register(Box::new(bookings_created.clone()))?;
        registry.register(Box::new(status_transitions.clone()))?;
        registry.register(Box::new(messages_posted.clone()))?;
        registry.register(Box::new(relay_frames_delivered.clone()))?;
        registry.register(Box::new(relay_connections.clone()))?;

        Ok(Self {
            registry,
            bookings_created,
            status_transitions,
            messages_posted,
            relay_frames_delivered,
            relay_connections,
        })
    }

    pub fn encode(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::InternalServerError(format!("Metrics encoding failed: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| AppError::InternalServerError(format!("Metrics encoding failed: {}", e)))
    }
}

/// GET /metrics
pub async fn render(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.encode()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposition_contains_namespaced_series() {
        let metrics = Metrics::new().unwrap();
        metrics.bookings_created.inc();
        metrics.status_transitions.with_label_values(&["accepted"]).inc();
        metrics.relay_connections.set(3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("guidely_bookings_created_total 1"));
        assert!(text.contains(r#"guidely_booking_status_transitions_total{outcome="accepted"} 1"#));
        assert!(text.contains("guidely_relay_connections 3"));
    }
}

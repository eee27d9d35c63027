use async_trait::async_trait;
use serde::Serialize;

use crate::repository::RepoResult;

/// Outbound domain events. Publication happens after the store commit and is best effort.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> RepoResult<()>;
}

/// Used when no broker is configured.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _topic: &str, _key: &str, _payload: &str) -> RepoResult<()> {
        Ok(())
    }
}

/// Serializes and publishes, logging instead of failing. The caller's operation has already committed.
pub async fn publish_best_effort<E: Serialize>(
    publisher: &dyn EventPublisher,
    topic: &str,
    key: &str,
    event: &E,
) {
    let payload = match serde_json::to_string(event) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Failed to serialize event for {}: {}", topic, e);
            return;
        }
    };

    if let Err(e) = publisher.publish(topic, key, &payload).await {
        tracing::warn!("Failed to publish {} for key {}: {}", topic, key, e);
    }
}

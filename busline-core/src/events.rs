use async_trait::async_trait;

use crate::CoreResult;

/// Outbound domain events (booking confirmed, cancelled, holds).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> CoreResult<()>;
}

/// Serializes and publishes, logging instead of failing the caller.
pub async fn publish_json<T: serde::Serialize + Sync>(
    publisher: &dyn EventPublisher,
    topic: &str,
    key: &str,
    event: &T,
) {
    let payload = match serde_json::to_string(event) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Failed to serialize event for {}: {}", topic, e);
            return;
        }
    };
    if let Err(e) = publisher.publish(topic, key, &payload).await {
        tracing::warn!("Event publish to {} failed: {}", topic, e);
    }
}

use async_trait::async_trait;
use tracing::info;

use busline_core::events::EventPublisher;
use busline_core::CoreResult;

#[cfg(feature = "kafka")]
pub use kafka::EventProducer;

/// Publisher used when no broker is configured: events go to the log.
#[derive(Clone, Default)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> CoreResult<()> {
        info!(topic, key, "event: {}", payload);
        Ok(())
    }
}

#[cfg(feature = "kafka")]
mod kafka {
    use std::time::Duration;

    use async_trait::async_trait;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use tracing::{error, info};

    use busline_core::events::EventPublisher;
    use busline_core::{CoreError, CoreResult};

    #[derive(Clone)]
    pub struct EventProducer {
        producer: FutureProducer,
    }

    impl EventProducer {
        pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()?;

            Ok(Self { producer })
        }
    }

    #[async_trait]
    impl EventPublisher for EventProducer {
        async fn publish(&self, topic: &str, key: &str, payload: &str) -> CoreResult<()> {
            let record = FutureRecord::to(topic).key(key).payload(payload);

            match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                Ok(delivery) => {
                    info!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                    Ok(())
                }
                Err((e, _msg)) => {
                    error!("Failed to send message to {}: {}", topic, e);
                    Err(CoreError::Internal(format!("Kafka: {}", e)))
                }
            }
        }
    }
}

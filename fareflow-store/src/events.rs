use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

/// Fire-and-forget publisher for order lifecycle events
/// (`order.created`, `order.confirmed`, `order.cancelled`).
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

    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    topic,
                    key,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "event published"
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!(topic, key, error = %e, "failed to publish event");
                Err(e)
            }
        }
    }

    /// Serialize and publish, keyed by order reference. Serialization
    /// problems are logged and swallowed; eventing never blocks a booking.
    pub async fn publish_event<T: Serialize>(&self, topic: &str, key: &str, event: &T) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                let _ = self.publish(topic, key, &payload).await;
            }
            Err(e) => error!(topic, key, error = %e, "failed to serialize event"),
        }
    }
}

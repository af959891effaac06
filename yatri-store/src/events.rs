use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, error};

use yatri_domain::ChangeEvent;

/// Kafka mirror of the change feed. Publishing is fire-and-forget: a broker
/// fault or an unencodable event never fails the mutation that produced it.
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

    /// Mirror one change event to its topic, keyed by bus so same-bus events
    /// land on one partition in write order.
    pub async fn publish(&self, event: &ChangeEvent) -> Result<(), rdkafka::error::KafkaError> {
        let topic = event.topic();
        let key = event.bus_id.to_string();
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to encode change event for {}: {}", topic, e);
                return Ok(());
            }
        };

        let record = FutureRecord::to(topic).key(&key).payload(&payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(0)))
            .await
        {
            Ok(delivery) => {
                debug!(
                    "Sent event to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send event to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

use std::sync::Arc;

use tokio::sync::broadcast;

use yatri_domain::ChangeEvent;
use yatri_store::EventProducer;

/// Best-effort fan-out of lease and booking mutations. In-process
/// subscribers get a broadcast receiver (the SSE layer filters by bus);
/// each event is also mirrored to Kafka when a producer is attached.
/// Publishing never blocks or fails the mutation that produced the event.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
    kafka: Option<Arc<EventProducer>>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, kafka: None }
    }

    pub fn with_kafka(mut self, producer: Arc<EventProducer>) -> Self {
        self.kafka = Some(producer);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ChangeEvent) {
        if let Some(kafka) = &self.kafka {
            let kafka = Arc::clone(kafka);
            let mirrored = event.clone();
            tokio::spawn(async move {
                let _ = kafka.publish(&mirrored).await;
            });
        }

        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }

    pub fn publish_all<I: IntoIterator<Item = ChangeEvent>>(&self, events: I) {
        for event in events {
            self.publish(event);
        }
    }
}

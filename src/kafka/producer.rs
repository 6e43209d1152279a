use crate::{config::KafkaConfig, error::PublishError, Error, Result};
use async_trait::async_trait;
use futures::channel::oneshot::Canceled;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use rdkafka::producer::future_producer::OwnedDeliveryResult;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// An encoded record on its way to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    pub topic: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub timestamp_ms: i64,
}

/// Buffers records and delivers them to the broker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hands `record` to the local buffer without waiting for delivery.
    fn enqueue(&self, record: PublishRecord) -> std::result::Result<(), PublishError>;

    /// Waits until every buffered record is acknowledged or has failed.
    /// Returns the number of records delivered since the previous flush.
    async fn flush(&self, timeout: Duration) -> std::result::Result<usize, PublishError>;
}

/// Delivery reports collected since the last flush. Reports that have
/// already resolved are reaped on every push so that only in-flight
/// records are held.
struct Deliveries<F> {
    pending: FuturesUnordered<F>,
    delivered: usize,
    failed: usize,
    last_error: Option<String>,
}

impl<F> Default for Deliveries<F> {
    fn default() -> Self {
        Self {
            pending: FuturesUnordered::new(),
            delivered: 0,
            failed: 0,
            last_error: None,
        }
    }
}

impl<F> Deliveries<F>
where
    F: Future<Output = std::result::Result<OwnedDeliveryResult, Canceled>>,
{
    fn push(&mut self, delivery: F) {
        self.reap();
        self.pending.push(delivery);
    }

    fn in_flight(&self) -> usize {
        self.pending.len()
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.delivered == 0 && self.failed == 0
    }

    fn reap(&mut self) {
        while let Some(Some(result)) = self.pending.next().now_or_never() {
            self.record(result);
        }
    }

    fn record(&mut self, result: std::result::Result<OwnedDeliveryResult, Canceled>) {
        let error = match result {
            Ok(Ok(_)) => {
                self.delivered += 1;
                return;
            }
            Ok(Err((e, _message))) => e.to_string(),
            Err(Canceled) => "delivery report was dropped".to_string(),
        };
        warn!("Record delivery failed: {}", error);
        self.failed += 1;
        self.last_error = Some(error);
    }

    /// Waits for the remaining reports until `deadline`. Reports still
    /// outstanding at the deadline count as failed.
    async fn settle(mut self, deadline: Instant) -> std::result::Result<usize, PublishError> {
        let drained = tokio::time::timeout_at(deadline, async {
            while let Some(result) = self.pending.next().await {
                self.record(result);
            }
        })
        .await;

        if drained.is_err() {
            let unresolved = self.pending.len();
            self.failed += unresolved;
            self.last_error = Some(format!("{} delivery reports outstanding at the flush deadline", unresolved));
        }

        if self.failed > 0 {
            return Err(PublishError::TransportFailure {
                failed: self.failed,
                total: self.delivered + self.failed,
                last_error: self.last_error.unwrap_or_default(),
            });
        }
        Ok(self.delivered)
    }
}

/// [`Transport`] backed by a librdkafka producer.
pub struct KafkaProducer {
    producer: FutureProducer,
    deliveries: Mutex<Deliveries<DeliveryFuture>>,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("compression.type", &config.compression)
            .set("acks", &config.acks)
            .set("linger.ms", config.linger_ms.to_string())
            .set("batch.size", config.batch_size.to_string())
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .map_err(Error::Kafka)?;

        Ok(Self {
            producer,
            deliveries: Mutex::new(Deliveries::default()),
        })
    }

    fn take_deliveries(&self) -> Deliveries<DeliveryFuture> {
        std::mem::take(&mut *self.deliveries.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl Transport for KafkaProducer {
    fn enqueue(&self, record: PublishRecord) -> std::result::Result<(), PublishError> {
        let future_record = FutureRecord::to(&record.topic)
            .key(record.key.as_slice())
            .payload(record.value.as_slice())
            .timestamp(record.timestamp_ms);

        match self.producer.send_result(future_record) {
            Ok(delivery) => {
                self.deliveries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(delivery);
                Ok(())
            }
            Err((e, _)) => Err(PublishError::Enqueue {
                topic: record.topic.clone(),
                message: e.to_string(),
            }),
        }
    }

    async fn flush(&self, timeout: Duration) -> std::result::Result<usize, PublishError> {
        let deliveries = self.take_deliveries();
        if deliveries.is_empty() {
            return Ok(0);
        }

        let deadline = Instant::now() + timeout;
        debug!("Flushing {} in-flight records", deliveries.in_flight());
        let producer = self.producer.clone();
        let flush = tokio::task::spawn_blocking(move || producer.flush(timeout));
        match tokio::time::timeout_at(deadline, flush).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("Producer flush did not complete: {}", e),
            Ok(Err(e)) => warn!("Producer flush task failed: {}", e),
            Err(_) => warn!("Producer flush did not complete within {:?}", timeout),
        }

        deliveries.settle(deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;

    type Report = oneshot::Sender<OwnedDeliveryResult>;

    fn deliveries(n: usize) -> (Deliveries<oneshot::Receiver<OwnedDeliveryResult>>, Vec<Report>) {
        let mut deliveries = Deliveries::default();
        let mut senders = Vec::new();
        for _ in 0..n {
            let (tx, rx) = oneshot::channel();
            deliveries.push(rx);
            senders.push(tx);
        }
        (deliveries, senders)
    }

    fn ack(sender: Report, offset: i64) {
        sender.send(Ok((0, offset))).unwrap();
    }

    #[test]
    fn test_acknowledged_deliveries_are_reaped_on_push() {
        let (mut deliveries, senders) = deliveries(3);
        for (offset, sender) in senders.into_iter().enumerate() {
            ack(sender, offset as i64);
        }

        let (_tx, rx) = oneshot::channel();
        deliveries.push(rx);

        assert_eq!(deliveries.in_flight(), 1);
        assert_eq!(deliveries.delivered, 3);
        assert_eq!(deliveries.failed, 0);
    }

    #[test]
    fn test_dropped_report_counts_as_failure() {
        let (mut deliveries, mut senders) = deliveries(2);
        drop(senders.pop());
        ack(senders.pop().unwrap(), 7);

        deliveries.reap();

        assert_eq!(deliveries.in_flight(), 0);
        assert_eq!(deliveries.delivered, 1);
        assert_eq!(deliveries.failed, 1);
        assert_eq!(deliveries.last_error.as_deref(), Some("delivery report was dropped"));
    }

    #[tokio::test]
    async fn test_settle_returns_delivered_count() {
        let (deliveries, senders) = deliveries(4);
        for sender in senders {
            ack(sender, 0);
        }

        let delivered = deliveries
            .settle(Instant::now() + Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(delivered, 4);
    }

    #[tokio::test]
    async fn test_settle_counts_only_unresolved_reports_at_deadline() {
        let (deliveries, mut senders) = deliveries(3);
        let _stalled = senders.pop();
        for sender in senders {
            ack(sender, 0);
        }

        let err = deliveries
            .settle(Instant::now() + Duration::from_millis(50))
            .await
            .unwrap_err();
        match err {
            PublishError::TransportFailure { failed, total, .. } => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
            }
            other => panic!("expected TransportFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_window_after_flush_holds_only_new_records() {
        let (mut window, senders) = deliveries(5);
        for sender in senders {
            ack(sender, 0);
        }
        let flushed = std::mem::take(&mut window);
        assert_eq!(flushed.settle(Instant::now() + Duration::from_secs(1)).await.unwrap(), 5);

        let (tx, rx) = oneshot::channel();
        window.push(rx);
        assert_eq!(window.in_flight(), 1);
        assert_eq!(window.delivered, 0);

        ack(tx, 5);
        assert_eq!(window.settle(Instant::now() + Duration::from_secs(1)).await.unwrap(), 1);
    }
}

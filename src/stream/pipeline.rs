use super::sink::Sink;
use super::station::{StationTransform, TransformedStationRecord};
use crate::config::{KafkaConfig, StreamConfig};
use crate::{Error, Result};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// Builds a consumer subscribed to the station input topic.
pub fn create_consumer(kafka: &KafkaConfig, stream: &StreamConfig) -> Result<StreamConsumer> {
    kafka.broker_addresses()?;

    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", kafka.bootstrap_servers())
        .set("group.id", &stream.group_id)
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .create()
        .map_err(Error::Kafka)?;

    consumer
        .subscribe(&[stream.input_topic.as_str()])
        .map_err(Error::Kafka)?;

    info!(topic = %stream.input_topic, group_id = %stream.group_id, "Subscribed to station topic");
    Ok(consumer)
}

/// Feeds station payloads through the transform into a sink.
pub struct StationPipeline<S> {
    transform: StationTransform,
    sink: S,
    forwarded: AtomicU64,
}

impl<S> StationPipeline<S>
where
    S: Sink<i32, TransformedStationRecord>,
{
    pub fn new(sink: S) -> Self {
        Self {
            transform: StationTransform::new(),
            sink,
            forwarded: AtomicU64::new(0),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Records written to the sink so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Payloads dropped because they could not be decoded.
    pub fn skipped(&self) -> u64 {
        self.transform.skipped()
    }

    /// Handles one input payload. Returns whether anything reached the sink.
    pub fn process(&self, payload: &[u8]) -> Result<bool> {
        let Some(transformed) = self.transform.apply(payload) else {
            return Ok(false);
        };

        self.sink.upsert(transformed.station_id, transformed)?;
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Consumes until `shutdown` completes.
    pub async fn run<F>(&self, consumer: &StreamConsumer, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Station pipeline started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(
                        forwarded = self.forwarded(),
                        skipped = self.skipped(),
                        "Station pipeline stopping"
                    );
                    return Ok(());
                }
                message = consumer.recv() => {
                    let message = match message {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("Kafka error while consuming: {}", e);
                            continue;
                        }
                    };

                    match message.payload() {
                        Some(payload) => {
                            if let Err(e) = self.process(payload) {
                                error!(
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    "Failed to process station record: {}",
                                    e
                                );
                            }
                        }
                        None => debug!(offset = message.offset(), "Skipping empty message"),
                    }
                }
            }
        }
    }
}

//! In-memory stand-ins for the broker admin API, the schema registry and the
//! producer transport.

use super::admin::{CreateOutcome, TopicAdmin};
use super::producer::{PublishRecord, Transport};
use super::topic::TopicSpec;
use crate::error::{ProvisionError, PublishError, SchemaError};
use crate::schema::SchemaRegistry;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct FakeAdmin {
    existing: Mutex<HashSet<String>>,
    exists_calls: AtomicUsize,
    create_calls: AtomicUsize,
    transient_failures: AtomicUsize,
    transient_create_failures: AtomicUsize,
    create_failure: Option<String>,
    create_delay: Option<Duration>,
    race_loss: bool,
}

impl FakeAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(self, topic: &str) -> Self {
        self.existing.lock().unwrap().insert(topic.to_string());
        self
    }

    /// The next `n` existence checks fail as if the cluster were unreachable.
    pub fn failing_first(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` create requests fail as if the connection dropped.
    pub fn failing_creates(self, n: usize) -> Self {
        self.transient_create_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_create_failure(mut self, message: &str) -> Self {
        self.create_failure = Some(message.to_string());
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Creation always reports that someone else created the topic first.
    pub fn with_race_loss(mut self) -> Self {
        self.race_loss = true;
        self
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopicAdmin for FakeAdmin {
    async fn topic_exists(&self, name: &str, _timeout: Duration) -> Result<bool, ProvisionError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProvisionError::Transient {
                topic: name.to_string(),
                message: "Local: Broker transport failure".to_string(),
            });
        }
        Ok(self.existing.lock().unwrap().contains(name))
    }

    async fn create_topics(&self, specs: &[TopicSpec]) -> Result<Vec<CreateOutcome>, ProvisionError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .transient_create_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProvisionError::Transient {
                topic: specs.iter().map(|spec| spec.name()).collect::<Vec<_>>().join(","),
                message: "Local: All broker connections are down".to_string(),
            });
        }
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }

        let mut existing = self.existing.lock().unwrap();
        Ok(specs
            .iter()
            .map(|spec| {
                let topic = spec.name().to_string();
                if let Some(message) = &self.create_failure {
                    CreateOutcome::Failed {
                        topic,
                        message: message.clone(),
                    }
                } else if self.race_loss || !existing.insert(topic.clone()) {
                    existing.insert(topic.clone());
                    CreateOutcome::AlreadyExists(topic)
                } else {
                    CreateOutcome::Created(topic)
                }
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    subjects: Mutex<HashMap<String, u32>>,
    register_calls: AtomicUsize,
    reject: bool,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn id_of(&self, subject: &str) -> Option<u32> {
        self.subjects.lock().unwrap().get(subject).copied()
    }
}

#[async_trait]
impl SchemaRegistry for FakeRegistry {
    async fn register(&self, subject: &str, _schema: &str) -> Result<u32, SchemaError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(SchemaError::Registry {
                subject: subject.to_string(),
                message: "Schema being registered is incompatible with an earlier schema".to_string(),
            });
        }
        let mut subjects = self.subjects.lock().unwrap();
        let next_id = subjects.len() as u32 + 1;
        Ok(*subjects.entry(subject.to_string()).or_insert(next_id))
    }
}

/// Transport that keeps records in memory. Records sit in `buffered` until a
/// flush moves them to `delivered`.
#[derive(Default)]
pub struct RecordingTransport {
    buffered: Mutex<Vec<PublishRecord>>,
    delivered: Mutex<Vec<PublishRecord>>,
    flush_calls: AtomicUsize,
    fail_deliveries: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every flush reports all buffered records as undeliverable.
    pub fn failing() -> Self {
        Self {
            fail_deliveries: true,
            ..Self::default()
        }
    }

    pub fn buffered(&self) -> Vec<PublishRecord> {
        self.buffered.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<PublishRecord> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn enqueue(&self, record: PublishRecord) -> Result<(), PublishError> {
        self.buffered.lock().unwrap().push(record);
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<usize, PublishError> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        let records = std::mem::take(&mut *self.buffered.lock().unwrap());
        let total = records.len();

        if self.fail_deliveries && total > 0 {
            return Err(PublishError::TransportFailure {
                failed: total,
                total,
                last_error: "Message timed out".to_string(),
            });
        }

        self.delivered.lock().unwrap().extend(records);
        Ok(total)
    }
}

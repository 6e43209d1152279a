//! Schema-validated publishing to a provisioned topic.
//!
//! A [`Publisher`] is bound to one topic and one key/value schema pair. It is
//! opened once per output stream, shared by reference (or `Arc`) between the
//! tasks that publish, and closed once at shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use station_stream::config::Config;
//! use station_stream::kafka::{KafkaTopicAdmin, ProvisionerState, Publisher, TopicProvisioner, TopicSpec};
//! use station_stream::schema::RecordSchemas;
//! use serde_json::json;
//!
//! # async fn example(config: Config) -> station_stream::Result<()> {
//! let admin = Arc::new(KafkaTopicAdmin::new(&config.kafka, &config.provisioning)?);
//! let provisioner = TopicProvisioner::new(admin, Arc::new(ProvisionerState::new()), &config.provisioning);
//!
//! let schemas = RecordSchemas::parse(
//!     r#"{"type":"record","name":"arrival_key","fields":[{"name":"timestamp","type":"long"}]}"#,
//!     r#"{"type":"record","name":"arrival","fields":[{"name":"station_id","type":"int"}]}"#,
//! )?;
//! let spec = TopicSpec::new("org.chicago.cta.station.arrivals", 1, 1)?;
//! let publisher = Publisher::open(spec, schemas, &config.kafka, &provisioner).await?;
//!
//! let key = json!({"timestamp": publisher.current_time_millis()});
//! publisher.publish(&key, &json!({"station_id": 40380}))?;
//! publisher.close().await?;
//! # Ok(())
//! # }
//! ```

use super::producer::{KafkaProducer, PublishRecord, Transport};
use super::provisioner::TopicProvisioner;
use super::topic::TopicSpec;
use crate::clock;
use crate::config::KafkaConfig;
use crate::error::PublishError;
use crate::schema::{key_subject, value_subject, HttpSchemaRegistry, RecordSchemas, SchemaRegistry};
use crate::Result;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info};

pub struct Publisher {
    spec: TopicSpec,
    schemas: RecordSchemas,
    key_schema_id: u32,
    value_schema_id: u32,
    transport: Arc<dyn Transport>,
    flush_timeout: Duration,
    closed: RwLock<bool>,
    published: AtomicU64,
}

impl Publisher {
    /// Opens a publisher backed by Kafka and the HTTP schema registry.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Config`] if the broker list or registry URL is
    ///   missing or malformed
    /// - [`crate::Error::Provision`] if the topic could not be provisioned
    /// - [`crate::Error::Schema`] if the registry rejects a schema
    pub async fn open(
        spec: TopicSpec,
        schemas: RecordSchemas,
        config: &KafkaConfig,
        provisioner: &TopicProvisioner,
    ) -> Result<Self> {
        config.validate()?;
        let registry = HttpSchemaRegistry::new(config.registry_url()?, config.registry_timeout())?;
        let transport = KafkaProducer::new(config)?;

        Self::with_parts(
            spec,
            schemas,
            provisioner,
            &registry,
            Arc::new(transport),
            config.flush_timeout(),
        )
        .await
    }

    /// Opens a publisher on top of an arbitrary registry and transport.
    ///
    /// The topic is provisioned before the schemas are registered, and no
    /// publish is accepted until both have succeeded.
    pub async fn with_parts(
        spec: TopicSpec,
        schemas: RecordSchemas,
        provisioner: &TopicProvisioner,
        registry: &dyn SchemaRegistry,
        transport: Arc<dyn Transport>,
        flush_timeout: Duration,
    ) -> Result<Self> {
        provisioner.ensure(&spec).await?;

        let key_schema_id = registry
            .register(&key_subject(spec.name()), &schemas.key.canonical_form())
            .await?;
        let value_schema_id = registry
            .register(&value_subject(spec.name()), &schemas.value.canonical_form())
            .await?;

        info!(
            topic = %spec.name(),
            key_schema_id,
            value_schema_id,
            "Publisher ready"
        );

        Ok(Self {
            spec,
            schemas,
            key_schema_id,
            value_schema_id,
            transport,
            flush_timeout,
            closed: RwLock::new(false),
            published: AtomicU64::new(0),
        })
    }

    pub fn topic(&self) -> &str {
        self.spec.name()
    }

    pub fn spec(&self) -> &TopicSpec {
        &self.spec
    }

    /// Number of records accepted since the publisher was opened.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates, encodes and buffers one record timestamped now.
    ///
    /// Returns once the record is in the transport's buffer; delivery happens
    /// in the background and is confirmed by [`Publisher::flush`] or
    /// [`Publisher::close`].
    pub fn publish(&self, key: &Value, value: &Value) -> std::result::Result<(), PublishError> {
        self.publish_at(key, value, clock::current_time_millis())
    }

    pub fn publish_at(&self, key: &Value, value: &Value, timestamp_ms: i64) -> std::result::Result<(), PublishError> {
        // Held until the record is buffered so close() cannot flush in between.
        let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Err(PublishError::Closed(self.topic().to_string()));
        }

        let key = self.schemas.key.encode_framed(self.key_schema_id, key)?;
        let value = self.schemas.value.encode_framed(self.value_schema_id, value)?;

        self.transport.enqueue(PublishRecord {
            topic: self.topic().to_string(),
            key,
            value,
            timestamp_ms,
        })?;

        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Blocks until every buffered record is delivered or has failed.
    pub async fn flush(&self) -> std::result::Result<(), PublishError> {
        let delivered = self.transport.flush(self.flush_timeout).await?;
        debug!(topic = %self.topic(), delivered, "Flushed publisher");
        Ok(())
    }

    /// Flushes outstanding records and stops accepting new ones.
    ///
    /// Calling `close` more than once is a no-op.
    pub async fn close(&self) -> std::result::Result<(), PublishError> {
        {
            let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
            if *closed {
                debug!(topic = %self.topic(), "Publisher already closed");
                return Ok(());
            }
            *closed = true;
        }

        match self.transport.flush(self.flush_timeout).await {
            Ok(delivered) => {
                info!(
                    topic = %self.topic(),
                    delivered,
                    published = self.published(),
                    "Publisher closed"
                );
                Ok(())
            }
            Err(e) => {
                error!(topic = %self.topic(), "Failed to flush publisher on close: {}", e);
                Err(e)
            }
        }
    }

    /// Milliseconds since the Unix epoch, for event keys and timestamps.
    pub fn current_time_millis(&self) -> i64 {
        clock::current_time_millis()
    }
}

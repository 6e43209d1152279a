//! Error types and result handling for station-stream.
//!
//! This module defines the main error type [`Error`], the per-stage errors
//! raised while provisioning topics ([`ProvisionError`]), handling schemas
//! ([`SchemaError`]) and publishing records ([`PublishError`]), and a
//! convenience [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use station_stream::{Error, Result};
//!
//! fn load_endpoints() -> Result<()> {
//!     Err(Error::Config("kafka.brokers is empty".to_string()))
//! }
//!
//! match load_endpoints() {
//!     Ok(()) => println!("Loaded"),
//!     Err(Error::Config(msg)) => eprintln!("Configuration error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for station-stream operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error: missing or malformed endpoints, unreadable
    /// config file, invalid topic settings. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka client, producer or consumer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Topic provisioning failed terminally.
    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    /// Schema parsing, registration or validation failed.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Publishing or flushing records failed.
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// JSON serialization error when decoding or encoding records.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while ensuring a topic exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// The admin call could not reach the cluster. Retried inside `ensure`.
    #[error("transient admin failure for topic '{topic}': {message}")]
    Transient { topic: String, message: String },

    /// The cluster answered but creation of this topic could not be
    /// confirmed. Logged and swallowed by `ensure`.
    #[error("failed to confirm creation of topic '{topic}': {message}")]
    PerTopicFailure { topic: String, message: String },

    /// The retry policy ran out of attempts.
    #[error("gave up on topic '{topic}' after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        topic: String,
        attempts: u32,
        last_error: String,
    },
}

impl ProvisionError {
    /// Returns true if `ensure` should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProvisionError::Transient { .. })
    }
}

/// Errors raised while parsing, registering or applying record schemas.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The schema definition itself is not valid Avro.
    #[error("invalid schema: {0}")]
    Parse(String),

    /// A value does not conform to its schema.
    #[error("schema validation failed: {0}")]
    Validation(String),

    /// The registry rejected the schema or could not be reached.
    #[error("schema registry error for subject '{subject}': {message}")]
    Registry { subject: String, message: String },
}

/// Errors raised by the publish path.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The key or value does not conform to the registered schema. The
    /// record is dropped and never reaches the transport.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// The transport refused to buffer the record (e.g. local queue full).
    #[error("failed to enqueue record for topic '{topic}': {message}")]
    Enqueue { topic: String, message: String },

    /// Some buffered records could not be delivered before the flush ended.
    #[error("{failed} of {total} records were not delivered: {last_error}")]
    TransportFailure {
        failed: usize,
        total: usize,
        last_error: String,
    },

    /// The publisher has already been closed.
    #[error("publisher for topic '{0}' is closed")]
    Closed(String),
}

impl From<SchemaError> for PublishError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Validation(msg) => PublishError::SchemaValidation(msg),
            other => PublishError::SchemaValidation(other.to_string()),
        }
    }
}

/// A convenient Result type alias for station-stream operations.
///
/// This is equivalent to `std::result::Result<T, station_stream::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

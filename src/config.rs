use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Comma-separated `[scheme://]host:port` list.
    pub brokers: String,
    pub schema_registry_url: String,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,
    #[serde(default = "default_registry_timeout_secs")]
    pub registry_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvisioningConfig {
    #[serde(default = "default_existence_timeout_secs")]
    pub existence_timeout_secs: u64,
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// `None` retries transient admin failures forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_cleanup_policy")]
    pub cleanup_policy: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    #[serde(default = "default_input_topic")]
    pub input_topic: String,
    #[serde(default = "default_output_topic")]
    pub output_topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_output_partitions")]
    pub output_partitions: i32,
    #[serde(default = "default_output_replication_factor")]
    pub output_replication_factor: i32,
}

/// One entry of the `kafka.brokers` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub scheme: Option<String>,
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (scheme, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => {
                if scheme.is_empty() {
                    return Err(Error::Config(format!("broker address '{}' has an empty scheme", raw)));
                }
                (Some(scheme.to_string()), rest)
            }
            None => (None, raw),
        };

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("broker address '{}' is missing a port", raw)))?;

        if host.is_empty() {
            return Err(Error::Config(format!("broker address '{}' is missing a host", raw)));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| Error::Config(format!("broker address '{}' has an invalid port", raw)))?;
        if port == 0 {
            return Err(Error::Config(format!("broker address '{}' has an invalid port", raw)));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("STATION_STREAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.kafka.validate()?;

        if self.stream.input_topic.trim().is_empty() {
            return Err(Error::Config("stream.input_topic is empty".to_string()));
        }
        if self.stream.output_topic.trim().is_empty() {
            return Err(Error::Config("stream.output_topic is empty".to_string()));
        }
        if self.stream.group_id.trim().is_empty() {
            return Err(Error::Config("stream.group_id is empty".to_string()));
        }
        if self.provisioning.max_attempts == Some(0) {
            return Err(Error::Config(
                "provisioning.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl KafkaConfig {
    pub fn validate(&self) -> Result<()> {
        self.broker_addresses()?;
        self.registry_url()?;
        Ok(())
    }

    pub fn broker_addresses(&self) -> Result<Vec<BrokerAddress>> {
        if self.brokers.trim().is_empty() {
            return Err(Error::Config("kafka.brokers is not set".to_string()));
        }
        self.brokers.split(',').map(BrokerAddress::parse).collect()
    }

    /// The broker list in the form librdkafka expects for `bootstrap.servers`.
    pub fn bootstrap_servers(&self) -> String {
        self.brokers
            .split(',')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn registry_url(&self) -> Result<reqwest::Url> {
        if self.schema_registry_url.trim().is_empty() {
            return Err(Error::Config("kafka.schema_registry_url is not set".to_string()));
        }
        let url = reqwest::Url::parse(self.schema_registry_url.trim()).map_err(|e| {
            Error::Config(format!(
                "kafka.schema_registry_url '{}' is malformed: {}",
                self.schema_registry_url, e
            ))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::Config(format!(
                "kafka.schema_registry_url must be http or https, got '{}'",
                other
            ))),
        }
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }
}

impl ProvisioningConfig {
    pub fn existence_timeout(&self) -> Duration {
        Duration::from_secs(self.existence_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            existence_timeout_secs: default_existence_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            max_attempts: None,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            cleanup_policy: default_cleanup_policy(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            input_topic: default_input_topic(),
            output_topic: default_output_topic(),
            group_id: default_group_id(),
            output_partitions: default_output_partitions(),
            output_replication_factor: default_output_replication_factor(),
        }
    }
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_linger_ms() -> u32 {
    100
}

fn default_batch_size() -> usize {
    16384
}

fn default_message_timeout_ms() -> u64 {
    300_000
}

fn default_flush_timeout_secs() -> u64 {
    30
}

fn default_registry_timeout_secs() -> u64 {
    10
}

fn default_existence_timeout_secs() -> u64 {
    5
}

fn default_operation_timeout_secs() -> u64 {
    30
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_cleanup_policy() -> String {
    "delete".to_string()
}

fn default_input_topic() -> String {
    "com.udacity.stations".to_string()
}

fn default_output_topic() -> String {
    "com.udacity.transformed.stations".to_string()
}

fn default_group_id() -> String {
    "stations-stream".to_string()
}

fn default_output_partitions() -> i32 {
    1
}

fn default_output_replication_factor() -> i32 {
    1
}

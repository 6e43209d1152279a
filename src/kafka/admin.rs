use super::topic::TopicSpec;
use crate::config::{KafkaConfig, ProvisioningConfig};
use crate::error::ProvisionError;
use crate::{Error, Result};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of asking the cluster to create one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(String),
    /// Another client created the topic first.
    AlreadyExists(String),
    Failed { topic: String, message: String },
}

/// Control-plane operations the provisioner needs from the broker.
///
/// Connection-level failures are reported as [`ProvisionError::Transient`];
/// per-topic failures come back inside [`CreateOutcome`].
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    async fn topic_exists(&self, name: &str, timeout: Duration) -> std::result::Result<bool, ProvisionError>;

    async fn create_topics(&self, specs: &[TopicSpec]) -> std::result::Result<Vec<CreateOutcome>, ProvisionError>;
}

/// [`TopicAdmin`] backed by the librdkafka admin API.
pub struct KafkaTopicAdmin {
    admin_client: Arc<AdminClient<DefaultClientContext>>,
    operation_timeout: Duration,
    cleanup_policy: String,
}

impl KafkaTopicAdmin {
    pub fn new(kafka: &KafkaConfig, provisioning: &ProvisioningConfig) -> Result<Self> {
        kafka.broker_addresses()?;

        let admin_client: AdminClient<_> = ClientConfig::new()
            .set("bootstrap.servers", kafka.bootstrap_servers())
            .create()
            .map_err(Error::Kafka)?;

        Ok(Self {
            admin_client: Arc::new(admin_client),
            operation_timeout: provisioning.operation_timeout(),
            cleanup_policy: provisioning.cleanup_policy.clone(),
        })
    }

    /// Drops `topic` from the cluster. Used to reset state between broker
    /// tests.
    #[cfg(test)]
    async fn delete_topic(&self, topic: &str) -> std::result::Result<(), ProvisionError> {
        let opts = AdminOptions::new().operation_timeout(Some(self.operation_timeout));
        let results = self
            .admin_client
            .delete_topics(&[topic], &opts)
            .await
            .map_err(|e| ProvisionError::Transient {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        results.into_iter().try_for_each(|result| match result {
            Ok(deleted) => {
                debug!("Deleted topic '{}'", deleted);
                Ok(())
            }
            Err((topic, code)) => Err(ProvisionError::PerTopicFailure {
                topic,
                message: code.to_string(),
            }),
        })
    }
}

#[async_trait]
impl TopicAdmin for KafkaTopicAdmin {
    async fn topic_exists(&self, name: &str, timeout: Duration) -> std::result::Result<bool, ProvisionError> {
        let admin_client = Arc::clone(&self.admin_client);
        let transient = |message: String| ProvisionError::Transient {
            topic: name.to_string(),
            message,
        };

        let topic_name = name.to_string();

        // Listing every topic avoids triggering broker-side auto-creation.
        let exists = tokio::task::spawn_blocking(move || {
            admin_client.inner().fetch_metadata(None, timeout).map(|metadata| {
                metadata
                    .topics()
                    .iter()
                    .any(|topic| topic.name() == topic_name && topic.error().is_none())
            })
        })
        .await
        .map_err(|e| transient(e.to_string()))?
        .map_err(|e| transient(e.to_string()))?;

        debug!(topic = %name, exists, "Checked topic existence");
        Ok(exists)
    }

    async fn create_topics(&self, specs: &[TopicSpec]) -> std::result::Result<Vec<CreateOutcome>, ProvisionError> {
        let new_topics: Vec<NewTopic<'_>> = specs
            .iter()
            .map(|spec| {
                NewTopic::new(
                    spec.name(),
                    spec.partitions(),
                    TopicReplication::Fixed(spec.replication_factor()),
                )
                .set("cleanup.policy", &self.cleanup_policy)
            })
            .collect();

        let opts = AdminOptions::new().operation_timeout(Some(self.operation_timeout));

        let results = self
            .admin_client
            .create_topics(&new_topics, &opts)
            .await
            .map_err(|e| ProvisionError::Transient {
                topic: specs
                    .iter()
                    .map(TopicSpec::name)
                    .collect::<Vec<_>>()
                    .join(","),
                message: e.to_string(),
            })?;

        Ok(results
            .into_iter()
            .map(|result| match result {
                Ok(topic) => CreateOutcome::Created(topic),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => CreateOutcome::AlreadyExists(topic),
                Err((topic, code)) => CreateOutcome::Failed {
                    topic,
                    message: code.to_string(),
                },
            })
            .collect())
    }
}

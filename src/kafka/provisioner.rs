//! Idempotent topic provisioning.
//!
//! [`TopicProvisioner::ensure`] makes sure a topic exists before anything is
//! published to it. Confirmed names are remembered in a [`ProvisionerState`]
//! shared by every provisioner in the process, so each topic costs at most
//! one round of admin calls per process no matter how many publishers use it.
//!
//! Per topic the provisioner moves through
//! `Unknown -> Checking -> {Exists | Creating -> Created | Failed}`, where a
//! failed attempt (the cluster could not be reached) backs off and goes back
//! to `Checking`.

use super::admin::{CreateOutcome, TopicAdmin};
use super::topic::TopicSpec;
use crate::config::ProvisioningConfig;
use crate::error::ProvisionError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// How `ensure` retries when the admin interface cannot be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        matches!(self.max_attempts, Some(max) if attempt >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ProvisioningConfig::default())
    }
}

impl From<&ProvisioningConfig> for RetryPolicy {
    fn from(config: &ProvisioningConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Topic names confirmed to exist, shared across the process.
///
/// Append-only. Created once by the composition root and handed to every
/// provisioner by `Arc`.
#[derive(Debug, Default)]
pub struct ProvisionerState {
    confirmed: Mutex<HashSet<String>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProvisionerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.confirmed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(topic)
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .confirmed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        topics.sort();
        topics
    }

    fn confirm(&self, topic: &str) {
        self.confirmed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.to_string());
    }

    fn topic_lock(&self, topic: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(topic.to_string()).or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provisioned {
    Exists,
    Created,
}

/// Ensures topics exist before publishers use them.
#[derive(Clone)]
pub struct TopicProvisioner {
    admin: Arc<dyn TopicAdmin>,
    state: Arc<ProvisionerState>,
    retry: RetryPolicy,
    existence_timeout: Duration,
}

impl TopicProvisioner {
    pub fn new(admin: Arc<dyn TopicAdmin>, state: Arc<ProvisionerState>, config: &ProvisioningConfig) -> Self {
        Self {
            admin,
            state,
            retry: RetryPolicy::from(config),
            existence_timeout: config.existence_timeout(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> &Arc<ProvisionerState> {
        &self.state
    }

    /// Makes sure `spec` exists on the cluster.
    ///
    /// Returns immediately if the topic was already confirmed in this
    /// process. Otherwise checks the cluster, creates the topic if needed and
    /// records it. Connection failures are retried according to the
    /// [`RetryPolicy`]; a per-topic creation failure is logged and treated as
    /// success because the topic may still be usable.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::RetriesExhausted`] only when `max_attempts`
    /// is set and every attempt failed to reach the cluster.
    #[instrument(skip(self, spec), fields(topic = %spec.name()))]
    pub async fn ensure(&self, spec: &TopicSpec) -> Result<(), ProvisionError> {
        if self.state.contains(spec.name()) {
            debug!("Topic '{}' already verified to exist", spec.name());
            return Ok(());
        }

        let lock = self.state.topic_lock(spec.name());
        let _guard = lock.lock().await;

        // Another publisher may have finished while we waited.
        if self.state.contains(spec.name()) {
            debug!("Topic '{}' verified by a concurrent caller", spec.name());
            return Ok(());
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(spec).await {
                Ok(outcome) => {
                    self.state.confirm(spec.name());
                    debug!(attempt, ?outcome, "Topic '{}' provisioned", spec.name());
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    if self.retry.exhausted(attempt) {
                        warn!("Giving up on topic '{}' after {} attempts: {}", spec.name(), attempt, e);
                        return Err(ProvisionError::RetriesExhausted {
                            topic: spec.name().to_string(),
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to reach the cluster for topic '{}': {}",
                        spec.name(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, spec: &TopicSpec) -> Result<Provisioned, ProvisionError> {
        if self.admin.topic_exists(spec.name(), self.existence_timeout).await? {
            info!("Topic '{}' already exists", spec.name());
            return Ok(Provisioned::Exists);
        }

        info!(
            partitions = spec.partitions(),
            replication_factor = spec.replication_factor(),
            "Creating topic '{}'",
            spec.name()
        );
        let outcomes = self.admin.create_topics(std::slice::from_ref(spec)).await?;

        for outcome in outcomes {
            match outcome {
                CreateOutcome::Created(topic) => {
                    info!("Successfully created topic: {}", topic);
                }
                CreateOutcome::AlreadyExists(topic) => {
                    info!("Topic '{}' was created by another client", topic);
                }
                CreateOutcome::Failed { topic, message } => {
                    let err = ProvisionError::PerTopicFailure { topic, message };
                    warn!("{}; continuing", err);
                }
            }
        }

        Ok(Provisioned::Created)
    }
}

pub mod admin;
pub mod producer;
pub mod provisioner;
pub mod publisher;
pub mod topic;

#[cfg(test)]
pub(crate) mod test_utils;


pub use admin::{CreateOutcome, KafkaTopicAdmin, TopicAdmin};
pub use producer::{KafkaProducer, PublishRecord, Transport};
pub use provisioner::{ProvisionerState, RetryPolicy, TopicProvisioner};
pub use publisher::Publisher;
pub use topic::TopicSpec;

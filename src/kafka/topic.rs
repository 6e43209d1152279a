use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A topic to provision: name plus partition and replica counts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicSpec {
    name: String,
    partitions: i32,
    replication_factor: i32,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: i32, replication_factor: i32) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Config("topic name must not be empty".to_string()));
        }
        if partitions < 1 {
            return Err(Error::Config(format!(
                "topic '{}' needs at least one partition, got {}",
                name, partitions
            )));
        }
        if replication_factor < 1 {
            return Err(Error::Config(format!(
                "topic '{}' needs a replication factor of at least one, got {}",
                name, replication_factor
            )));
        }

        Ok(Self {
            name,
            partitions,
            replication_factor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> i32 {
        self.partitions
    }

    pub fn replication_factor(&self) -> i32 {
        self.replication_factor
    }
}

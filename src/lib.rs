pub mod clock;
pub mod config;
pub mod error;
pub mod kafka;
pub mod schema;
pub mod stream;

pub use config::Config;
pub use error::{Error, ProvisionError, PublishError, Result, SchemaError};
pub use kafka::{ProvisionerState, Publisher, TopicProvisioner, TopicSpec};

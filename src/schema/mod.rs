pub mod codec;
pub mod registry;

pub use codec::{AvroCodec, MAGIC_BYTE};
pub use registry::{key_subject, value_subject, HttpSchemaRegistry, SchemaRegistry};

use crate::error::SchemaError;

/// The key/value schema pair a publisher registers for its topic.
#[derive(Debug, Clone)]
pub struct RecordSchemas {
    pub key: AvroCodec,
    pub value: AvroCodec,
}

impl RecordSchemas {
    pub fn parse(key: &str, value: &str) -> Result<Self, SchemaError> {
        Ok(Self {
            key: AvroCodec::parse(key)?,
            value: AvroCodec::parse(value)?,
        })
    }
}

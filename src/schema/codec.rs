use crate::error::SchemaError;
use apache_avro::types::Value;
use apache_avro::Schema;
use serde_json::Value as JsonValue;

/// First byte of every Confluent-framed message.
pub const MAGIC_BYTE: u8 = 0;

const HEADER_LEN: usize = 5;

/// Validates JSON values against an Avro schema and encodes them.
#[derive(Debug, Clone)]
pub struct AvroCodec {
    schema: Schema,
}

impl AvroCodec {
    pub fn parse(definition: &str) -> Result<Self, SchemaError> {
        let schema = Schema::parse_str(definition).map_err(|e| SchemaError::Parse(e.to_string()))?;
        Ok(Self { schema })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Canonical form sent to the registry.
    pub fn canonical_form(&self) -> String {
        self.schema.canonical_form()
    }

    /// Converts `value` into an Avro value, failing if it does not conform.
    pub fn validate(&self, value: &JsonValue) -> Result<Value, SchemaError> {
        json_to_avro(value, &self.schema).map_err(SchemaError::Validation)
    }

    /// Encodes `value` as a bare Avro datum.
    pub fn encode(&self, value: &JsonValue) -> Result<Vec<u8>, SchemaError> {
        let avro_value = self.validate(value)?;
        apache_avro::to_avro_datum(&self.schema, avro_value)
            .map_err(|e| SchemaError::Validation(format!("avro encode: {}", e)))
    }

    /// Encodes `value` in the registry wire format for `schema_id`.
    pub fn encode_framed(&self, schema_id: u32, value: &JsonValue) -> Result<Vec<u8>, SchemaError> {
        let datum = self.encode(value)?;
        let mut framed = Vec::with_capacity(HEADER_LEN + datum.len());
        framed.push(MAGIC_BYTE);
        framed.extend_from_slice(&schema_id.to_be_bytes());
        framed.extend_from_slice(&datum);
        Ok(framed)
    }

    /// Decodes a framed message, returning the schema id and the value.
    pub fn decode_framed(&self, bytes: &[u8]) -> Result<(u32, Value), SchemaError> {
        if bytes.len() < HEADER_LEN || bytes[0] != MAGIC_BYTE {
            return Err(SchemaError::Validation(
                "payload is not in registry wire format".to_string(),
            ));
        }
        let schema_id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let mut reader = &bytes[HEADER_LEN..];
        let value = apache_avro::from_avro_datum(&self.schema, &mut reader, None)
            .map_err(|e| SchemaError::Validation(format!("avro decode: {}", e)))?;
        Ok((schema_id, value))
    }
}

/// Resolves `value` against `schema`, then rejects numbers that resolution
/// narrowed into a 32-bit field.
fn json_to_avro(value: &JsonValue, schema: &Schema) -> Result<Value, String> {
    let resolved = Value::from(value.clone()).resolve(schema).map_err(|e| e.to_string())?;
    check_int_ranges(value, &resolved, "$")?;
    Ok(resolved)
}

fn check_int_ranges(json: &JsonValue, resolved: &Value, path: &str) -> Result<(), String> {
    match (resolved, json) {
        (Value::Int(i) | Value::Date(i) | Value::TimeMillis(i), JsonValue::Number(n))
            if n.as_i64() != Some(i64::from(*i)) =>
        {
            Err(format!("{}: {} is out of range for a 32-bit field", path, n))
        }
        (Value::Union(_, inner), _) => check_int_ranges(json, inner, path),
        (Value::Record(fields), JsonValue::Object(entries)) => fields.iter().try_for_each(|(name, field)| {
            match entries.get(name) {
                Some(item) => check_int_ranges(item, field, &format!("{}.{}", path, name)),
                None => Ok(()),
            }
        }),
        (Value::Map(items), JsonValue::Object(entries)) => items.iter().try_for_each(|(key, item)| {
            match entries.get(key) {
                Some(entry) => check_int_ranges(entry, item, &format!("{}.{}", path, key)),
                None => Ok(()),
            }
        }),
        (Value::Array(items), JsonValue::Array(entries)) => items
            .iter()
            .zip(entries)
            .enumerate()
            .try_for_each(|(idx, (item, entry))| check_int_ranges(entry, item, &format!("{}[{}]", path, idx))),
        _ => Ok(()),
    }
}

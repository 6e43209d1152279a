use super::station::TransformedStationRecord;
use crate::kafka::Publisher;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Destination for keyed transform results.
pub trait Sink<K, V>: Send + Sync {
    fn upsert(&self, key: K, value: V) -> Result<()>;
}

/// Latest transformed record per station, with every change published to a
/// changelog topic.
pub struct StationTable {
    name: String,
    rows: RwLock<HashMap<i32, TransformedStationRecord>>,
    changelog: Arc<Publisher>,
}

impl StationTable {
    pub fn new(name: impl Into<String>, changelog: Arc<Publisher>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(HashMap::new()),
            changelog,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, station_id: i32) -> Option<TransformedStationRecord> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&station_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sink<i32, TransformedStationRecord> for StationTable {
    fn upsert(&self, key: i32, value: TransformedStationRecord) -> Result<()> {
        let payload = serde_json::to_value(&value)?;
        self.changelog
            .publish(&serde_json::json!({ "station_id": key }), &payload)?;

        debug!(table = %self.name, station_id = key, "Upserted station");
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
        Ok(())
    }
}

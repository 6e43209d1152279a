//! Station records and the line projection applied to each of them.

use crate::error::SchemaError;
use crate::schema::RecordSchemas;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

pub const TRANSFORMED_STATION_KEY_SCHEMA: &str = include_str!("../../schemas/transformed_station_key.json");
pub const TRANSFORMED_STATION_VALUE_SCHEMA: &str = include_str!("../../schemas/transformed_station_value.json");

/// A station as it arrives on the input topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    pub stop_id: i32,
    pub direction_id: String,
    pub stop_name: String,
    pub station_name: String,
    pub station_descriptive_name: String,
    pub station_id: i32,
    pub order: i32,
    pub red: bool,
    pub blue: bool,
    pub green: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Line {
    Red,
    Blue,
    Green,
}

impl Line {
    /// Picks the line from the colour flags, red first, then blue, then green.
    pub fn from_flags(red: bool, blue: bool, green: bool) -> Option<Self> {
        if red {
            Some(Line::Red)
        } else if blue {
            Some(Line::Blue)
        } else if green {
            Some(Line::Green)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Line::Red => "red",
            Line::Blue => "blue",
            Line::Green => "green",
        }
    }
}

/// The projection written to the output topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedStationRecord {
    pub station_id: i32,
    pub station_name: String,
    pub order: i32,
    /// `None` when no colour flag is set on the input.
    pub line: Option<Line>,
}

/// Schemas used for the transformed-station changelog topic.
pub fn transformed_station_schemas() -> Result<RecordSchemas, SchemaError> {
    RecordSchemas::parse(TRANSFORMED_STATION_KEY_SCHEMA, TRANSFORMED_STATION_VALUE_SCHEMA)
}

pub fn transform(station: &StationRecord) -> TransformedStationRecord {
    TransformedStationRecord {
        station_id: station.station_id,
        station_name: station.station_name.clone(),
        order: station.order,
        line: Line::from_flags(station.red, station.blue, station.green),
    }
}

/// Decodes raw input payloads and applies [`transform`].
#[derive(Debug, Default)]
pub struct StationTransform {
    skipped: AtomicU64,
}

impl StationTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero or one output per payload: `None` if the payload is not a
    /// station record.
    pub fn apply(&self, payload: &[u8]) -> Option<TransformedStationRecord> {
        match serde_json::from_slice::<StationRecord>(payload) {
            Ok(station) => Some(transform(&station)),
            Err(e) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping malformed station record: {}", e);
                None
            }
        }
    }

    /// Payloads that could not be decoded so far.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

pub mod pipeline;
pub mod sink;
pub mod station;

pub use pipeline::{create_consumer, StationPipeline};
pub use sink::{Sink, StationTable};
pub use station::{
    transform, transformed_station_schemas, Line, StationRecord, StationTransform, TransformedStationRecord,
};

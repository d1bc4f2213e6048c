//! Turns location-history exports (Google Takeout JSON/KML, GPX, Takeout and
//! Apple Health ZIP archives) into a heatmap of how often each place was
//! visited.

pub mod aggregator;
pub mod config;
pub mod date_range;
pub mod error;
pub mod hashable_point;
pub mod io;
pub mod parsers;
pub mod pipeline;
pub mod render;

pub use aggregator::{Aggregator, WeightedPoint};
pub use config::{Cli, HeatmapOptions, IngestOptions, MapTiles, RunConfig};
pub use date_range::{DateRange, Timestamp, in_range};
pub use error::{Error, ParseError};
pub use hashable_point::{CoordinateKey, round6};
pub use pipeline::{RunSummary, ingest, run};

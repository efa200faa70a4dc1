//! GeoJSON directory workspace for `geosync`.
//!
//! Each dataset is one `FeatureCollection` file named `<dataset>.geojson`
//! inside the workspace directory. The dataset schema travels with the file
//! as a foreign member so that field types and lengths survive a round trip;
//! files without it (hand-made or exported by other tools) get a schema
//! inferred from their properties.

pub mod parser;
pub mod workspace;
pub mod writer;

pub use parser::{parse_geojson_bytes, json_to_value};
pub use workspace::GeoJsonWorkspace;
pub use writer::{GeoJsonWriterOptions, value_to_json, write_geojson, write_geojson_to_bytes};

/// Foreign member holding the serialized dataset schema.
pub const SCHEMA_MEMBER: &str = "geosync:schema";

/// File extension of dataset files.
pub const DATASET_EXTENSION: &str = "geojson";

//! CSV support for `geosync`.
//!
//! Writes datasets out as spreadsheets for operator review (unmatched
//! geocodes, exception lists) and reads tabular extracts such as assessment
//! exports into tables that can be stored in a workspace.

pub mod reader;
pub mod writer;

pub use reader::{CsvReaderOptions, read_csv, read_csv_file};
pub use writer::{CsvWriterOptions, GeometryColumns, write_csv, write_csv_file, write_csv_to_bytes};

//! CSV writer for spreadsheet exports of geosync tables

use std::fs::File;
use std::io::{BufWriter, Write as IoWrite};
use std::path::Path;
use std::sync::Arc;

use arrow_array::{ArrayRef, Float64Array, RecordBatch, RecordBatchOptions, StringArray};
use arrow_csv::WriterBuilder;
use arrow_schema::{DataType, Field, Schema};
use geo_types::Geometry;
use geosync_core_common::arrow::{BatchOptions, to_record_batch};
use geosync_core_common::{Table, WorkspaceError, WorkspaceResult};
use geozero::ToWkt;

/// How feature geometry is represented in the spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryColumns {
    /// Geometry is left out.
    #[default]
    Omit,
    /// A `WKT` column holding the geometry as well-known text.
    Wkt,
    /// `X` and `Y` columns; empty for anything other than a point.
    PointXy,
}

/// Options for CSV writing
#[derive(Debug, Clone)]
pub struct CsvWriterOptions {
    /// Column delimiter (default: b',')
    pub delimiter: u8,
    /// Whether to write header row (default: true)
    pub has_header: bool,
    /// Null value representation (default: empty string)
    pub null_value: String,
    /// Geometry representation (default: omitted)
    pub geometry: GeometryColumns,
}

impl Default for CsvWriterOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            null_value: String::new(),
            geometry: GeometryColumns::Omit,
        }
    }
}

impl CsvWriterOptions {
    /// Create new writer options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set column delimiter
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set whether to write header row
    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Set null value representation
    #[must_use]
    pub fn with_null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = null_value.into();
        self
    }

    /// Set geometry representation
    #[must_use]
    pub fn with_geometry(mut self, geometry: GeometryColumns) -> Self {
        self.geometry = geometry;
        self
    }
}

fn csv_error(message: impl Into<String>) -> WorkspaceError {
    WorkspaceError::Format {
        format: "CSV".to_string(),
        context: "spreadsheet export".to_string(),
        message: message.into(),
    }
}

/// Adds the configured geometry columns to the attribute batch.
fn with_geometry_columns(
    batch: RecordBatch,
    table: &Table,
    geometry: GeometryColumns,
) -> WorkspaceResult<RecordBatch> {
    if geometry == GeometryColumns::Omit {
        return Ok(batch);
    }

    let mut fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

    match geometry {
        GeometryColumns::Omit => {},
        GeometryColumns::Wkt => {
            let wkt = table
                .features
                .iter()
                .map(|feature| {
                    feature
                        .geometry
                        .as_ref()
                        .map(|g| g.to_wkt().map_err(|e| csv_error(format!("WKT: {e}"))))
                        .transpose()
                })
                .collect::<WorkspaceResult<Vec<_>>>()?;
            fields.push(Field::new("WKT", DataType::Utf8, true));
            columns.push(Arc::new(StringArray::from(wkt)));
        },
        GeometryColumns::PointXy => {
            let points: Vec<Option<(f64, f64)>> = table
                .features
                .iter()
                .map(|feature| match &feature.geometry {
                    Some(Geometry::Point(p)) => Some((p.x(), p.y())),
                    _ => None,
                })
                .collect();
            fields.push(Field::new("X", DataType::Float64, true));
            fields.push(Field::new("Y", DataType::Float64, true));
            columns.push(Arc::new(Float64Array::from(
                points.iter().map(|p| p.map(|(x, _)| x)).collect::<Vec<_>>(),
            )));
            columns.push(Arc::new(Float64Array::from(
                points.iter().map(|p| p.map(|(_, y)| y)).collect::<Vec<_>>(),
            )));
        },
    }

    let options = RecordBatchOptions::new().with_row_count(Some(table.len()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)
        .map_err(|e| csv_error(e.to_string()))
}

/// Write a table to CSV format
///
/// # Errors
///
/// Returns an error if writing to the output fails or if CSV serialization fails
pub fn write_csv<W: IoWrite>(
    writer: &mut W,
    table: &Table,
    options: &CsvWriterOptions,
) -> WorkspaceResult<()> {
    let batch = to_record_batch(table, &BatchOptions::default())?;
    let batch = with_geometry_columns(batch, table, options.geometry)?;

    let mut builder = WriterBuilder::new()
        .with_delimiter(options.delimiter)
        .with_header(options.has_header);
    if !options.null_value.is_empty() {
        builder = builder.with_null(options.null_value.clone());
    }

    let mut csv_writer = builder.build(writer);
    csv_writer
        .write(&batch)
        .map_err(|e| csv_error(e.to_string()))
}

/// Write a table to CSV bytes
///
/// # Errors
///
/// Returns an error if CSV serialization fails
pub fn write_csv_to_bytes(table: &Table, options: &CsvWriterOptions) -> WorkspaceResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, table, options)?;
    Ok(buffer)
}

/// Write a table to a CSV file, replacing any existing file
///
/// # Errors
///
/// Returns [`WorkspaceError::Io`] when the file cannot be created, which
/// includes a spreadsheet still held open by another program on some
/// platforms, and serialization errors from [`write_csv`].
pub fn write_csv_file(
    path: impl AsRef<Path>,
    table: &Table,
    options: &CsvWriterOptions,
) -> WorkspaceResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| WorkspaceError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_csv(&mut writer, table, options)?;
    writer.flush().map_err(|e| WorkspaceError::io(path, e))
}

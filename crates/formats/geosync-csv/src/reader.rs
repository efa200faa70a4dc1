//! CSV reader for tabular extracts.
//!
//! Field types are inferred per column. Values with leading zeros (`0101`)
//! keep the column as text so parcel and district codes survive intact.

use std::io::Read;
use std::path::Path;

use geo_types::Point;
use geosync_core_common::{
    DatasetSchema, Feature, FieldDef, FieldType, GeometryType, Table, Value, WorkspaceError,
    WorkspaceResult,
};

/// Options for CSV reading
#[derive(Debug, Clone)]
pub struct CsvReaderOptions {
    /// Column delimiter (default: b',')
    pub delimiter: u8,
    /// Columns always read as text regardless of their content
    pub text_columns: Vec<String>,
    /// Optional `(x, y)` columns used to build point geometry
    pub point_columns: Option<(String, String)>,
}

impl Default for CsvReaderOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            text_columns: Vec::new(),
            point_columns: None,
        }
    }
}

impl CsvReaderOptions {
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_text_column(mut self, column: impl Into<String>) -> Self {
        self.text_columns.push(column.into());
        self
    }

    #[must_use]
    pub fn with_point_columns(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.point_columns = Some((x.into(), y.into()));
        self
    }
}

fn parse_error(context: &str, message: impl Into<String>) -> WorkspaceError {
    WorkspaceError::Format {
        format: "CSV".to_string(),
        context: context.to_string(),
        message: message.into(),
    }
}

fn has_leading_zero(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.")
}

fn infer_column(values: &[&str]) -> FieldType {
    let present: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if present.is_empty() || present.iter().any(|v| has_leading_zero(v)) {
        return FieldType::Text;
    }
    if present.iter().all(|v| v.parse::<i64>().is_ok()) {
        FieldType::Integer
    } else if present.iter().all(|v| v.parse::<f64>().is_ok()) {
        FieldType::Double
    } else if present
        .iter()
        .all(|v| v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false"))
    {
        FieldType::Boolean
    } else {
        FieldType::Text
    }
}

/// Read CSV content into a table.
///
/// # Errors
///
/// Returns [`WorkspaceError::Format`] for malformed CSV or missing point
/// columns, and conformance errors for values that do not fit the inferred
/// schema.
pub fn read_csv<R: Read>(
    reader: R,
    options: &CsvReaderOptions,
    context: &str,
) -> WorkspaceResult<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .map_err(|e| parse_error(context, e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| parse_error(context, e.to_string()))?;
        records.push(record);
    }

    let point_index = match &options.point_columns {
        Some((x, y)) => {
            let find = |name: &str| {
                headers
                    .iter()
                    .position(|h| h.eq_ignore_ascii_case(name))
                    .ok_or_else(|| parse_error(context, format!("missing point column '{name}'")))
            };
            Some((find(x)?, find(y)?))
        },
        None => None,
    };

    let mut fields = Vec::with_capacity(headers.len());
    for (index, header) in headers.iter().enumerate() {
        let field_type = if options
            .text_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(header))
        {
            FieldType::Text
        } else {
            let column: Vec<&str> = records.iter().map(|r| r.get(index).unwrap_or("")).collect();
            infer_column(&column)
        };
        fields.push(FieldDef::new(header.clone(), field_type));
    }

    let geometry_type = if point_index.is_some() {
        GeometryType::Point
    } else {
        GeometryType::None
    };
    let schema = DatasetSchema::new(geometry_type, fields)?;

    let mut table = Table::new(schema);
    for (row, record) in records.iter().enumerate() {
        let mut feature = Feature::new();
        for (index, header) in headers.iter().enumerate() {
            let raw = record.get(index).unwrap_or("");
            let value = if raw.trim().is_empty() {
                Value::Null
            } else {
                Value::Text(raw.to_string())
            };
            feature.set(header.clone(), value);
        }
        if let Some((x, y)) = point_index {
            let coord = |i: usize| record.get(i).and_then(|v| v.trim().parse::<f64>().ok());
            match (coord(x), coord(y)) {
                (Some(x), Some(y)) => feature.geometry = Some(Point::new(x, y).into()),
                (None, None) => {},
                _ => {
                    return Err(parse_error(
                        context,
                        format!("row {} has an incomplete coordinate pair", row + 1),
                    ));
                },
            }
        }
        table.push(feature)?;
    }
    Ok(table)
}

/// Read a CSV file into a table.
///
/// # Errors
///
/// Returns [`WorkspaceError::Io`] when the file cannot be opened, otherwise
/// the errors of [`read_csv`].
pub fn read_csv_file(path: impl AsRef<Path>, options: &CsvReaderOptions) -> WorkspaceResult<Table> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| WorkspaceError::io(path, e))?;
    read_csv(file, options, &path.display().to_string())
}

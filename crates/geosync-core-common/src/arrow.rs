//! Conversion of attribute tables to Arrow record batches.
//!
//! Attribute filters run through DataFusion and spreadsheet exports go
//! through the Arrow CSV writer; both start from the batch built here.
//! Geometry is not part of the batch.

use std::sync::Arc;

use arrow_array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, RecordBatchOptions,
    StringArray, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema};

use crate::dataset::{FieldType, Table, Value};
use crate::workspace::{WorkspaceError, WorkspaceResult};

/// Name of the synthetic row-index column.
pub const ROW_ID_COLUMN: &str = "__row";

/// Options controlling how a table is laid out as a record batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Lowercase every column name, so unquoted SQL identifiers resolve.
    pub lowercase_names: bool,
    /// Prepend a [`ROW_ID_COLUMN`] holding each row's index in the table.
    pub row_ids: bool,
}

/// Maps a field type to its Arrow data type.
#[must_use]
pub fn arrow_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Text => DataType::Utf8,
        FieldType::Integer => DataType::Int64,
        FieldType::Double => DataType::Float64,
        FieldType::Boolean => DataType::Boolean,
    }
}

/// Builds a record batch from the attributes of `table`.
///
/// # Errors
///
/// Returns [`WorkspaceError::SchemaMismatch`] when lowercasing produces
/// duplicate column names or a value does not match its field type.
pub fn to_record_batch(table: &Table, options: &BatchOptions) -> WorkspaceResult<RecordBatch> {
    let mut fields = Vec::with_capacity(table.schema.fields.len() + 1);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(table.schema.fields.len() + 1);

    if options.row_ids {
        fields.push(Field::new(ROW_ID_COLUMN, DataType::UInt64, false));
        columns.push(Arc::new(UInt64Array::from_iter_values(
            0..table.features.len() as u64,
        )));
    }

    for def in &table.schema.fields {
        let name = if options.lowercase_names {
            def.name.to_ascii_lowercase()
        } else {
            def.name.clone()
        };
        if fields.iter().any(|f: &Field| f.name() == &name) {
            return Err(WorkspaceError::schema(format!(
                "column '{name}' appears more than once"
            )));
        }

        let values = table.features.iter().map(|feature| feature.get(&def.name));
        let column: ArrayRef = match def.field_type {
            FieldType::Text => Arc::new(StringArray::from(
                values.map(Value::as_text).collect::<Vec<_>>(),
            )),
            FieldType::Integer => Arc::new(Int64Array::from(
                values
                    .map(|value| match value {
                        Value::Int(v) => Ok(Some(*v)),
                        Value::Null => Ok(None),
                        other => Err(type_error(&def.name, other)),
                    })
                    .collect::<WorkspaceResult<Vec<_>>>()?,
            )),
            FieldType::Double => Arc::new(Float64Array::from(
                values
                    .map(|value| match value {
                        Value::Null => Ok(None),
                        other => other
                            .as_f64()
                            .map(Some)
                            .ok_or_else(|| type_error(&def.name, other)),
                    })
                    .collect::<WorkspaceResult<Vec<_>>>()?,
            )),
            FieldType::Boolean => Arc::new(BooleanArray::from(
                values
                    .map(|value| match value {
                        Value::Bool(b) => Ok(Some(*b)),
                        Value::Null => Ok(None),
                        other => Err(type_error(&def.name, other)),
                    })
                    .collect::<WorkspaceResult<Vec<_>>>()?,
            )),
        };

        fields.push(Field::new(name, arrow_type(def.field_type), true));
        columns.push(column);
    }

    let batch_options = RecordBatchOptions::new().with_row_count(Some(table.features.len()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &batch_options)
        .map_err(|e| WorkspaceError::schema(format!("cannot build record batch: {e}")))
}

fn type_error(field: &str, value: &Value) -> WorkspaceError {
    WorkspaceError::schema(format!("field '{field}' holds unexpected value '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetSchema, Feature, FieldDef};
    use arrow_array::Array;

    fn sample() -> Table {
        let schema = DatasetSchema::table(vec![
            FieldDef::text("PID", 20),
            FieldDef::integer("LINE_ID"),
            FieldDef::double("ACRES"),
            FieldDef::boolean("EXEMPT"),
        ])
        .unwrap();
        Table::from_features(
            schema,
            vec![
                Feature::new()
                    .with("PID", "A")
                    .with("LINE_ID", 1_i64)
                    .with("ACRES", 1.5)
                    .with("EXEMPT", false),
                Feature::new().with("PID", "B"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_batch_layout() {
        let batch = to_record_batch(
            &sample(),
            &BatchOptions {
                lowercase_names: true,
                row_ids: true,
            },
        )
        .unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 5);
        let schema = batch.schema();
        assert_eq!(schema.field(0).name(), ROW_ID_COLUMN);
        assert_eq!(schema.field(2).name(), "line_id");
        assert!(batch.column(2).is_null(1));
    }

    #[test]
    fn test_empty_schema_keeps_row_count() {
        let table = Table::from_features(
            DatasetSchema::default(),
            vec![Feature::new(), Feature::new()],
        )
        .unwrap();
        let batch = to_record_batch(&table, &BatchOptions::default()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 0);
    }
}

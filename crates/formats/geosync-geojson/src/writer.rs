//! `GeoJSON` writer for geosync tables.

use std::io::Write as IoWrite;

use geojson::{Feature, FeatureCollection, Geometry as GeoJsonGeometry, JsonObject, JsonValue};
use geosync_core_common::{Table, Value, WorkspaceError, WorkspaceResult};

use crate::SCHEMA_MEMBER;
use crate::parser::schema_to_json;

/// Options for `GeoJSON` writing
#[derive(Debug, Clone)]
pub struct GeoJsonWriterOptions {
    /// Pretty-print the output (default: false)
    pub pretty: bool,
    /// Embed the dataset schema as a foreign member (default: true)
    pub embed_schema: bool,
}

impl Default for GeoJsonWriterOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            embed_schema: true,
        }
    }
}

impl GeoJsonWriterOptions {
    /// Create new writer options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set pretty-printing
    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Set whether to embed the schema
    #[must_use]
    pub fn with_embedded_schema(mut self, embed: bool) -> Self {
        self.embed_schema = embed;
        self
    }
}

/// Converts an attribute value into a JSON property.
#[must_use]
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(v) => JsonValue::from(*v),
        Value::Float(v) => serde_json::Number::from_f64(*v).map_or(JsonValue::Null, JsonValue::Number),
        Value::Text(s) => JsonValue::String(s.clone()),
    }
}

fn table_to_collection(table: &Table, options: &GeoJsonWriterOptions) -> FeatureCollection {
    let features = table
        .features
        .iter()
        .map(|row| {
            let mut properties = JsonObject::new();
            for field in &table.schema.fields {
                properties.insert(field.name.clone(), value_to_json(row.get(&field.name)));
            }
            Feature {
                bbox: None,
                geometry: row
                    .geometry
                    .as_ref()
                    .map(|geometry| GeoJsonGeometry::new(geojson::Value::from(geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = options.embed_schema.then(|| {
        let mut members = JsonObject::new();
        members.insert(SCHEMA_MEMBER.to_string(), schema_to_json(&table.schema));
        members
    });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

/// Write a table as a `GeoJSON` `FeatureCollection`
///
/// # Errors
///
/// Returns [`WorkspaceError::Format`] if serialization or the underlying write fails
pub fn write_geojson<W: IoWrite>(
    writer: &mut W,
    table: &Table,
    options: &GeoJsonWriterOptions,
) -> WorkspaceResult<()> {
    let collection = table_to_collection(table, options);
    let result = if options.pretty {
        serde_json::to_writer_pretty(&mut *writer, &collection)
    } else {
        serde_json::to_writer(&mut *writer, &collection)
    };
    result.map_err(|e| WorkspaceError::Format {
        format: "GeoJSON".to_string(),
        context: "feature collection".to_string(),
        message: e.to_string(),
    })
}

/// Write a table to `GeoJSON` bytes
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn write_geojson_to_bytes(table: &Table, options: &GeoJsonWriterOptions) -> WorkspaceResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_geojson(&mut buffer, table, options)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_geojson_bytes;
    use geo_types::polygon;
    use geosync_core_common::{DatasetSchema, Feature as Row, FieldDef, GeometryType};

    fn districts() -> Table {
        let schema = DatasetSchema::new(
            GeometryType::Polygon,
            vec![FieldDef::text("DISTRICT", 2), FieldDef::double("AREA")],
        )
        .unwrap();
        Table::from_features(
            schema,
            vec![
                Row::new()
                    .with("DISTRICT", "23")
                    .with("AREA", 1.0)
                    .with_geometry(polygon![
                        (x: 0.0, y: 0.0),
                        (x: 1.0, y: 0.0),
                        (x: 1.0, y: 1.0),
                        (x: 0.0, y: 1.0),
                    ]),
                Row::new().with("DISTRICT", "24"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_write_then_read_preserves_schema() {
        let table = districts();
        let bytes = write_geojson_to_bytes(&table, &GeoJsonWriterOptions::default()).unwrap();
        let parsed = parse_geojson_bytes(&bytes, "districts.geojson").unwrap();

        assert_eq!(parsed.schema, table.schema);
        assert_eq!(parsed.features, table.features);
    }

    #[test]
    fn test_nulls_written_explicitly() {
        let bytes = write_geojson_to_bytes(&districts(), &GeoJsonWriterOptions::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""AREA":null"#));
        assert!(text.contains(r#""geometry":null"#));
    }

    #[test]
    fn test_without_embedded_schema() {
        let options = GeoJsonWriterOptions::new()
            .with_embedded_schema(false)
            .with_pretty(true);
        let bytes = write_geojson_to_bytes(&districts(), &options).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains(SCHEMA_MEMBER));
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert_eq!(value_to_json(&Value::Float(f64::NAN)), JsonValue::Null);
        assert_eq!(value_to_json(&Value::Int(3)), JsonValue::from(3));
    }
}

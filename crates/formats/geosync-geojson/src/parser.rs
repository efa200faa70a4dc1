//! `GeoJSON` parsing into geosync tables.

use std::convert::TryInto;

use geo_types::Geometry;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry as GeoJsonGeometry, JsonObject, JsonValue};
use geosync_core_common::{
    DatasetSchema, Feature as Row, FieldDef, FieldType, GeometryType, Table, Value,
    WorkspaceError, WorkspaceResult,
};

use crate::SCHEMA_MEMBER;

/// Parse raw bytes holding a `FeatureCollection` (or a single feature) into a table.
///
/// The schema comes from the [`SCHEMA_MEMBER`] foreign member when present,
/// otherwise it is inferred from the feature properties.
///
/// # Errors
///
/// Returns [`WorkspaceError::Format`] when the bytes are not valid `GeoJSON`
/// or the embedded schema is malformed, and conformance errors when a
/// feature does not fit the embedded schema.
pub fn parse_geojson_bytes(bytes: &[u8], context: &str) -> WorkspaceResult<Table> {
    let geojson = GeoJson::from_reader(std::io::Cursor::new(bytes))
        .map_err(|e| format_error(context, format!("Failed to parse GeoJSON: {e}")))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        GeoJson::Feature(feature) => FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        },
        GeoJson::Geometry(geometry) => FeatureCollection {
            bbox: None,
            features: vec![Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        },
    };

    let embedded = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get(SCHEMA_MEMBER))
        .map(|schema| parse_schema(schema, context))
        .transpose()?;

    let rows = collection
        .features
        .into_iter()
        .map(|feature| feature_to_row(feature, context))
        .collect::<WorkspaceResult<Vec<_>>>()?;

    let schema = match embedded {
        Some(schema) => schema,
        None => infer_schema(&rows)?,
    };
    Table::from_features(schema, rows)
}

fn format_error(context: &str, message: String) -> WorkspaceError {
    WorkspaceError::Format {
        format: "GeoJSON".to_string(),
        context: context.to_string(),
        message,
    }
}

fn feature_to_row(feature: Feature, context: &str) -> WorkspaceResult<Row> {
    let geometry = match feature.geometry {
        Some(geometry) => Some(convert_geometry(geometry, context)?),
        None => None,
    };

    let attributes = feature
        .properties
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| (name, json_to_value(&value)))
        .collect();

    Ok(Row {
        attributes,
        geometry,
    })
}

fn convert_geometry(geometry: GeoJsonGeometry, context: &str) -> WorkspaceResult<Geometry<f64>> {
    geometry
        .try_into()
        .map_err(|err| format_error(context, format!("Failed to convert GeoJSON geometry: {err}")))
}

/// Converts a JSON property into an attribute value.
///
/// Arrays and objects have no attribute equivalent and are kept as their
/// JSON text.
#[must_use]
pub fn json_to_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        JsonValue::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn parse_schema(member: &JsonValue, context: &str) -> WorkspaceResult<DatasetSchema> {
    let invalid = |what: &str| format_error(context, format!("Invalid embedded schema: {what}"));

    let object = member.as_object().ok_or_else(|| invalid("not an object"))?;
    let geometry_type = object
        .get("geometry_type")
        .and_then(JsonValue::as_str)
        .and_then(GeometryType::parse)
        .ok_or_else(|| invalid("missing or unknown geometry_type"))?;

    let mut fields = Vec::new();
    for field in object
        .get("fields")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| invalid("missing fields"))?
    {
        let name = field
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| invalid("field without name"))?;
        let field_type = field
            .get("type")
            .and_then(JsonValue::as_str)
            .and_then(FieldType::parse)
            .ok_or_else(|| invalid(&format!("field '{name}' has unknown type")))?;
        let mut def = FieldDef::new(name, field_type);
        if let Some(length) = field.get("length").and_then(JsonValue::as_u64) {
            def = def.with_length(length as usize);
        }
        fields.push(def);
    }

    DatasetSchema::new(geometry_type, fields)
}

/// Serializes a schema into the foreign-member layout read by [`parse_geojson_bytes`].
#[must_use]
pub fn schema_to_json(schema: &DatasetSchema) -> JsonValue {
    let fields = schema
        .fields
        .iter()
        .map(|field| {
            let mut object = JsonObject::new();
            object.insert("name".to_string(), JsonValue::from(field.name.clone()));
            object.insert("type".to_string(), JsonValue::from(field.field_type.as_str()));
            if let Some(length) = field.length {
                object.insert("length".to_string(), JsonValue::from(length));
            }
            JsonValue::Object(object)
        })
        .collect::<Vec<_>>();

    let mut object = JsonObject::new();
    object.insert(
        "geometry_type".to_string(),
        JsonValue::from(schema.geometry_type.as_str()),
    );
    object.insert("fields".to_string(), JsonValue::Array(fields));
    JsonValue::Object(object)
}

fn infer_schema(rows: &[Row]) -> WorkspaceResult<DatasetSchema> {
    let geometry_type = rows
        .iter()
        .filter_map(|row| row.geometry.as_ref())
        .find_map(GeometryType::of)
        .unwrap_or_default();

    let mut fields: Vec<FieldDef> = Vec::new();
    for row in rows {
        for (name, value) in &row.attributes {
            let observed = match value {
                Value::Null => continue,
                Value::Bool(_) => FieldType::Boolean,
                Value::Int(_) => FieldType::Integer,
                Value::Float(_) => FieldType::Double,
                Value::Text(_) => FieldType::Text,
            };
            match fields
                .iter_mut()
                .find(|field| field.name.eq_ignore_ascii_case(name))
            {
                Some(field) => field.field_type = widen(field.field_type, observed),
                None => fields.push(FieldDef::new(name.clone(), observed)),
            }
        }
    }

    // Fields that are null in every row still need a column.
    for row in rows {
        for name in row.attributes.keys() {
            if !fields.iter().any(|field| field.name.eq_ignore_ascii_case(name)) {
                fields.push(FieldDef::new(name.clone(), FieldType::Text));
            }
        }
    }

    DatasetSchema::new(geometry_type, fields)
}

fn widen(current: FieldType, observed: FieldType) -> FieldType {
    match (current, observed) {
        (a, b) if a == b => a,
        (FieldType::Integer, FieldType::Double) | (FieldType::Double, FieldType::Integer) => {
            FieldType::Double
        },
        _ => FieldType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infers_schema_without_member() {
        let bytes = br#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
                 "properties": {"ADDR": "10 MAIN ST", "NUM": 10, "AREA": null}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [3.0, 4.0]},
                 "properties": {"ADDR": "12 MAIN ST", "NUM": 12.5, "AREA": null}}
            ]
        }"#;

        let table = parse_geojson_bytes(bytes, "points.geojson").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.schema.geometry_type, GeometryType::Point);
        assert_eq!(
            table.schema.field("NUM").unwrap().field_type,
            FieldType::Double
        );
        assert_eq!(
            table.schema.field("AREA").unwrap().field_type,
            FieldType::Text
        );
        assert_eq!(table.features[0].get("NUM"), &Value::Float(10.0));
    }

    #[test]
    fn test_embedded_schema_wins() {
        let bytes = br#"{
            "type": "FeatureCollection",
            "geosync:schema": {
                "geometry_type": "none",
                "fields": [{"name": "PID", "type": "text", "length": 4}]
            },
            "features": [
                {"type": "Feature", "geometry": null, "properties": {"PID": 123456}}
            ]
        }"#;

        let table = parse_geojson_bytes(bytes, "owners.geojson").unwrap();
        assert_eq!(table.schema.field("PID").unwrap().length, Some(4));
        assert_eq!(table.features[0].get("PID"), &Value::from("1234"));
    }

    #[test]
    fn test_bad_schema_member() {
        let bytes = br#"{
            "type": "FeatureCollection",
            "geosync:schema": {"geometry_type": "raster", "fields": []},
            "features": []
        }"#;
        let err = parse_geojson_bytes(bytes, "bad.geojson").unwrap_err();
        assert!(err.to_string().contains("geometry_type"));
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_geojson_bytes(b"{not json", "broken.geojson").unwrap_err();
        assert!(matches!(err, WorkspaceError::Format { .. }));
    }
}

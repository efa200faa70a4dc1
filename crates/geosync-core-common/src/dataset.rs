//! Dataset model shared by workspaces, formats and pipeline steps.
//!
//! A dataset is a table or spatial layer inside a workspace. Its schema is an
//! ordered list of typed fields plus a geometry type; its rows are
//! [`Feature`]s whose attribute keys always use the schema's spelling of each
//! field name once they have passed through [`DatasetSchema::conform`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use geo_types::Geometry;
use thiserror::Error;

use crate::workspace::{WorkspaceError, WorkspaceResult};

/// Null value returned by lookups of absent attributes.
pub static NULL: Value = Value::Null;

/// Geometry type of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeometryType {
    /// Attribute-only table.
    #[default]
    None,
    /// Point or multipoint features.
    Point,
    /// Line or multiline features.
    Line,
    /// Polygon or multipolygon features.
    Polygon,
}

impl GeometryType {
    /// Returns the lowercase name used in configuration and file metadata.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::None => "none",
            GeometryType::Point => "point",
            GeometryType::Line => "line",
            GeometryType::Polygon => "polygon",
        }
    }

    /// Parses a geometry type name, accepting the common GIS aliases.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "table" => Some(GeometryType::None),
            "point" | "multipoint" => Some(GeometryType::Point),
            "line" | "polyline" | "linestring" | "multilinestring" => Some(GeometryType::Line),
            "polygon" | "multipolygon" => Some(GeometryType::Polygon),
            _ => None,
        }
    }

    /// Classifies a concrete geometry. Mixed collections have no single type.
    #[must_use]
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(GeometryType::Point),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Some(GeometryType::Line)
            },
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Some(GeometryType::Polygon),
            Geometry::GeometryCollection(_) => None,
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage type of an attribute field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Variable length text, optionally bounded by [`FieldDef::length`].
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Double,
    /// Boolean flag.
    Boolean,
}

impl FieldType {
    /// Returns the lowercase name used in configuration and file metadata.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
        }
    }

    /// Parses a field type name, accepting the common GIS aliases.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" | "string" => Some(FieldType::Text),
            "integer" | "long" | "short" | "int" => Some(FieldType::Integer),
            "double" | "float" | "number" => Some(FieldType::Double),
            "boolean" | "bool" => Some(FieldType::Boolean),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single attribute field definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name as stored in the dataset.
    pub name: String,
    /// Storage type.
    pub field_type: FieldType,
    /// Maximum text length; only meaningful for [`FieldType::Text`].
    pub length: Option<usize>,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            length: None,
        }
    }

    #[must_use]
    pub fn text(name: impl Into<String>, length: usize) -> Self {
        Self::new(name, FieldType::Text).with_length(length)
    }

    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    #[must_use]
    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Double)
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    #[must_use]
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Same type and length under another name.
    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Schema of a dataset: geometry type plus ordered attribute fields.
///
/// Field names are unique without regard to case, matching how geodatabases
/// resolve field names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatasetSchema {
    /// Geometry type of every feature in the dataset.
    pub geometry_type: GeometryType,
    /// Attribute fields in storage order.
    pub fields: Vec<FieldDef>,
}

impl DatasetSchema {
    /// Builds a schema, rejecting duplicate field names.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SchemaMismatch`] when two fields share a name.
    pub fn new(geometry_type: GeometryType, fields: Vec<FieldDef>) -> WorkspaceResult<Self> {
        let mut schema = Self {
            geometry_type,
            fields: Vec::with_capacity(fields.len()),
        };
        for field in fields {
            schema.push_field(field)?;
        }
        Ok(schema)
    }

    /// Builds an attribute-only schema.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SchemaMismatch`] when two fields share a name.
    pub fn table(fields: Vec<FieldDef>) -> WorkspaceResult<Self> {
        Self::new(GeometryType::None, fields)
    }

    /// Appends a field to the schema.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SchemaMismatch`] when the name is already taken.
    pub fn push_field(&mut self, field: FieldDef) -> WorkspaceResult<()> {
        if self.has_field(&field.name) {
            return Err(WorkspaceError::schema(format!(
                "duplicate field '{}'",
                field.name
            )));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Looks up a field by name, ignoring case.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    /// Coerces a feature into this schema.
    ///
    /// Attribute names are resolved case-insensitively and rewritten to the
    /// schema's spelling, values are coerced to the field types, attributes
    /// with no matching field are dropped and missing fields become null.
    /// Geometry is dropped for attribute-only schemas.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SchemaMismatch`] when a value cannot be
    /// coerced, or [`WorkspaceError::Geometry`] when the feature's geometry
    /// does not match the schema's geometry type.
    pub fn conform(&self, feature: Feature) -> WorkspaceResult<Feature> {
        let Feature {
            attributes,
            geometry,
        } = feature;

        let mut conformed = BTreeMap::new();
        for field in &self.fields {
            let value = attributes
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&field.name))
                .map_or(Value::Null, |(_, value)| value.clone());
            conformed.insert(field.name.clone(), value.coerce(field)?);
        }

        let geometry = match (self.geometry_type, geometry) {
            (GeometryType::None, _) | (_, None) => None,
            (expected, Some(geometry)) => match GeometryType::of(&geometry) {
                Some(actual) if actual == expected => Some(geometry),
                actual => {
                    return Err(WorkspaceError::Geometry {
                        message: format!(
                            "expected {expected} geometry, found {}",
                            actual.map_or("mixed collection", |t| t.as_str())
                        ),
                    });
                },
            },
        };

        Ok(Feature {
            attributes: conformed,
            geometry,
        })
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as a float when it is numeric or numeric text.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Bool(_) | Value::Null => None,
        }
    }

    /// Returns the text form of the value, or `None` for null.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Normalized key used for attribute joins and grouping.
    ///
    /// Integral floats and integers produce the same key, and text is
    /// trimmed, so a key stored as `"0101"` text only matches itself while
    /// `1` and `1.0` match each other.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                Some(format!("{}", *v as i64))
            },
            Value::Text(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Coerces the value to the storage type of `field`.
    ///
    /// Empty text becomes null for non-text fields and text longer than the
    /// field length is truncated.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SchemaMismatch`] when the value cannot be
    /// represented in the field's type.
    pub fn coerce(&self, field: &FieldDef) -> WorkspaceResult<Value> {
        let mismatch = || {
            WorkspaceError::schema(format!(
                "value '{self}' cannot be stored in {} field '{}'",
                field.field_type, field.name
            ))
        };

        let coerced = match (field.field_type, self) {
            (_, Value::Null) => Value::Null,
            (FieldType::Text, value) => {
                let text = value.to_string();
                match field.length {
                    Some(max) if text.chars().count() > max => {
                        Value::Text(text.chars().take(max).collect())
                    },
                    _ => Value::Text(text),
                }
            },
            (_, Value::Text(s)) if s.trim().is_empty() => Value::Null,
            (FieldType::Integer, Value::Int(v)) => Value::Int(*v),
            (FieldType::Integer, Value::Float(v)) if v.is_finite() => Value::Int(v.trunc() as i64),
            (FieldType::Integer, Value::Bool(b)) => Value::Int(i64::from(*b)),
            (FieldType::Integer, Value::Text(s)) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(v) => Value::Int(v),
                    Err(_) => match s.parse::<f64>() {
                        Ok(v) if v.is_finite() => Value::Int(v.trunc() as i64),
                        _ => return Err(mismatch()),
                    },
                }
            },
            (FieldType::Double, Value::Int(v)) => Value::Float(*v as f64),
            (FieldType::Double, Value::Float(v)) => Value::Float(*v),
            (FieldType::Double, Value::Bool(b)) => Value::Float(if *b { 1.0 } else { 0.0 }),
            (FieldType::Double, Value::Text(s)) => {
                Value::Float(s.trim().parse().map_err(|_| mismatch())?)
            },
            (FieldType::Boolean, Value::Bool(b)) => Value::Bool(*b),
            (FieldType::Boolean, Value::Int(v)) => Value::Bool(*v != 0),
            (FieldType::Boolean, Value::Text(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "yes" | "y" | "1" => Value::Bool(true),
                    "false" | "f" | "no" | "n" | "0" => Value::Bool(false),
                    _ => return Err(mismatch()),
                }
            },
            _ => return Err(mismatch()),
        };
        Ok(coerced)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// One row of a dataset: named attributes plus optional geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub attributes: BTreeMap<String, Value>,
    pub geometry: Option<Geometry<f64>>,
}

impl Feature {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_geometry(mut self, geometry: impl Into<Geometry<f64>>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    /// Returns the attribute value, or null when the attribute is absent.
    #[must_use]
    pub fn get(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&NULL)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }
}

/// A fully materialized dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub schema: DatasetSchema,
    pub features: Vec<Feature>,
}

impl Table {
    #[must_use]
    pub fn new(schema: DatasetSchema) -> Self {
        Self {
            schema,
            features: Vec::new(),
        }
    }

    /// Builds a table, conforming every feature to the schema.
    ///
    /// # Errors
    ///
    /// Returns the first conformance error, see [`DatasetSchema::conform`].
    pub fn from_features(schema: DatasetSchema, features: Vec<Feature>) -> WorkspaceResult<Self> {
        let features = features
            .into_iter()
            .map(|feature| schema.conform(feature))
            .collect::<WorkspaceResult<Vec<_>>>()?;
        Ok(Self { schema, features })
    }

    /// Conforms and appends a feature.
    ///
    /// # Errors
    ///
    /// Returns the conformance error, see [`DatasetSchema::conform`].
    pub fn push(&mut self, feature: Feature) -> WorkspaceResult<()> {
        let feature = self.schema.conform(feature)?;
        self.features.push(feature);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Returns a table holding only the rows at the given indices.
    #[must_use]
    pub fn select(&self, rows: &[usize]) -> Table {
        Table {
            schema: self.schema.clone(),
            features: rows
                .iter()
                .filter_map(|&row| self.features.get(row).cloned())
                .collect(),
        }
    }
}

/// Error returned when a `workspace/name` reference cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid dataset reference '{0}': expected 'workspace/dataset'")]
pub struct ParseDatasetRefError(pub String);

/// Reference to a dataset inside a named workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetRef {
    pub workspace: String,
    pub name: String,
}

impl DatasetRef {
    #[must_use]
    pub fn new(workspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            name: name.into(),
        }
    }
}

impl FromStr for DatasetRef {
    type Err = ParseDatasetRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((workspace, name))
                if !workspace.trim().is_empty()
                    && !name.trim().is_empty()
                    && !name.contains('/') =>
            {
                Ok(Self::new(workspace.trim(), name.trim()))
            },
            _ => Err(ParseDatasetRefError(s.to_string())),
        }
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, Point, polygon};

    fn parcel_schema() -> DatasetSchema {
        DatasetSchema::new(
            GeometryType::Polygon,
            vec![
                FieldDef::text("PID", 20),
                FieldDef::integer("LINE_ID"),
                FieldDef::double("ACRES"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_fields_rejected_ignoring_case() {
        let err = DatasetSchema::table(vec![FieldDef::integer("pid"), FieldDef::integer("PID")])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate field"));
    }

    #[test]
    fn test_conform_renames_and_coerces() {
        let schema = parcel_schema();
        let feature = Feature::new()
            .with("pid", "0101-001")
            .with("line_id", "1")
            .with("Acres", 2_i64)
            .with("EXTRA", "dropped")
            .with_geometry(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]);

        let conformed = schema.conform(feature).unwrap();
        assert_eq!(conformed.get("PID"), &Value::from("0101-001"));
        assert_eq!(conformed.get("LINE_ID"), &Value::Int(1));
        assert_eq!(conformed.get("ACRES"), &Value::Float(2.0));
        assert!(conformed.get("EXTRA").is_null());
        assert!(conformed.geometry.is_some());
    }

    #[test]
    fn test_conform_rejects_wrong_geometry() {
        let err = parcel_schema()
            .conform(Feature::new().with_geometry(Point::new(1.0, 2.0)))
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Geometry { .. }));
    }

    #[test]
    fn test_conform_drops_geometry_for_tables() {
        let schema = DatasetSchema::table(vec![FieldDef::integer("ID")]).unwrap();
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        let conformed = schema
            .conform(Feature::new().with("ID", 4_i64).with_geometry(line))
            .unwrap();
        assert!(conformed.geometry.is_none());
    }

    #[test]
    fn test_text_truncated_to_length() {
        let field = FieldDef::text("NAME", 4);
        assert_eq!(
            Value::from("MEADVILLE").coerce(&field).unwrap(),
            Value::from("MEAD")
        );
    }

    #[test]
    fn test_coerce_failures() {
        assert!(Value::from("abc").coerce(&FieldDef::integer("N")).is_err());
        assert!(Value::from("maybe").coerce(&FieldDef::boolean("B")).is_err());
        assert_eq!(
            Value::from("  ").coerce(&FieldDef::double("D")).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_key_normalizes_numbers() {
        assert_eq!(Value::Int(1).key(), Value::Float(1.0).key());
        assert_eq!(Value::from(" 23 ").key().as_deref(), Some("23"));
        assert_eq!(Value::Null.key(), None);
    }

    #[test]
    fn test_dataset_ref_parse() {
        let reference: DatasetRef = "web/Parcels".parse().unwrap();
        assert_eq!(reference, DatasetRef::new("web", "Parcels"));
        assert_eq!(reference.to_string(), "web/Parcels");
        assert!("Parcels".parse::<DatasetRef>().is_err());
        assert!("web/".parse::<DatasetRef>().is_err());
        assert!("a/b/c".parse::<DatasetRef>().is_err());
    }

    #[test]
    fn test_geometry_type_parse_aliases() {
        assert_eq!(GeometryType::parse("Polyline"), Some(GeometryType::Line));
        assert_eq!(GeometryType::parse("table"), Some(GeometryType::None));
        assert_eq!(GeometryType::parse("raster"), None);
    }
}

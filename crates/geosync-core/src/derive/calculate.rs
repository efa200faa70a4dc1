use geosync_core_common::{Feature, FieldDef, Table, Value};

use super::require_field;
use crate::error::Result;
use crate::translate::LookupTables;

/// Piece of a concatenated value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConcatPart {
    Field(String),
    Literal(String),
}

/// How a calculated field gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Calculation {
    /// The same value for every row.
    Constant(Value),
    /// Value of another field.
    Copy { field: String },
    /// Value of another field passed through a lookup table.
    Translate { field: String, table: String },
    /// Non-empty parts joined by `separator`.
    Concat {
        parts: Vec<ConcatPart>,
        separator: String,
    },
    /// Uppercased text of another field.
    Upper { field: String },
}

impl Calculation {
    fn source_fields(&self) -> Vec<&str> {
        match self {
            Self::Constant(_) => Vec::new(),
            Self::Copy { field } | Self::Translate { field, .. } | Self::Upper { field } => {
                vec![field.as_str()]
            },
            Self::Concat { parts, .. } => parts
                .iter()
                .filter_map(|part| match part {
                    ConcatPart::Field(name) => Some(name.as_str()),
                    ConcatPart::Literal(_) => None,
                })
                .collect(),
        }
    }
}

/// Sets `target` on every row of `table`, adding the field if needed.
///
/// # Errors
///
/// Returns missing-field errors for source fields, unknown lookup tables,
/// and values that cannot be stored in `target`.
pub fn calculate_field(
    mut table: Table,
    target: &FieldDef,
    calculation: &Calculation,
    tables: &LookupTables,
) -> Result<Table> {
    for name in calculation.source_fields() {
        require_field(&table.schema, name, "calculate input")?;
    }
    let translator = match calculation {
        Calculation::Translate { table, .. } => Some(tables.get(table)?),
        _ => None,
    };

    let target = match table.schema.field(&target.name) {
        Some(existing) => existing.clone(),
        None => {
            table.schema.push_field(target.clone())?;
            target.clone()
        },
    };

    let canonical = |feature: &Feature, name: &str| -> Value {
        table
            .schema
            .field(name)
            .map_or(Value::Null, |f| feature.get(&f.name).clone())
    };

    let mut values = Vec::with_capacity(table.features.len());
    for feature in &table.features {
        let value = match calculation {
            Calculation::Constant(value) => value.clone(),
            Calculation::Copy { field } => canonical(feature, field),
            Calculation::Translate { field, .. } => {
                let raw = canonical(feature, field);
                translator.map_or(raw.clone(), |t| t.translate(&raw))
            },
            Calculation::Upper { field } => match canonical(feature, field) {
                Value::Null => Value::Null,
                other => Value::Text(other.to_string().to_uppercase()),
            },
            Calculation::Concat { parts, separator } => {
                let pieces: Vec<String> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ConcatPart::Field(name) => canonical(feature, name).as_text(),
                        ConcatPart::Literal(text) => Some(text.clone()),
                    })
                    .map(|piece| piece.trim().to_string())
                    .filter(|piece| !piece.is_empty())
                    .collect();
                if pieces.is_empty() {
                    Value::Null
                } else {
                    Value::Text(pieces.join(separator))
                }
            },
        };
        values.push(value.coerce(&target)?);
    }

    for (feature, value) in table.features.iter_mut().zip(values) {
        feature.set(target.name.clone(), value);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::shipped_tables;
    use geosync_core_common::{DatasetSchema, GeometryType};

    fn addresses() -> Table {
        let schema = DatasetSchema::new(
            GeometryType::None,
            vec![
                FieldDef::integer("ADDNUM"),
                FieldDef::text("PREDIR", 2),
                FieldDef::text("STREET", 30),
                FieldDef::text("SUFFIX", 4),
                FieldDef::text("DISTRICT", 4),
            ],
        )
        .unwrap();
        Table::from_features(
            schema,
            vec![
                Feature::new()
                    .with("ADDNUM", 10_i64)
                    .with("PREDIR", "N")
                    .with("STREET", "Main")
                    .with("SUFFIX", "ST")
                    .with("DISTRICT", "23"),
                Feature::new()
                    .with("ADDNUM", 4_i64)
                    .with("STREET", "Park")
                    .with("SUFFIX", "AVE")
                    .with("DISTRICT", "99"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_concat_skips_empty_parts() {
        let calc = Calculation::Concat {
            parts: vec![
                ConcatPart::Field("ADDNUM".to_string()),
                ConcatPart::Field("PREDIR".to_string()),
                ConcatPart::Field("STREET".to_string()),
                ConcatPart::Field("SUFFIX".to_string()),
            ],
            separator: " ".to_string(),
        };
        let table = calculate_field(
            addresses(),
            &FieldDef::text("FULLADDR", 60),
            &calc,
            &LookupTables::new(),
        )
        .unwrap();
        assert_eq!(table.features[0].get("FULLADDR"), &Value::from("10 N Main ST"));
        assert_eq!(table.features[1].get("FULLADDR"), &Value::from("4 Park AVE"));
    }

    #[test]
    fn test_translate_into_existing_field() {
        let calc = Calculation::Translate {
            field: "DISTRICT".to_string(),
            table: "municipal_districts".to_string(),
        };
        let table = calculate_field(
            addresses(),
            &FieldDef::text("MUNI", 30),
            &calc,
            &shipped_tables().unwrap(),
        )
        .unwrap();
        assert_eq!(table.features[0].get("MUNI"), &Value::from("MEADVILLE CITY"));
        assert_eq!(table.features[1].get("MUNI"), &Value::from("99"));
    }

    #[test]
    fn test_upper_and_constant() {
        let upper = calculate_field(
            addresses(),
            &FieldDef::text("street", 30),
            &Calculation::Upper {
                field: "STREET".to_string(),
            },
            &LookupTables::new(),
        )
        .unwrap();
        assert_eq!(upper.schema.fields.len(), 5);
        assert_eq!(upper.features[1].get("STREET"), &Value::from("PARK"));

        let constant = calculate_field(
            addresses(),
            &FieldDef::text("STATE", 2),
            &Calculation::Constant(Value::from("PA")),
            &LookupTables::new(),
        )
        .unwrap();
        assert!(constant.features.iter().all(|f| f.get("STATE") == &Value::from("PA")));
    }

    #[test]
    fn test_unknown_table_and_field() {
        let err = calculate_field(
            addresses(),
            &FieldDef::text("X", 4),
            &Calculation::Translate {
                field: "DISTRICT".to_string(),
                table: "nope".to_string(),
            },
            &LookupTables::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("nope"));

        let err = calculate_field(
            addresses(),
            &FieldDef::text("X", 4),
            &Calculation::Copy {
                field: "OWNER".to_string(),
            },
            &LookupTables::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("OWNER"));
    }
}

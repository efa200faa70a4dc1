use geosync_core_common::Table;

use crate::error::Result;
use crate::filter::AttributeFilter;
use crate::mapping::FieldMapping;

/// Copies the rows of `table` matching `filter`, optionally reshaped by
/// `mapping`. Without a mapping the input schema is kept.
///
/// # Errors
///
/// Returns filter errors, missing mapping sources, and values that do not
/// fit the mapped schema.
pub async fn filtered_copy(
    table: &Table,
    filter: Option<&AttributeFilter>,
    mapping: Option<&FieldMapping>,
) -> Result<Table> {
    let selected = match filter {
        Some(filter) => filter.apply(table).await?,
        None => table.clone(),
    };
    let Some(mapping) = mapping else {
        return Ok(selected);
    };

    mapping.validate(&selected.schema, "copy input")?;
    let mut output = Table::new(mapping.output_schema(selected.schema.geometry_type)?);
    for feature in &selected.features {
        output.push(mapping.apply(feature, &selected.schema)?)?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FieldMap;
    use geo_types::Point;
    use geosync_core_common::{DatasetSchema, Feature, FieldDef, GeometryType, Value};

    fn permits() -> Table {
        let schema = DatasetSchema::new(
            GeometryType::Point,
            vec![FieldDef::text("PERMIT_NO", 12), FieldDef::text("TYPE", 2)],
        )
        .unwrap();
        Table::from_features(
            schema,
            vec![
                Feature::new()
                    .with("PERMIT_NO", "P-1")
                    .with("TYPE", "10")
                    .with_geometry(Point::new(0.0, 0.0)),
                Feature::new()
                    .with("PERMIT_NO", "P-2")
                    .with("TYPE", "16")
                    .with_geometry(Point::new(1.0, 0.0)),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_filter_only_keeps_schema() {
        let filter = AttributeFilter::new("TYPE = '16'");
        let copy = filtered_copy(&permits(), Some(&filter), None).await.unwrap();
        assert_eq!(copy.schema, permits().schema);
        assert_eq!(copy.len(), 1);
        assert_eq!(copy.features[0].get("PERMIT_NO"), &Value::from("P-2"));
    }

    #[tokio::test]
    async fn test_mapping_reshapes_and_keeps_geometry() {
        let mapping = FieldMapping::new(vec![FieldMap::new(
            FieldDef::text("PERMIT", 12),
            Some("PERMIT_NO".to_string()),
        )]);
        let copy = filtered_copy(&permits(), None, Some(&mapping)).await.unwrap();
        assert_eq!(copy.schema.field_names(), vec!["PERMIT"]);
        assert_eq!(copy.len(), 2);
        assert!(copy.features.iter().all(|f| f.geometry.is_some()));
    }
}

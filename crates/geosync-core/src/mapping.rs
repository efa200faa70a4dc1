//! Field mappings between source and destination schemas.

use geosync_core_common::{DatasetSchema, Feature, FieldDef, GeometryType, Value};

use crate::error::{DerivationError, Result};

/// One destination field and where its value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    /// Destination field
    pub destination: FieldDef,
    /// Source field, or `None` to leave the destination null
    pub source: Option<String>,
}

impl FieldMap {
    #[must_use]
    pub fn new(destination: FieldDef, source: Option<String>) -> Self {
        Self {
            destination,
            source,
        }
    }
}

/// Ordered list of destination fields with their sources.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldMapping {
    entries: Vec<FieldMap>,
}

impl FieldMapping {
    #[must_use]
    pub fn new(entries: Vec<FieldMap>) -> Self {
        Self { entries }
    }

    /// Maps every destination field from the same-named source field.
    ///
    /// Destination fields without a counterpart stay null.
    #[must_use]
    pub fn by_name(source: &DatasetSchema, destination: &DatasetSchema) -> Self {
        Self::new(
            destination
                .fields
                .iter()
                .map(|field| {
                    let from = source.field(&field.name).map(|f| f.name.clone());
                    FieldMap::new(field.clone(), from)
                })
                .collect(),
        )
    }

    /// Maps every source field onto itself.
    #[must_use]
    pub fn identity(source: &DatasetSchema) -> Self {
        Self::by_name(source, source)
    }

    #[must_use]
    pub fn entries(&self) -> &[FieldMap] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that every named source field exists.
    ///
    /// # Errors
    ///
    /// Returns [`DerivationError::MissingField`] for the first absent field.
    pub fn validate(&self, source: &DatasetSchema, source_name: &str) -> Result<()> {
        for entry in &self.entries {
            if let Some(name) = &entry.source
                && !source.has_field(name)
            {
                return Err(DerivationError::MissingField {
                    dataset: source_name.to_string(),
                    field: name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Checks that every destination field exists in `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`DerivationError::MissingField`] for the first absent field.
    pub fn validate_destination(
        &self,
        destination: &DatasetSchema,
        destination_name: &str,
    ) -> Result<()> {
        match self
            .entries
            .iter()
            .find(|e| !destination.has_field(&e.destination.name))
        {
            Some(entry) => Err(DerivationError::MissingField {
                dataset: destination_name.to_string(),
                field: entry.destination.name.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Schema produced by applying the mapping.
    ///
    /// # Errors
    ///
    /// Returns a schema error when two entries share a destination name.
    pub fn output_schema(&self, geometry_type: GeometryType) -> Result<DatasetSchema> {
        Ok(DatasetSchema::new(
            geometry_type,
            self.entries.iter().map(|e| e.destination.clone()).collect(),
        )?)
    }

    /// Builds the destination feature. Geometry is carried over unchanged.
    ///
    /// # Errors
    ///
    /// Returns a schema error when a value cannot be stored in its
    /// destination field.
    pub fn apply(&self, feature: &Feature, source: &DatasetSchema) -> Result<Feature> {
        let mut mapped = Feature {
            attributes: Default::default(),
            geometry: feature.geometry.clone(),
        };
        for entry in &self.entries {
            let value = match &entry.source {
                Some(name) => source
                    .field(name)
                    .map_or(&Value::Null, |f| feature.get(&f.name)),
                None => &Value::Null,
            };
            mapped.set(
                entry.destination.name.clone(),
                value.coerce(&entry.destination)?,
            );
        }
        Ok(mapped)
    }
}

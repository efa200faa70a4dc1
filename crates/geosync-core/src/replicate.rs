//! Full-reload replication from a source dataset to a destination dataset.
//!
//! The destination keeps its own schema; source rows are mapped onto it
//! and swapped in through [`Workspace::replace`], so readers see either the
//! previous content or the new content.
//!
//! [`Workspace::replace`]: geosync_core_common::Workspace::replace

use geosync_core_common::DatasetRef;
use log::info;

use crate::context::Catalog;
use crate::error::Result;
use crate::filter::AttributeFilter;
use crate::mapping::FieldMapping;

/// One source-to-destination reload.
#[derive(Debug, Clone)]
pub struct Replication {
    pub source: DatasetRef,
    pub destination: DatasetRef,
    /// Explicit mapping; `None` maps destination fields by name.
    pub mapping: Option<FieldMapping>,
    /// Optional row filter applied to the source.
    pub filter: Option<AttributeFilter>,
}

impl Replication {
    #[must_use]
    pub fn new(source: DatasetRef, destination: DatasetRef) -> Self {
        Self {
            source,
            destination,
            mapping: None,
            filter: None,
        }
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: AttributeFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Replaces the destination's rows with the (mapped, filtered) source rows.
///
/// Returns the destination row count afterwards. Running it twice against
/// an unchanged source leaves the destination identical.
///
/// # Errors
///
/// Fails on connectivity, locks, missing datasets or fields, and values
/// that do not fit the destination schema. The destination keeps its prior
/// rows on any failure.
pub async fn replicate(catalog: &Catalog, replication: &Replication) -> Result<u64> {
    let source_ws = catalog.workspace(&replication.source.workspace)?;
    let destination_ws = catalog.workspace(&replication.destination.workspace)?;

    let source = source_ws.read(&replication.source.name).await?;
    let destination_schema = destination_ws
        .describe(&replication.destination.name)
        .await?;

    let mapping = replication
        .mapping
        .clone()
        .unwrap_or_else(|| FieldMapping::by_name(&source.schema, &destination_schema));
    mapping.validate(&source.schema, &replication.source.to_string())?;
    mapping.validate_destination(&destination_schema, &replication.destination.to_string())?;

    let source = match &replication.filter {
        Some(filter) => filter.apply(&source).await?,
        None => source,
    };

    let features = source
        .features
        .iter()
        .map(|feature| mapping.apply(feature, &source.schema))
        .collect::<Result<Vec<_>>>()?;

    let count = destination_ws
        .replace(&replication.destination.name, features)
        .await?;
    info!(
        "Replicated {} -> {} ({count} rows)",
        replication.source, replication.destination
    );
    Ok(count)
}

//! Built-in pipeline steps.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geosync_core_common::{DatasetRef, FieldDef};
use geosync_csv::{CsvReaderOptions, GeometryColumns};

use crate::context::RunContext;
use crate::derive::{
    Calculation, DissolveSpec, JoinSpec, SpatialJoinSpec, attribute_join, calculate_field,
    dissolve, filtered_copy, intersect, spatial_join,
};
use crate::error::Result;
use crate::export::{PackageExport, export_package, export_spreadsheet, import_table};
use crate::filter::{AttributeFilter, apply_optional};
use crate::geocode::{geocode, split_by_status, status_counts};
use crate::locator::{LocatorDefinition, ServiceDefinition, ServiceHost, publish, rebuild};
use crate::mapping::FieldMapping;
use crate::replicate::{Replication, replicate};
use crate::stage::{Step, StepOutcome};

/// A configured step.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Full reload of one dataset from another.
    Replicate(Replication),
    FilteredCopy {
        source: DatasetRef,
        destination: DatasetRef,
        filter: Option<AttributeFilter>,
        mapping: Option<FieldMapping>,
        /// Append to an existing destination instead of replacing it
        append: bool,
    },
    Join {
        primary: DatasetRef,
        secondary: DatasetRef,
        /// Applied to the secondary table before joining
        secondary_filter: Option<AttributeFilter>,
        output: DatasetRef,
        spec: JoinSpec,
    },
    SpatialJoin {
        target: DatasetRef,
        join: DatasetRef,
        output: DatasetRef,
        spec: SpatialJoinSpec,
    },
    Dissolve {
        input: DatasetRef,
        output: DatasetRef,
        spec: DissolveSpec,
    },
    Intersect {
        input: DatasetRef,
        overlay: DatasetRef,
        output: DatasetRef,
    },
    /// Sets a field in place.
    Calculate {
        dataset: DatasetRef,
        field: FieldDef,
        calculation: Calculation,
    },
    /// Matches addresses; unmatched rows go to the review spreadsheet.
    Geocode {
        input: DatasetRef,
        locator: String,
        address_fields: Vec<String>,
        output: DatasetRef,
        unmatched_spreadsheet: Option<PathBuf>,
    },
    ExportSpreadsheet {
        dataset: DatasetRef,
        filter: Option<AttributeFilter>,
        path: PathBuf,
        geometry: GeometryColumns,
    },
    ExportPackage(PackageExport),
    ImportTable {
        path: PathBuf,
        destination: DatasetRef,
        options: CsvReaderOptions,
    },
    RebuildLocator(LocatorDefinition),
    PublishLocator {
        locator: String,
        service: ServiceDefinition,
        host: Arc<dyn ServiceHost>,
    },
    Delete {
        dataset: DatasetRef,
    },
    /// Pause, e.g. to let a service release a dataset.
    Wait {
        duration: Duration,
    },
}

#[async_trait]
impl Step for Operation {
    fn describe(&self) -> String {
        match self {
            Self::Replicate(r) => format!("Replicate {} -> {}", r.source, r.destination),
            Self::FilteredCopy {
                source,
                destination,
                append: true,
                ..
            } => format!("Append {source} -> {destination}"),
            Self::FilteredCopy {
                source,
                destination,
                ..
            } => format!("Copy {source} -> {destination}"),
            Self::Join {
                primary,
                secondary,
                output,
                ..
            } => format!("Join {secondary} onto {primary} -> {output}"),
            Self::SpatialJoin {
                target,
                join,
                output,
                ..
            } => format!("Spatial join {join} onto {target} -> {output}"),
            Self::Dissolve { input, output, .. } => format!("Dissolve {input} -> {output}"),
            Self::Intersect {
                input,
                overlay,
                output,
            } => format!("Intersect {input} with {overlay} -> {output}"),
            Self::Calculate { dataset, field, .. } => {
                format!("Calculate {}.{}", dataset, field.name)
            },
            Self::Geocode {
                input,
                locator,
                output,
                ..
            } => format!("Geocode {input} with {locator} -> {output}"),
            Self::ExportSpreadsheet { dataset, path, .. } => {
                format!("Export {dataset} to {}", path.display())
            },
            Self::ExportPackage(p) => format!("Package {} datasets as {}", p.datasets.len(), p.prefix),
            Self::ImportTable {
                path, destination, ..
            } => format!("Import {} into {destination}", path.display()),
            Self::RebuildLocator(d) => format!("Rebuild locator {}", d.name),
            Self::PublishLocator {
                locator, service, ..
            } => format!("Publish locator {locator} as {}", service.service_name),
            Self::Delete { dataset } => format!("Delete {dataset}"),
            Self::Wait { duration } => format!("Wait {}s", duration.as_secs()),
        }
    }

    async fn run(&self, ctx: &RunContext) -> Result<StepOutcome> {
        let catalog = &ctx.catalog;
        match self {
            Self::Replicate(replication) => {
                Ok(StepOutcome::rows(replicate(catalog, replication).await?))
            },
            Self::FilteredCopy {
                source,
                destination,
                filter,
                mapping,
                append,
            } => {
                let table = catalog.read(source).await?;
                let copy = filtered_copy(&table, filter.as_ref(), mapping.as_ref()).await?;
                let rows = if *append {
                    catalog
                        .workspace(&destination.workspace)?
                        .append(&destination.name, copy.features)
                        .await?
                } else {
                    catalog.store(destination, copy).await?
                };
                Ok(StepOutcome::rows(rows))
            },
            Self::Join {
                primary,
                secondary,
                secondary_filter,
                output,
                spec,
            } => {
                let primary = catalog.read(primary).await?;
                let secondary =
                    apply_optional(secondary_filter.as_ref(), catalog.read(secondary).await?)
                        .await?;
                let joined = attribute_join(&primary, &secondary, spec)?;
                if joined.duplicate_keys > 0 {
                    ctx.log.warn(format!(
                        "    {} duplicate join keys ignored",
                        joined.duplicate_keys
                    ))?;
                }
                let rows = catalog.store(output, joined.table).await?;
                Ok(StepOutcome {
                    rows: Some(rows),
                    detail: Some(format!("{} without a match", joined.unmatched)),
                })
            },
            Self::SpatialJoin {
                target,
                join,
                output,
                spec,
            } => {
                let target = catalog.read(target).await?;
                let join = catalog.read(join).await?;
                let joined = spatial_join(&target, &join, spec)?;
                Ok(StepOutcome::rows(catalog.store(output, joined).await?))
            },
            Self::Dissolve {
                input,
                output,
                spec,
            } => {
                let dissolved = dissolve(&catalog.read(input).await?, spec)?;
                Ok(StepOutcome::rows(catalog.store(output, dissolved).await?))
            },
            Self::Intersect {
                input,
                overlay,
                output,
            } => {
                let input = catalog.read(input).await?;
                let overlay = catalog.read(overlay).await?;
                let pieces = intersect(&input, &overlay)?;
                Ok(StepOutcome::rows(catalog.store(output, pieces).await?))
            },
            Self::Calculate {
                dataset,
                field,
                calculation,
            } => {
                let table = catalog.read(dataset).await?;
                let calculated = calculate_field(table, field, calculation, &ctx.tables)?;
                Ok(StepOutcome::rows(catalog.store(dataset, calculated).await?))
            },
            Self::Geocode {
                input,
                locator,
                address_fields,
                output,
                unmatched_spreadsheet,
            } => {
                let locator = ctx.locators.load(locator)?;
                let table = catalog.read(input).await?;
                let geocoded = geocode(&table, &locator, address_fields, &ctx.normalizer)?;
                let (matched, tied, unmatched_count) = status_counts(&geocoded);
                let (proceed, unmatched) = split_by_status(&geocoded)?;
                if let Some(path) = unmatched_spreadsheet {
                    export_spreadsheet(&unmatched, path, GeometryColumns::Omit)?;
                }
                let rows = catalog.store(output, proceed).await?;
                Ok(StepOutcome {
                    rows: Some(rows),
                    detail: Some(format!(
                        "{matched} matched, {tied} tied, {unmatched_count} unmatched"
                    )),
                })
            },
            Self::ExportSpreadsheet {
                dataset,
                filter,
                path,
                geometry,
            } => {
                let table = apply_optional(filter.as_ref(), catalog.read(dataset).await?).await?;
                Ok(StepOutcome::rows(export_spreadsheet(&table, path, *geometry)?))
            },
            Self::ExportPackage(spec) => {
                let path = export_package(catalog, spec, ctx.started_at.date_naive()).await?;
                Ok(StepOutcome::detail(format!("wrote {}", path.display())))
            },
            Self::ImportTable {
                path,
                destination,
                options,
            } => Ok(StepOutcome::rows(
                import_table(catalog, path, destination, options).await?,
            )),
            Self::RebuildLocator(definition) => {
                let locator =
                    rebuild(definition, catalog, &ctx.locators, &ctx.normalizer).await?;
                Ok(StepOutcome::detail(format!(
                    "{} reference addresses",
                    locator.len()
                )))
            },
            Self::PublishLocator {
                locator,
                service,
                host,
            } => {
                let locator = ctx.locators.load(locator)?;
                publish(&locator, service, host.as_ref()).await?;
                Ok(StepOutcome::detail(format!("published to {}", host.name())))
            },
            Self::Delete { dataset } => {
                catalog
                    .workspace(&dataset.workspace)?
                    .delete(&dataset.name)
                    .await?;
                Ok(StepOutcome::default())
            },
            Self::Wait { duration } => {
                tokio::time::sleep(*duration).await;
                Ok(StepOutcome::default())
            },
        }
    }
}

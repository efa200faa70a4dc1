//! Spreadsheet exports, partner packages and table imports.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geosync_core_common::{DatasetRef, Table, Workspace};
use geosync_csv::{CsvReaderOptions, CsvWriterOptions, GeometryColumns, read_csv_file, write_csv_file};
use geosync_geojson::GeoJsonWorkspace;
use log::info;

use crate::context::Catalog;
use crate::error::{IoResultExt, Result};

/// Writes `table` as a CSV spreadsheet, replacing any previous export.
///
/// # Errors
///
/// Returns [`SyncError::Workspace`](crate::SyncError::Workspace) wrapping
/// the file or serialization error.
pub fn export_spreadsheet(table: &Table, path: &Path, geometry: GeometryColumns) -> Result<u64> {
    let options = CsvWriterOptions::default().with_geometry(geometry);
    write_csv_file(path, table, &options)?;
    info!("Exported {} rows to {}", table.len(), path.display());
    Ok(table.len() as u64)
}

/// Name of a dated package directory: `<prefix>_<MM-DD-YYYY>`.
#[must_use]
pub fn dated_name(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}_{}", date.format("%m-%d-%Y"))
}

/// A set of datasets bundled into a dated directory for an outside partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageExport {
    pub datasets: Vec<DatasetRef>,
    /// Directory that receives the package
    pub target_dir: PathBuf,
    /// Working name used while the package is assembled
    pub placeholder: String,
    /// Final name prefix; the run date is appended
    pub prefix: String,
}

/// Assembles the package under its placeholder name, then renames it to
/// the dated name. An existing package for the same date is replaced.
///
/// # Errors
///
/// Returns read errors for the source datasets and filesystem errors for
/// the package directory.
pub async fn export_package(catalog: &Catalog, spec: &PackageExport, date: NaiveDate) -> Result<PathBuf> {
    let placeholder = spec.target_dir.join(&spec.placeholder);
    if placeholder.exists() {
        fs::remove_dir_all(&placeholder).with_path(&placeholder)?;
    }

    let package = GeoJsonWorkspace::create_dir(&spec.placeholder, &placeholder)?;
    for dataset in &spec.datasets {
        let table = catalog.read(dataset).await?;
        let rows = package.store(&dataset.name, table).await?;
        info!("Packaged {dataset} ({rows} rows)");
    }

    let target = spec.target_dir.join(dated_name(&spec.prefix, date));
    if target.exists() {
        fs::remove_dir_all(&target).with_path(&target)?;
    }
    fs::rename(&placeholder, &target).with_path(&target)?;
    Ok(target)
}

/// Loads a CSV table extract into a dataset, replacing its content.
///
/// # Errors
///
/// Returns file, parse and workspace write errors.
pub async fn import_table(
    catalog: &Catalog,
    path: &Path,
    destination: &DatasetRef,
    options: &CsvReaderOptions,
) -> Result<u64> {
    let table = read_csv_file(path, options)?;
    let rows = catalog.store(destination, table).await?;
    info!("Imported {} into {destination} ({rows} rows)", path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosync_core_common::{DatasetSchema, Feature, FieldDef, MemoryWorkspace};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn catalog() -> Catalog {
        let ws = MemoryWorkspace::new("web");
        let schema = DatasetSchema::table(vec![FieldDef::text("PERMIT_NO", 10)]).unwrap();
        let table = Table::from_features(
            schema,
            vec![
                Feature::new().with("PERMIT_NO", "P-1"),
                Feature::new().with("PERMIT_NO", "P-2"),
            ],
        )
        .unwrap();
        ws.insert("Permits", table).unwrap();
        let mut catalog = Catalog::new();
        catalog.register(Arc::new(ws));
        catalog
    }

    #[test]
    fn test_dated_name() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        assert_eq!(dated_name("CrawfordCounty", date), "CrawfordCounty_07-04-2024");
    }

    #[tokio::test]
    async fn test_package_is_renamed_and_replaced() {
        let dir = TempDir::new().unwrap();
        let spec = PackageExport {
            datasets: vec![DatasetRef::new("web", "Permits")],
            target_dir: dir.path().to_path_buf(),
            placeholder: "package_tmp".to_string(),
            prefix: "Permits".to_string(),
        };
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();

        let first = export_package(&catalog(), &spec, date).await.unwrap();
        std::fs::write(first.join("stale.txt"), b"old").unwrap();
        let second = export_package(&catalog(), &spec, date).await.unwrap();

        assert_eq!(second, dir.path().join("Permits_07-04-2024"));
        assert!(second.join("Permits.geojson").is_file());
        assert!(!second.join("stale.txt").exists());
        assert!(!dir.path().join("package_tmp").exists());
    }

    #[tokio::test]
    async fn test_import_then_export() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("land.csv");
        std::fs::write(&csv, "PID,LINE_ID\n0101,1\n0102,2\n").unwrap();

        let catalog = catalog();
        let destination = DatasetRef::new("web", "Land");
        let rows = import_table(&catalog, &csv, &destination, &CsvReaderOptions::default())
            .await
            .unwrap();
        assert_eq!(rows, 2);

        let table = catalog.read(&destination).await.unwrap();
        let out = dir.path().join("review").join("land.csv");
        export_spreadsheet(&table, &out, GeometryColumns::Omit).unwrap();
        let content = std::fs::read_to_string(out).unwrap();
        assert!(content.contains("0101,1"));
    }
}

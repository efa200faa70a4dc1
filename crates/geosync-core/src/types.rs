//! Summary types for dataset inspection.

use geosync_core_common::{Workspace, find_driver};

use crate::error::Result;

/// Information about a dataset.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    /// Dataset name
    pub dataset: String,
    /// Workspace name
    pub workspace: String,
    /// Driver name
    pub driver: String,
    /// Driver long name
    pub driver_long_name: String,
    /// Geometry type (`none` for tables)
    pub geometry_type: String,
    /// Number of rows
    pub row_count: usize,
    /// Schema fields
    pub fields: Vec<FieldInfo>,
}

/// Information about a field.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Data type
    pub data_type: String,
    /// Maximum text length, if limited
    pub length: Option<usize>,
}

/// Reads a dataset and summarizes its schema.
///
/// # Errors
///
/// Returns the workspace read error.
pub async fn describe_dataset(workspace: &dyn Workspace, dataset: &str) -> Result<DatasetInfo> {
    let table = workspace.read(dataset).await?;
    let driver = workspace.driver();
    Ok(DatasetInfo {
        dataset: dataset.to_string(),
        workspace: workspace.name().to_string(),
        driver: driver.to_string(),
        driver_long_name: find_driver(driver)
            .map_or_else(|| driver.to_string(), |d| d.long_name.to_string()),
        geometry_type: table.schema.geometry_type.to_string(),
        row_count: table.len(),
        fields: table
            .schema
            .fields
            .iter()
            .map(|f| FieldInfo {
                name: f.name.clone(),
                data_type: f.field_type.to_string(),
                length: f.length,
            })
            .collect(),
    })
}

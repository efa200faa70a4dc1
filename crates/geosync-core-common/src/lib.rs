//! Common types and traits shared across `geosync` crates.
//!
//! This crate provides the dataset model and the [`Workspace`] provider trait
//! that `geosync-core` and the format crates both build on, preventing
//! circular dependencies between them.

pub mod arrow;
pub mod dataset;
pub mod drivers;
pub mod memory;
pub mod workspace;

// Re-export commonly used types
pub use dataset::{
    DatasetRef, DatasetSchema, Feature, FieldDef, FieldType, GeometryType, ParseDatasetRefError,
    Table, Value,
};
pub use drivers::{DriverCapabilities, StorageDriver, SupportStatus, find_driver, storage_drivers};
pub use memory::MemoryWorkspace;
pub use workspace::{Workspace, WorkspaceError, WorkspaceResult};

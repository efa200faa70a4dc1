//! Workspace provider trait.
//!
//! A workspace is a named container of datasets (a geodatabase connection in
//! the original deployment). Every pipeline step talks to storage only
//! through this trait, so steps never know whether they run against GeoJSON
//! directories, in-memory scratch space, or anything else.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::dataset::{DatasetSchema, Feature, Table};

/// Errors raised by workspace providers.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The workspace itself cannot be reached (missing share, VPN down).
    #[error("Workspace '{workspace}' is unavailable: {reason}")]
    Unavailable {
        /// Workspace name or path
        workspace: String,
        /// Why it could not be reached
        reason: String,
    },

    /// Another session holds a lock on the dataset.
    #[error("Dataset '{dataset}' is locked by another session")]
    Locked {
        /// The locked dataset
        dataset: String,
        /// Lock file marking the other session, when the provider uses one
        lock_file: Option<PathBuf>,
    },

    /// The dataset does not exist.
    #[error("Dataset '{dataset}' not found")]
    NotFound {
        /// The missing dataset
        dataset: String,
    },

    /// The dataset exists and overwriting was not requested.
    #[error("Dataset '{dataset}' already exists")]
    AlreadyExists {
        /// The existing dataset
        dataset: String,
    },

    /// A field or value does not fit the dataset schema.
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the mismatch
        message: String,
    },

    /// A geometry is invalid or of the wrong type.
    #[error("Invalid geometry: {message}")]
    Geometry {
        /// Description of the geometry problem
        message: String,
    },

    /// Filesystem failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The path being accessed
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored content could not be parsed or serialized.
    #[error("Malformed {format} content in '{context}': {message}")]
    Format {
        /// The format (e.g. "GeoJSON", "CSV")
        format: String,
        /// File or dataset being processed
        context: String,
        /// Description of the problem
        message: String,
    },
}

/// Type alias for Results using [`WorkspaceError`].
pub type WorkspaceResult<T> = std::result::Result<T, WorkspaceError>;

impl WorkspaceError {
    /// Shorthand for [`WorkspaceError::SchemaMismatch`].
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Shorthand for [`WorkspaceError::Io`].
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`WorkspaceError::Locked`] without a lock file.
    #[must_use]
    pub fn locked(dataset: impl Into<String>) -> Self {
        Self::Locked {
            dataset: dataset.into(),
            lock_file: None,
        }
    }

    /// Shorthand for [`WorkspaceError::NotFound`].
    #[must_use]
    pub fn not_found(dataset: impl Into<String>) -> Self {
        Self::NotFound {
            dataset: dataset.into(),
        }
    }
}

/// Storage provider for datasets.
///
/// Writers assume exclusive access to their destination for the duration of
/// a call; providers that can detect a competing session report
/// [`WorkspaceError::Locked`] instead of writing.
#[async_trait]
pub trait Workspace: Send + Sync + std::fmt::Debug {
    /// Workspace name as used in dataset references.
    fn name(&self) -> &str;

    /// Short name of the storage driver backing this workspace.
    fn driver(&self) -> &'static str;

    /// Names of all datasets in the workspace, sorted.
    async fn list(&self) -> WorkspaceResult<Vec<String>>;

    async fn exists(&self, dataset: &str) -> WorkspaceResult<bool>;

    /// Returns the schema of an existing dataset.
    async fn describe(&self, dataset: &str) -> WorkspaceResult<DatasetSchema>;

    /// Reads a complete dataset.
    async fn read(&self, dataset: &str) -> WorkspaceResult<Table>;

    /// Creates an empty dataset, replacing an existing one when `overwrite`.
    async fn create(
        &self,
        dataset: &str,
        schema: &DatasetSchema,
        overwrite: bool,
    ) -> WorkspaceResult<()>;

    /// Deletes all rows, keeping the schema.
    async fn truncate(&self, dataset: &str) -> WorkspaceResult<()>;

    /// Appends rows and returns the dataset's new row count.
    async fn append(&self, dataset: &str, features: Vec<Feature>) -> WorkspaceResult<u64>;

    /// Replaces all rows in one step and returns the new row count.
    ///
    /// The new rows are staged completely before they become visible; a
    /// failure leaves the previous rows in place.
    async fn replace(&self, dataset: &str, features: Vec<Feature>) -> WorkspaceResult<u64>;

    /// Removes the dataset.
    async fn delete(&self, dataset: &str) -> WorkspaceResult<()>;

    async fn count(&self, dataset: &str) -> WorkspaceResult<u64> {
        Ok(self.read(dataset).await?.len() as u64)
    }

    /// Creates (or overwrites) a dataset holding `table`.
    ///
    /// The default creates an empty dataset and then fills it; providers
    /// that can swap schema and rows at once override it.
    async fn store(&self, dataset: &str, table: Table) -> WorkspaceResult<u64> {
        self.create(dataset, &table.schema, true).await?;
        self.replace(dataset, table.features).await
    }
}

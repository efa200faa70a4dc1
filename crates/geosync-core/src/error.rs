//! Error types for pipeline operations.
//!
//! Every failure a step can hit is a [`SyncError`]. The runner does not
//! distinguish between kinds when deciding whether to abort, but it logs the
//! [`ErrorKind`] and a recovery hint so operators know where to look.

use std::path::PathBuf;

use geosync_core_common::{ParseDatasetRefError, WorkspaceError};
use thiserror::Error;

/// Main error type for `geosync` operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Workspace provider failures (connectivity, locks, schema, geometry)
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// Lookup table construction and resolution errors
    #[error(transparent)]
    Translate(#[from] TranslateError),

    /// Pipeline configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Derivation operation errors
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    /// Geocoding and locator errors
    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    /// Service packaging and upload errors
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Attribute filter could not be planned or executed
    #[error("Attribute filter '{expression}' failed: {message}")]
    Filter {
        /// The filter expression
        expression: String,
        /// Description of the failure
        message: String,
    },

    /// Filesystem failure outside a workspace (run log, exports, locators)
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The path being accessed
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Lookup table errors.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// The same code appears twice in one table
    #[error("Lookup table '{table}' defines code '{code}' more than once")]
    DuplicateCode {
        /// The table name
        table: String,
        /// The repeated code
        code: String,
    },

    /// Parallel code and label lists differ in length
    #[error("Lookup table '{table}' has {codes} codes but {labels} labels")]
    LengthMismatch {
        /// The table name
        table: String,
        /// Number of codes
        codes: usize,
        /// Number of labels
        labels: usize,
    },

    /// No table with the requested name is registered
    #[error("Lookup table '{name}' not found. Available tables: {available}")]
    UnknownTable {
        /// The requested table
        name: String,
        /// Comma-separated list of registered tables
        available: String,
    },
}

/// Pipeline configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be parsed
    #[error("Failed to parse pipeline '{path}': {message}")]
    Parse {
        /// The configuration file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },

    /// Required option is missing
    #[error("Missing required option: {option}")]
    MissingRequired {
        /// The missing option name
        option: String,
    },

    /// A step references a workspace that is not configured
    #[error("Workspace '{name}' is not configured")]
    UnknownWorkspace {
        /// The workspace name
        name: String,
    },

    /// A dataset reference is malformed
    #[error(transparent)]
    DatasetRef(#[from] ParseDatasetRefError),
}

/// Derivation errors.
#[derive(Debug, Error)]
pub enum DerivationError {
    /// A field named by the operation is absent from its input
    #[error("Field '{field}' not found in {dataset}")]
    MissingField {
        /// The dataset or input description
        dataset: String,
        /// The missing field
        field: String,
    },

    /// The operation needs a different geometry type
    #[error("{operation} requires {expected} geometry, found {found}")]
    GeometryType {
        /// The operation name
        operation: String,
        /// Required geometry type
        expected: String,
        /// Actual geometry type
        found: String,
    },

    /// Geometry processing failed
    #[error("{operation} failed: {message}")]
    Geometry {
        /// The operation name
        operation: String,
        /// Description of the problem
        message: String,
    },

    /// An output field would shadow an input field
    #[error("Output field '{field}' already exists in the input")]
    FieldCollision {
        /// The conflicting field
        field: String,
    },
}

/// Geocoding errors.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// No locator with the requested name is defined
    #[error("Locator '{name}' is not defined")]
    UnknownLocator {
        /// The locator name
        name: String,
    },

    /// The locator has not been built yet
    #[error("Locator '{name}' has not been built at '{path}'")]
    NotBuilt {
        /// The locator name
        name: String,
        /// Expected locator file
        path: PathBuf,
    },

    /// The locator file could not be read or written
    #[error("Locator file '{path}' is invalid: {message}")]
    Corrupt {
        /// The locator file
        path: PathBuf,
        /// Parser message
        message: String,
    },
}

/// Service publishing errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Building the service definition package failed
    #[error("Failed to package locator '{locator}': {message}")]
    Packaging {
        /// The locator being packaged
        locator: String,
        /// Description of the failure
        message: String,
    },

    /// The service host rejected or failed the upload
    #[error("Upload of service '{service}' to {host} failed: {message}")]
    Upload {
        /// The target service name
        service: String,
        /// The host
        host: String,
        /// Description of the failure
        message: String,
    },
}

/// Broad failure classes reported in the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    ResourceLock,
    SchemaMismatch,
    Geometry,
    Filesystem,
    Configuration,
    Publishing,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::ResourceLock => "resource lock",
            ErrorKind::SchemaMismatch => "schema mismatch",
            ErrorKind::Geometry => "geometry",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Publishing => "publishing",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type alias for Results using `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Wraps a filesystem error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classifies the error for the run log.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Workspace(e) => match e {
                WorkspaceError::Unavailable { .. } => ErrorKind::Connectivity,
                WorkspaceError::Locked { .. } => ErrorKind::ResourceLock,
                WorkspaceError::Geometry { .. } => ErrorKind::Geometry,
                WorkspaceError::Io { .. } => ErrorKind::Filesystem,
                WorkspaceError::NotFound { .. }
                | WorkspaceError::AlreadyExists { .. }
                | WorkspaceError::SchemaMismatch { .. }
                | WorkspaceError::Format { .. } => ErrorKind::SchemaMismatch,
            },
            Self::Translate(_) | Self::Config(_) => ErrorKind::Configuration,
            Self::Derivation(DerivationError::Geometry { .. } | DerivationError::GeometryType { .. }) => {
                ErrorKind::Geometry
            },
            Self::Derivation(_) | Self::Filter { .. } => ErrorKind::SchemaMismatch,
            Self::Geocode(GeocodeError::UnknownLocator { .. }) => ErrorKind::Configuration,
            Self::Geocode(_) | Self::Io { .. } => ErrorKind::Filesystem,
            Self::Publish(_) => ErrorKind::Publishing,
        }
    }

    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Workspace(WorkspaceError::Unavailable { workspace, reason }) => {
                format!("Cannot reach workspace '{workspace}': {reason}")
            },
            Self::Workspace(WorkspaceError::Locked { dataset, .. }) => {
                format!("'{dataset}' is locked by another user or service.")
            },
            Self::Translate(e) => format!("Lookup table error: {e}"),
            Self::Config(e) => format!("Configuration error: {e}"),
            Self::Io { path, .. } => format!("Cannot access '{}'", path.display()),
            _ => self.to_string(),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self.kind() {
            ErrorKind::Connectivity => Some(
                "Check the network share or database connection and rerun the pipeline.".to_string(),
            ),
            ErrorKind::ResourceLock => match self {
                Self::Workspace(WorkspaceError::Locked {
                    lock_file: Some(lock_file),
                    ..
                }) => Some(format!(
                    "Close sessions writing the dataset, then rerun. If no other run is active, \
                     delete the stale lock file '{}'.",
                    lock_file.display()
                )),
                _ => Some(
                    "Close desktop sessions or stop services holding the dataset, then rerun."
                        .to_string(),
                ),
            },
            ErrorKind::SchemaMismatch => match self {
                Self::Workspace(WorkspaceError::NotFound { .. }) => {
                    Some("Check the dataset name in the pipeline configuration.".to_string())
                },
                _ => Some(
                    "Compare the source and destination schemas and update the field mapping."
                        .to_string(),
                ),
            },
            ErrorKind::Geometry => {
                Some("Repair the offending geometries in the source dataset.".to_string())
            },
            ErrorKind::Filesystem => match self {
                Self::Geocode(GeocodeError::NotBuilt { .. }) => {
                    Some("Run the locator rebuild stage before geocoding.".to_string())
                },
                _ => Some("Check that the path exists and is writable.".to_string()),
            },
            ErrorKind::Configuration => match self {
                Self::Translate(TranslateError::UnknownTable { .. }) => {
                    Some("Run 'geosync tables' to see the available lookup tables.".to_string())
                },
                _ => Some("Run 'geosync validate' on the pipeline file.".to_string()),
            },
            ErrorKind::Publishing => None,
        }
    }
}

/// Extension trait for attaching a path to `std::io` results.
pub trait IoResultExt<T> {
    /// Maps the error into [`SyncError::Io`] for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the underlying operation fails.
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| SyncError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_errors_are_classified() {
        let unavailable = SyncError::from(WorkspaceError::Unavailable {
            workspace: "county".to_string(),
            reason: "share offline".to_string(),
        });
        assert_eq!(unavailable.kind(), ErrorKind::Connectivity);
        assert!(unavailable.user_message().contains("county"));

        let locked = SyncError::from(WorkspaceError::locked("Parcels"));
        assert_eq!(locked.kind(), ErrorKind::ResourceLock);
        assert!(locked.recovery_suggestion().unwrap().contains("Close"));

        let stale = SyncError::from(WorkspaceError::Locked {
            dataset: "Parcels".to_string(),
            lock_file: Some(PathBuf::from("web/Parcels.geojson.lock")),
        });
        assert!(
            stale
                .recovery_suggestion()
                .unwrap()
                .contains("web/Parcels.geojson.lock")
        );

        let mismatch = SyncError::from(WorkspaceError::schema("bad value"));
        assert_eq!(mismatch.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_translate_error_display() {
        let err = SyncError::from(TranslateError::LengthMismatch {
            table: "wards".to_string(),
            codes: 3,
            labels: 2,
        });
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.to_string(),
            "Lookup table 'wards' has 3 codes but 2 labels"
        );
    }

    #[test]
    fn test_io_with_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.with_path("/logs/run.log").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert!(err.to_string().contains("/logs/run.log"));
    }
}

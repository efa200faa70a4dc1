//! Directory-backed workspace storing one `GeoJSON` file per dataset.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use geosync_core_common::{
    DatasetSchema, Feature, Table, Workspace, WorkspaceError, WorkspaceResult,
};
use log::debug;

use crate::DATASET_EXTENSION;
use crate::parser::parse_geojson_bytes;
use crate::writer::{GeoJsonWriterOptions, write_geojson};

/// Workspace rooted at a directory of `<dataset>.geojson` files.
///
/// Writers hold a `<dataset>.geojson.lock` file for the duration of the call,
/// so two processes pointed at the same directory cannot interleave writes.
/// Content replacement goes through a `.tmp` sibling and a rename.
#[derive(Debug, Clone)]
pub struct GeoJsonWorkspace {
    name: String,
    root: PathBuf,
    options: GeoJsonWriterOptions,
}

/// Removes the lock file when dropped.
struct DatasetLock {
    path: PathBuf,
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("could not remove lock {}: {e}", self.path.display());
        }
    }
}

impl GeoJsonWorkspace {
    /// Opens a workspace on an existing directory.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Unavailable`] when `root` is not a directory.
    pub fn open(name: impl Into<String>, root: impl Into<PathBuf>) -> WorkspaceResult<Self> {
        let workspace = Self {
            name: name.into(),
            root: root.into(),
            options: GeoJsonWriterOptions::default(),
        };
        workspace.ensure_available()?;
        Ok(workspace)
    }

    /// Creates the directory if needed and opens a workspace on it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] when the directory cannot be created.
    pub fn create_dir(name: impl Into<String>, root: impl Into<PathBuf>) -> WorkspaceResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| WorkspaceError::io(&root, e))?;
        Self::open(name, root)
    }

    #[must_use]
    pub fn with_options(mut self, options: GeoJsonWriterOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `dataset`.
    #[must_use]
    pub fn dataset_path(&self, dataset: &str) -> PathBuf {
        self.root.join(format!("{dataset}.{DATASET_EXTENSION}"))
    }

    fn ensure_available(&self) -> WorkspaceResult<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(WorkspaceError::Unavailable {
                workspace: self.name.clone(),
                reason: format!("directory '{}' is not reachable", self.root.display()),
            })
        }
    }

    fn checked_path(&self, dataset: &str) -> WorkspaceResult<PathBuf> {
        self.ensure_available()?;
        if dataset.is_empty()
            || dataset.contains(['/', '\\'])
            || dataset == "."
            || dataset == ".."
        {
            return Err(WorkspaceError::schema(format!(
                "'{dataset}' is not a valid dataset name"
            )));
        }
        Ok(self.dataset_path(dataset))
    }

    fn lock(&self, dataset: &str, path: &Path) -> WorkspaceResult<DatasetLock> {
        let lock_path = path.with_extension(format!("{DATASET_EXTENSION}.lock"));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => Ok(DatasetLock { path: lock_path }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(WorkspaceError::Locked {
                dataset: dataset.to_string(),
                lock_file: Some(lock_path),
            }),
            Err(e) => Err(WorkspaceError::io(lock_path, e)),
        }
    }

    fn read_path(&self, dataset: &str, path: &Path) -> WorkspaceResult<Table> {
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WorkspaceError::not_found(dataset),
            _ => WorkspaceError::io(path, e),
        })?;
        parse_geojson_bytes(&bytes, &path.display().to_string())
    }

    /// Writes the table next to `path` and renames it into place.
    fn write_path(&self, path: &Path, table: &Table) -> WorkspaceResult<()> {
        let staging = path.with_extension(format!("{DATASET_EXTENSION}.tmp"));
        let file = fs::File::create(&staging).map_err(|e| WorkspaceError::io(&staging, e))?;
        let mut writer = BufWriter::new(file);
        let written = write_geojson(&mut writer, table, &self.options).and_then(|()| {
            writer
                .flush()
                .map_err(|e| WorkspaceError::io(&staging, e))
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        drop(writer);
        fs::rename(&staging, path).map_err(|e| WorkspaceError::io(path, e))
    }
}

fn conform_all(schema: &DatasetSchema, features: Vec<Feature>) -> WorkspaceResult<Vec<Feature>> {
    features
        .into_iter()
        .map(|feature| schema.conform(feature))
        .collect()
}

#[async_trait]
impl Workspace for GeoJsonWorkspace {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver(&self) -> &'static str {
        "GeoJSON"
    }

    async fn list(&self) -> WorkspaceResult<Vec<String>> {
        self.ensure_available()?;
        let entries = fs::read_dir(&self.root).map_err(|e| WorkspaceError::io(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| WorkspaceError::io(&self.root, e))?.path();
            if path.extension().is_some_and(|ext| ext == DATASET_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn exists(&self, dataset: &str) -> WorkspaceResult<bool> {
        Ok(self.checked_path(dataset)?.is_file())
    }

    async fn describe(&self, dataset: &str) -> WorkspaceResult<DatasetSchema> {
        let path = self.checked_path(dataset)?;
        Ok(self.read_path(dataset, &path)?.schema)
    }

    async fn read(&self, dataset: &str) -> WorkspaceResult<Table> {
        let path = self.checked_path(dataset)?;
        self.read_path(dataset, &path)
    }

    async fn create(
        &self,
        dataset: &str,
        schema: &DatasetSchema,
        overwrite: bool,
    ) -> WorkspaceResult<()> {
        let path = self.checked_path(dataset)?;
        let _lock = self.lock(dataset, &path)?;
        if path.exists() && !overwrite {
            return Err(WorkspaceError::AlreadyExists {
                dataset: dataset.to_string(),
            });
        }
        self.write_path(&path, &Table::new(schema.clone()))
    }

    async fn truncate(&self, dataset: &str) -> WorkspaceResult<()> {
        let path = self.checked_path(dataset)?;
        let _lock = self.lock(dataset, &path)?;
        let table = self.read_path(dataset, &path)?;
        self.write_path(&path, &Table::new(table.schema))
    }

    async fn append(&self, dataset: &str, features: Vec<Feature>) -> WorkspaceResult<u64> {
        let path = self.checked_path(dataset)?;
        let _lock = self.lock(dataset, &path)?;
        let mut table = self.read_path(dataset, &path)?;
        let features = conform_all(&table.schema, features)?;
        table.features.extend(features);
        self.write_path(&path, &table)?;
        Ok(table.len() as u64)
    }

    async fn replace(&self, dataset: &str, features: Vec<Feature>) -> WorkspaceResult<u64> {
        let path = self.checked_path(dataset)?;
        let _lock = self.lock(dataset, &path)?;
        let schema = self.read_path(dataset, &path)?.schema;
        let table = Table {
            features: conform_all(&schema, features)?,
            schema,
        };
        self.write_path(&path, &table)?;
        Ok(table.len() as u64)
    }

    /// Writes schema and rows in one locked swap; the previous file stays
    /// until the new one is complete.
    async fn store(&self, dataset: &str, table: Table) -> WorkspaceResult<u64> {
        let path = self.checked_path(dataset)?;
        let _lock = self.lock(dataset, &path)?;
        let table = Table {
            features: conform_all(&table.schema, table.features)?,
            schema: table.schema,
        };
        self.write_path(&path, &table)?;
        Ok(table.len() as u64)
    }

    async fn delete(&self, dataset: &str) -> WorkspaceResult<()> {
        let path = self.checked_path(dataset)?;
        let _lock = self.lock(dataset, &path)?;
        fs::remove_file(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WorkspaceError::not_found(dataset),
            _ => WorkspaceError::io(&path, e),
        })
    }
}

//! Shared state handed to every step of a run.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use geosync_core_common::{DatasetRef, MemoryWorkspace, Table, Workspace};

use crate::error::{ConfigError, Result};
use crate::geocode::AddressNormalizer;
use crate::locator::LocatorStore;
use crate::runlog::RunLog;
use crate::translate::LookupTables;

/// Name of the per-run scratch workspace.
pub const SCRATCH_WORKSPACE: &str = "scratch";

/// Named workspaces a pipeline can read from and write to.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    workspaces: BTreeMap<String, Arc<dyn Workspace>>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a workspace under its own name.
    pub fn register(&mut self, workspace: Arc<dyn Workspace>) {
        self.workspaces
            .insert(workspace.name().to_string(), workspace);
    }

    /// Returns the workspace named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownWorkspace`] when it is not registered.
    pub fn workspace(&self, name: &str) -> Result<Arc<dyn Workspace>> {
        self.workspaces.get(name).cloned().ok_or_else(|| {
            ConfigError::UnknownWorkspace {
                name: name.to_string(),
            }
            .into()
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.workspaces.contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.workspaces.keys().map(String::as_str).collect()
    }

    /// Reads a whole dataset.
    ///
    /// # Errors
    ///
    /// Returns the workspace resolution or read error.
    pub async fn read(&self, dataset: &DatasetRef) -> Result<Table> {
        Ok(self.workspace(&dataset.workspace)?.read(&dataset.name).await?)
    }

    /// Creates or overwrites a dataset with the table's schema and rows.
    ///
    /// # Errors
    ///
    /// Returns the workspace resolution or write error.
    pub async fn store(&self, dataset: &DatasetRef, table: Table) -> Result<u64> {
        Ok(self
            .workspace(&dataset.workspace)?
            .store(&dataset.name, table)
            .await?)
    }
}

/// Everything a step can reach during a run.
#[derive(Debug)]
pub struct RunContext {
    pub pipeline: String,
    pub started_at: DateTime<Local>,
    pub log: RunLog,
    pub catalog: Catalog,
    pub tables: LookupTables,
    pub locators: LocatorStore,
    pub normalizer: AddressNormalizer,
    scratch: Arc<MemoryWorkspace>,
}

impl RunContext {
    /// Builds a context and registers a fresh scratch workspace in `catalog`.
    #[must_use]
    pub fn new(
        pipeline: impl Into<String>,
        log: RunLog,
        mut catalog: Catalog,
        tables: LookupTables,
        locators: LocatorStore,
        normalizer: AddressNormalizer,
    ) -> Self {
        let scratch = Arc::new(MemoryWorkspace::new(SCRATCH_WORKSPACE));
        catalog.register(scratch.clone());
        Self {
            pipeline: pipeline.into(),
            started_at: Local::now(),
            log,
            catalog,
            tables,
            locators,
            normalizer,
            scratch,
        }
    }

    /// The per-run scratch workspace.
    #[must_use]
    pub fn scratch(&self) -> &MemoryWorkspace {
        &self.scratch
    }

    /// Drops every intermediate dataset, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns the scratch workspace error if its state is poisoned.
    pub fn clear_scratch(&self) -> Result<usize> {
        Ok(self.scratch.clear()?)
    }
}

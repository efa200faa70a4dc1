//! In-memory workspace.
//!
//! Backs the per-run scratch workspace and is handy for fixtures. Locks can
//! be taken on behalf of a simulated foreign session to exercise
//! lock-failure paths.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::dataset::{DatasetSchema, Feature, Table};
use crate::workspace::{Workspace, WorkspaceError, WorkspaceResult};

#[derive(Debug, Default)]
struct State {
    datasets: BTreeMap<String, Table>,
    locks: BTreeSet<String>,
}

/// Workspace holding every dataset in process memory.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    name: String,
    state: Mutex<State>,
}

impl MemoryWorkspace {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> WorkspaceResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| WorkspaceError::Unavailable {
            workspace: self.name.clone(),
            reason: "workspace state is poisoned".to_string(),
        })
    }

    /// Inserts or replaces a dataset without conforming it.
    ///
    /// # Errors
    ///
    /// Fails only when the workspace state is poisoned.
    pub fn insert(&self, dataset: impl Into<String>, table: Table) -> WorkspaceResult<()> {
        self.state()?.datasets.insert(dataset.into(), table);
        Ok(())
    }

    /// Marks a dataset as locked by another session.
    ///
    /// # Errors
    ///
    /// Fails only when the workspace state is poisoned.
    pub fn lock_dataset(&self, dataset: impl Into<String>) -> WorkspaceResult<()> {
        self.state()?.locks.insert(dataset.into());
        Ok(())
    }

    /// Releases a lock taken with [`MemoryWorkspace::lock_dataset`].
    ///
    /// # Errors
    ///
    /// Fails only when the workspace state is poisoned.
    pub fn unlock_dataset(&self, dataset: &str) -> WorkspaceResult<()> {
        self.state()?.locks.remove(dataset);
        Ok(())
    }

    /// Drops every dataset and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Fails only when the workspace state is poisoned.
    pub fn clear(&self) -> WorkspaceResult<usize> {
        let mut state = self.state()?;
        let removed = state.datasets.len();
        state.datasets.clear();
        Ok(removed)
    }
}

fn writable<'a>(state: &'a mut State, dataset: &str) -> WorkspaceResult<&'a mut Table> {
    if state.locks.contains(dataset) {
        return Err(WorkspaceError::locked(dataset));
    }
    state
        .datasets
        .get_mut(dataset)
        .ok_or_else(|| WorkspaceError::not_found(dataset))
}

fn conform_all(schema: &DatasetSchema, features: Vec<Feature>) -> WorkspaceResult<Vec<Feature>> {
    features
        .into_iter()
        .map(|feature| schema.conform(feature))
        .collect()
}

#[async_trait]
impl Workspace for MemoryWorkspace {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver(&self) -> &'static str {
        "Memory"
    }

    async fn list(&self) -> WorkspaceResult<Vec<String>> {
        Ok(self.state()?.datasets.keys().cloned().collect())
    }

    async fn exists(&self, dataset: &str) -> WorkspaceResult<bool> {
        Ok(self.state()?.datasets.contains_key(dataset))
    }

    async fn describe(&self, dataset: &str) -> WorkspaceResult<DatasetSchema> {
        self.state()?
            .datasets
            .get(dataset)
            .map(|table| table.schema.clone())
            .ok_or_else(|| WorkspaceError::not_found(dataset))
    }

    async fn read(&self, dataset: &str) -> WorkspaceResult<Table> {
        self.state()?
            .datasets
            .get(dataset)
            .cloned()
            .ok_or_else(|| WorkspaceError::not_found(dataset))
    }

    async fn create(
        &self,
        dataset: &str,
        schema: &DatasetSchema,
        overwrite: bool,
    ) -> WorkspaceResult<()> {
        let mut state = self.state()?;
        if state.locks.contains(dataset) {
            return Err(WorkspaceError::locked(dataset));
        }
        if state.datasets.contains_key(dataset) && !overwrite {
            return Err(WorkspaceError::AlreadyExists {
                dataset: dataset.to_string(),
            });
        }
        state
            .datasets
            .insert(dataset.to_string(), Table::new(schema.clone()));
        Ok(())
    }

    async fn truncate(&self, dataset: &str) -> WorkspaceResult<()> {
        let mut state = self.state()?;
        writable(&mut state, dataset)?.features.clear();
        Ok(())
    }

    async fn append(&self, dataset: &str, features: Vec<Feature>) -> WorkspaceResult<u64> {
        let mut state = self.state()?;
        let table = writable(&mut state, dataset)?;
        let features = conform_all(&table.schema, features)?;
        table.features.extend(features);
        Ok(table.len() as u64)
    }

    async fn replace(&self, dataset: &str, features: Vec<Feature>) -> WorkspaceResult<u64> {
        let mut state = self.state()?;
        let table = writable(&mut state, dataset)?;
        let staged = conform_all(&table.schema, features)?;
        table.features = staged;
        Ok(table.len() as u64)
    }

    async fn store(&self, dataset: &str, table: Table) -> WorkspaceResult<u64> {
        let mut state = self.state()?;
        if state.locks.contains(dataset) {
            return Err(WorkspaceError::locked(dataset));
        }
        let features = conform_all(&table.schema, table.features)?;
        let staged = Table {
            schema: table.schema,
            features,
        };
        let rows = staged.len() as u64;
        state.datasets.insert(dataset.to_string(), staged);
        Ok(rows)
    }

    async fn delete(&self, dataset: &str) -> WorkspaceResult<()> {
        let mut state = self.state()?;
        if state.locks.contains(dataset) {
            return Err(WorkspaceError::locked(dataset));
        }
        state
            .datasets
            .remove(dataset)
            .map(|_| ())
            .ok_or_else(|| WorkspaceError::not_found(dataset))
    }

    async fn count(&self, dataset: &str) -> WorkspaceResult<u64> {
        self.state()?
            .datasets
            .get(dataset)
            .map(|table| table.len() as u64)
            .ok_or_else(|| WorkspaceError::not_found(dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FieldDef, Value};

    fn schema() -> DatasetSchema {
        DatasetSchema::table(vec![FieldDef::integer("ID"), FieldDef::text("NAME", 10)]).unwrap()
    }

    #[tokio::test]
    async fn test_create_append_read() {
        let ws = MemoryWorkspace::new("scratch");
        ws.create("t", &schema(), false).await.unwrap();
        let count = ws
            .append("t", vec![Feature::new().with("id", 1_i64).with("name", "A")])
            .await
            .unwrap();
        assert_eq!(count, 1);

        let table = ws.read("t").await.unwrap();
        assert_eq!(table.features[0].get("ID"), &Value::Int(1));
        assert_eq!(ws.list().await.unwrap(), vec!["t".to_string()]);
    }

    #[tokio::test]
    async fn test_create_without_overwrite_fails() {
        let ws = MemoryWorkspace::new("scratch");
        ws.create("t", &schema(), false).await.unwrap();
        let err = ws.create("t", &schema(), false).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_locked_dataset_rejects_writes() {
        let ws = MemoryWorkspace::new("web");
        ws.create("t", &schema(), false).await.unwrap();
        ws.lock_dataset("t").unwrap();

        assert!(matches!(
            ws.truncate("t").await.unwrap_err(),
            WorkspaceError::Locked { .. }
        ));
        assert!(matches!(
            ws.replace("t", vec![]).await.unwrap_err(),
            WorkspaceError::Locked { .. }
        ));

        ws.unlock_dataset("t").unwrap();
        assert_eq!(ws.replace("t", vec![]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_rows() {
        let ws = MemoryWorkspace::new("web");
        ws.create("t", &schema(), false).await.unwrap();
        ws.append("t", vec![Feature::new().with("ID", 7_i64)])
            .await
            .unwrap();

        let bad = vec![
            Feature::new().with("ID", 1_i64),
            Feature::new().with("ID", "not a number"),
        ];
        assert!(ws.replace("t", bad).await.is_err());
        assert_eq!(ws.count("t").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_store_keeps_previous_dataset() {
        let ws = MemoryWorkspace::new("scratch");
        let table = Table::from_features(schema(), vec![Feature::new().with("ID", 7_i64)]).unwrap();
        assert_eq!(ws.store("t", table).await.unwrap(), 1);

        let mut bad = Table::new(schema());
        bad.features.push(Feature::new().with("ID", "not a number"));
        assert!(ws.store("t", bad).await.is_err());
        assert_eq!(ws.read("t").await.unwrap().features[0].get("ID"), &Value::Int(7));

        ws.lock_dataset("t").unwrap();
        let err = ws.store("t", Table::new(schema())).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Locked { lock_file: None, .. }));
        assert_eq!(ws.count("t").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let ws = MemoryWorkspace::new("scratch");
        ws.create("a", &schema(), false).await.unwrap();
        ws.create("b", &schema(), false).await.unwrap();
        assert_eq!(ws.clear().unwrap(), 2);
        assert!(!ws.exists("a").await.unwrap());
    }
}

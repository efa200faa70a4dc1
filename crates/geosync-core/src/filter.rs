//! SQL attribute filters.
//!
//! A filter is the body of a `WHERE` clause evaluated by DataFusion over the
//! table's attributes. Column names are matched case-insensitively, so
//! `Status = 'U'` and `STATUS = 'U'` select the same rows.

use std::sync::Arc;

use datafusion::arrow::array::{Array, UInt64Array};
use datafusion::datasource::MemTable;
use datafusion::prelude::SessionContext;
use geosync_core_common::Table;
use geosync_core_common::arrow::{BatchOptions, ROW_ID_COLUMN, to_record_batch};
use log::debug;

use crate::error::{Result, SyncError};

const FILTER_TABLE: &str = "features";

/// A `WHERE`-clause expression over attribute fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeFilter {
    expression: String,
}

impl AttributeFilter {
    #[must_use]
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn error(&self, message: impl ToString) -> SyncError {
        SyncError::Filter {
            expression: self.expression.clone(),
            message: message.to_string(),
        }
    }

    /// Indices of the rows that satisfy the filter, in table order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Filter`] when the expression does not parse or
    /// names a field the table does not have.
    pub async fn select(&self, table: &Table) -> Result<Vec<usize>> {
        let batch = to_record_batch(
            table,
            &BatchOptions {
                lowercase_names: true,
                row_ids: true,
            },
        )?;

        let ctx = SessionContext::new();
        let provider =
            MemTable::try_new(batch.schema(), vec![vec![batch]]).map_err(|e| self.error(e))?;
        ctx.register_table(FILTER_TABLE, Arc::new(provider))
            .map_err(|e| self.error(e))?;

        let sql = format!(
            "SELECT \"{ROW_ID_COLUMN}\" FROM {FILTER_TABLE} WHERE {}",
            self.expression
        );
        debug!("Evaluating filter: {sql}");
        let df = ctx.sql(&sql).await.map_err(|e| self.error(e))?;
        let batches = df.collect().await.map_err(|e| self.error(e))?;

        let mut rows = Vec::new();
        for batch in &batches {
            let ids = batch
                .column(0)
                .as_any()
                .downcast_ref::<UInt64Array>()
                .ok_or_else(|| self.error("row id column has an unexpected type"))?;
            rows.extend(ids.values().iter().map(|&id| id as usize));
        }
        rows.sort_unstable();
        Ok(rows)
    }

    /// Returns a table with only the rows that satisfy the filter.
    ///
    /// # Errors
    ///
    /// See [`AttributeFilter::select`].
    pub async fn apply(&self, table: &Table) -> Result<Table> {
        let rows = self.select(table).await?;
        Ok(table.select(&rows))
    }
}

/// Applies an optional filter, returning a copy of the table when absent.
///
/// # Errors
///
/// See [`AttributeFilter::select`].
pub async fn apply_optional(filter: Option<&AttributeFilter>, table: Table) -> Result<Table> {
    match filter {
        Some(filter) => filter.apply(&table).await,
        None => Ok(table),
    }
}

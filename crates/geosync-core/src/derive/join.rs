use std::collections::HashMap;

use geosync_core_common::{Feature, Table};
use log::warn;

use super::{require_field, unique_name};
use crate::error::Result;

/// Attribute join of a secondary table onto a primary table by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub primary_key: String,
    pub secondary_key: String,
    /// Secondary fields to carry; empty carries every non-key field.
    pub fields: Vec<String>,
    /// Keep primary rows without a match (joined fields stay null).
    pub keep_unmatched: bool,
}

impl JoinSpec {
    #[must_use]
    pub fn new(primary_key: impl Into<String>, secondary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            secondary_key: secondary_key.into(),
            fields: Vec::new(),
            keep_unmatched: true,
        }
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn with_keep_unmatched(mut self, keep: bool) -> Self {
        self.keep_unmatched = keep;
        self
    }
}

/// Result of an attribute join.
#[derive(Debug, Clone)]
pub struct JoinedTable {
    pub table: Table,
    /// Secondary rows ignored because an earlier row had the same key.
    pub duplicate_keys: usize,
    /// Primary rows that found no secondary row.
    pub unmatched: usize,
}

/// Joins `secondary` onto `primary`, one output row per primary row.
///
/// When several secondary rows share a key the first one wins; callers that
/// need a specific row pre-filter the secondary table (e.g. `LINE_ID = 1`).
/// Joined fields whose names collide with primary fields get a `_1` suffix.
///
/// # Errors
///
/// Returns [`DerivationError::MissingField`](crate::error::DerivationError::MissingField)
/// when a key or carried field is absent, and conformance errors for the
/// output rows.
pub fn attribute_join(primary: &Table, secondary: &Table, spec: &JoinSpec) -> Result<JoinedTable> {
    let primary_key = require_field(&primary.schema, &spec.primary_key, "join primary")?
        .name
        .clone();
    let secondary_key = require_field(&secondary.schema, &spec.secondary_key, "join secondary")?
        .name
        .clone();

    let carried = if spec.fields.is_empty() {
        secondary
            .schema
            .fields
            .iter()
            .filter(|f| f.name != secondary_key)
            .cloned()
            .collect::<Vec<_>>()
    } else {
        spec.fields
            .iter()
            .map(|name| require_field(&secondary.schema, name, "join secondary").cloned())
            .collect::<Result<Vec<_>>>()?
    };

    let mut schema = primary.schema.clone();
    let mut renames = Vec::with_capacity(carried.len());
    for field in &carried {
        let output = unique_name(&schema, &field.name);
        schema.push_field(field.clone().renamed(&output))?;
        renames.push((field.name.clone(), output));
    }

    let mut index: HashMap<String, &Feature> = HashMap::new();
    let mut duplicate_keys = 0;
    for row in &secondary.features {
        let Some(key) = row.get(&secondary_key).key() else {
            continue;
        };
        if index.contains_key(&key) {
            duplicate_keys += 1;
        } else {
            index.insert(key, row);
        }
    }
    if duplicate_keys > 0 {
        warn!(
            "{duplicate_keys} secondary rows share a '{secondary_key}' with an earlier row and were ignored"
        );
    }

    let mut table = Table::new(schema);
    let mut unmatched = 0;
    for feature in &primary.features {
        let matched = feature
            .get(&primary_key)
            .key()
            .and_then(|key| index.get(&key).copied());
        let mut joined = feature.clone();
        match matched {
            Some(row) => {
                for (from, to) in &renames {
                    joined.set(to.clone(), row.get(from).clone());
                }
            },
            None => {
                unmatched += 1;
                if !spec.keep_unmatched {
                    continue;
                }
            },
        }
        table.push(joined)?;
    }

    Ok(JoinedTable {
        table,
        duplicate_keys,
        unmatched,
    })
}

//! Code translation tables.
//!
//! A [`CodeTable`] maps stored codes (district numbers, permit type codes,
//! street abbreviations) to human-readable labels. Translation is total:
//! unknown codes come back unchanged and null input maps to the table's
//! null label, if it has one.

use std::collections::BTreeMap;

use geosync_core_common::Value;

use crate::error::TranslateError;

/// Normalizes a code for lookup: trimmed and uppercased.
fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Immutable code-to-label mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    name: String,
    entries: BTreeMap<String, String>,
    null_label: Option<String>,
}

impl CodeTable {
    /// Builds a table from `(code, label)` pairs.
    ///
    /// Codes are compared case-insensitively after trimming.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError::DuplicateCode`] when a code appears twice.
    pub fn from_pairs<I, C, L>(name: impl Into<String>, pairs: I) -> Result<Self, TranslateError>
    where
        I: IntoIterator<Item = (C, L)>,
        C: AsRef<str>,
        L: Into<String>,
    {
        let name = name.into();
        let mut entries = BTreeMap::new();
        for (code, label) in pairs {
            let code = normalize_code(code.as_ref());
            if entries.insert(code.clone(), label.into()).is_some() {
                return Err(TranslateError::DuplicateCode { table: name, code });
            }
        }
        Ok(Self {
            name,
            entries,
            null_label: None,
        })
    }

    /// Builds a table from parallel code and label lists.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError::LengthMismatch`] when the lists differ in
    /// length, or [`TranslateError::DuplicateCode`] for a repeated code.
    pub fn from_parallel<C, L>(
        name: impl Into<String>,
        codes: &[C],
        labels: &[L],
    ) -> Result<Self, TranslateError>
    where
        C: AsRef<str>,
        L: AsRef<str>,
    {
        let name = name.into();
        if codes.len() != labels.len() {
            return Err(TranslateError::LengthMismatch {
                table: name,
                codes: codes.len(),
                labels: labels.len(),
            });
        }
        Self::from_pairs(
            name,
            codes
                .iter()
                .zip(labels)
                .map(|(code, label)| (code.as_ref(), label.as_ref().to_string())),
        )
    }

    /// Sets the label produced for null input.
    #[must_use]
    pub fn with_null_label(mut self, label: impl Into<String>) -> Self {
        self.null_label = Some(label.into());
        self
    }

    /// Builds the label-to-code table, used to standardize spelled-out words.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError::DuplicateCode`] when two codes share a label.
    pub fn inverted(&self, name: impl Into<String>) -> Result<Self, TranslateError> {
        Self::from_pairs(
            name,
            self.entries
                .iter()
                .map(|(code, label)| (label.as_str(), code.clone())),
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn null_label(&self) -> Option<&str> {
        self.null_label.as_deref()
    }

    /// Entries in code order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(c, l)| (c.as_str(), l.as_str()))
    }

    /// Returns the label for `code`, if the table defines it.
    #[must_use]
    pub fn lookup(&self, code: &str) -> Option<&str> {
        self.entries.get(&normalize_code(code)).map(String::as_str)
    }

    /// Translates a stored value.
    ///
    /// Known codes become their label and unknown values are returned as-is.
    /// Null or blank input becomes the null label, or stays null without one.
    #[must_use]
    pub fn translate(&self, value: &Value) -> Value {
        match value.key().filter(|key| !key.is_empty()) {
            None => self
                .null_label
                .as_ref()
                .map_or(Value::Null, |label| Value::Text(label.clone())),
            Some(key) => match self.lookup(&key) {
                Some(label) => Value::Text(label.to_string()),
                None => value.clone(),
            },
        }
    }

    /// Text-level form of [`CodeTable::translate`].
    #[must_use]
    pub fn translate_str(&self, value: Option<&str>) -> Option<String> {
        match value.filter(|code| !code.trim().is_empty()) {
            None => self.null_label.clone(),
            Some(code) => Some(
                self.lookup(code)
                    .map_or_else(|| code.to_string(), str::to_string),
            ),
        }
    }
}

/// Registry of named lookup tables available to a run.
#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    tables: BTreeMap<String, CodeTable>,
}

impl LookupTables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table, replacing any table with the same name.
    pub fn insert(&mut self, table: CodeTable) {
        self.tables.insert(table.name().to_string(), table);
    }

    /// Returns the table named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError::UnknownTable`] when no such table exists.
    pub fn get(&self, name: &str) -> Result<&CodeTable, TranslateError> {
        self.tables
            .get(name)
            .ok_or_else(|| TranslateError::UnknownTable {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodeTable> {
        self.tables.values()
    }
}

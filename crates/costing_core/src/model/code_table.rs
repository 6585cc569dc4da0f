//! Code-to-label translation tables.
//!
//! # Invariants
//! - Translation is total: unknown codes come back unchanged.
//! - Tables are plain data so deployments can swap them through the schema
//!   profile.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static mapping from a stored enumeration code to its display label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeTable(BTreeMap<String, String>);

impl CodeTable {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(code, label)| ((*code).to_string(), (*label).to_string()))
                .collect(),
        )
    }

    /// Returns the mapped label, or `code` unchanged when unmapped.
    ///
    /// Exact keys win; otherwise the trimmed code is tried so padded values
    /// from fixed-width columns still translate.
    pub fn translate(&self, code: &str) -> String {
        if let Some(label) = self.0.get(code) {
            return label.clone();
        }
        match self.0.get(code.trim()) {
            Some(label) => label.clone(),
            None => code.to_string(),
        }
    }

    /// Translates a nullable column; `NULL` renders as an empty label.
    pub fn translate_opt(&self, code: Option<&str>) -> String {
        code.map(|value| self.translate(value)).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Free-function form of [`CodeTable::translate`].
pub fn translate(table: &CodeTable, code: &str) -> String {
    table.translate(code)
}

//! Key canonicalization for cross-type joins.
//!
//! `lis_project.id` is an integer while every table referencing it stores the
//! id as text. Department ids have the same split. Both sides are reduced to
//! one textual form before any equality test.
//!
//! # Invariants
//! - Surrounding whitespace never affects equality.
//! - Integral values compare by numeric value (`"0100"`, `"100 "`, `100`).
//! - Non-integral values compare as trimmed text, case preserved.

use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// Returns the canonical textual form of one raw key value.
pub fn canonical_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.to_string();
    }

    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return "0".to_string();
    }
    if negative {
        format!("-{significant}")
    } else {
        significant.to_string()
    }
}

/// Canonical form for floating-point keys stored by loosely typed columns.
pub fn canonical_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        // Exact: |value| is below 2^53.
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Compares two raw key values under canonicalization.
pub fn keys_match(left: &str, right: &str) -> bool {
    canonical_key(left) == canonical_key(right)
}

/// Canonical project identity shared by `lis_project.id` and every
/// `project_id` text reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectKey(String);

impl ProjectKey {
    /// Builds a key from the integer primary key.
    pub fn from_id(id: i64) -> Self {
        Self(id.to_string())
    }

    /// Parses a caller- or storage-provided identity.
    ///
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = canonical_key(raw);
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ProjectKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

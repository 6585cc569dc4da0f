//! Per-deployment schema profile.
//!
//! # Responsibility
//! - Select code tables, person key, history rule and status codes for one
//!   schema generation.
//! - Load a replacement profile from JSON for deployments whose tables differ
//!   from the built-in presets.
//!
//! # Invariants
//! - Resolver logic never branches on the generation itself, only on profile
//!   fields.

use crate::model::code_table::CodeTable;
use crate::repo::project_repo::ProjectFilter;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

/// Known schema generations of the upstream store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaGeneration {
    /// Single-digit status codes, persons keyed by display name, no primary
    /// flag, history by completion tag.
    Legacy,
    /// Two-digit status codes, persons keyed by external id, primary flag
    /// present, history by completion status.
    Current,
}

/// Which person column identifies a distinct person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonKey {
    /// `lis_measure_person.measure_person_id`.
    ExternalId,
    /// `lis_measure_person.person`.
    DisplayName,
}

/// What marks a project as historical (completed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRule {
    /// `measure_tag` equals `closed_tag`.
    CompletionTag,
    /// `measure_status` equals `completed_status`.
    CompletionStatus,
}

/// Versioned configuration object consumed by every resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaProfile {
    pub generation: SchemaGeneration,
    pub brand_codes: CodeTable,
    pub scale_codes: CodeTable,
    pub status_codes: CodeTable,
    pub person_key: PersonKey,
    pub history_rule: HistoryRule,
    pub open_tag: String,
    pub closed_tag: String,
    pub issued_status: String,
    pub completed_status: String,
    pub honor_primary_flag: bool,
}

impl SchemaProfile {
    /// Built-in preset for one generation.
    pub fn for_generation(generation: SchemaGeneration) -> Self {
        match generation {
            SchemaGeneration::Legacy => Self {
                generation,
                brand_codes: CodeTable::from_pairs(&[
                    ("0", "自主品牌"),
                    ("1", "合资品牌"),
                    ("2", "新能源品牌"),
                ]),
                scale_codes: CodeTable::from_pairs(&[
                    ("S", "小改款"),
                    ("M", "中改款"),
                    ("L", "全新开发"),
                ]),
                status_codes: CodeTable::from_pairs(&[
                    ("0", "未下发"),
                    ("1", "已下发"),
                    ("2", "测算中"),
                    ("3", "已完成"),
                ]),
                person_key: PersonKey::DisplayName,
                history_rule: HistoryRule::CompletionTag,
                open_tag: "0".to_string(),
                closed_tag: "1".to_string(),
                issued_status: "1".to_string(),
                completed_status: "3".to_string(),
                honor_primary_flag: false,
            },
            SchemaGeneration::Current => Self {
                generation,
                brand_codes: CodeTable::from_pairs(&[
                    ("10", "自主品牌"),
                    ("20", "合资品牌"),
                    ("30", "新能源品牌"),
                    ("40", "海外品牌"),
                ]),
                scale_codes: CodeTable::from_pairs(&[
                    ("1", "小改款"),
                    ("2", "中改款"),
                    ("3", "大改款"),
                    ("4", "全新开发"),
                ]),
                status_codes: CodeTable::from_pairs(&[
                    ("10", "待下发"),
                    ("20", "已下发"),
                    ("30", "测算中"),
                    ("40", "已完成"),
                    ("50", "已关闭"),
                ]),
                person_key: PersonKey::ExternalId,
                history_rule: HistoryRule::CompletionStatus,
                open_tag: "0".to_string(),
                closed_tag: "1".to_string(),
                issued_status: "20".to_string(),
                completed_status: "40".to_string(),
                honor_primary_flag: true,
            },
        }
    }

    /// Parses a full profile from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ProfileError> {
        serde_json::from_str(json).map_err(ProfileError::Parse)
    }

    /// Reads and parses a JSON profile file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| ProfileError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&contents)
    }

    /// Filter selecting open tasks: not-yet-closed tag and issued status.
    pub fn open_filter(&self) -> ProjectFilter {
        ProjectFilter {
            completion_tag: Some(self.open_tag.clone()),
            status: Some(self.issued_status.clone()),
        }
    }

    /// Filter selecting historical projects under the configured rule.
    pub fn history_filter(&self) -> ProjectFilter {
        match self.history_rule {
            HistoryRule::CompletionTag => ProjectFilter {
                completion_tag: Some(self.closed_tag.clone()),
                status: None,
            },
            HistoryRule::CompletionStatus => ProjectFilter {
                completion_tag: None,
                status: Some(self.completed_status.clone()),
            },
        }
    }
}

impl Default for SchemaProfile {
    fn default() -> Self {
        Self::for_generation(SchemaGeneration::Current)
    }
}

macro_rules! impl_from_str {
    ($ty:ty, $what:literal, { $($text:literal => $value:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ProfileError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($value),)+
                    other => Err(ProfileError::UnknownValue {
                        field: $what,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

impl_from_str!(SchemaGeneration, "schema generation", {
    "legacy" => SchemaGeneration::Legacy,
    "current" => SchemaGeneration::Current,
});

impl_from_str!(PersonKey, "person key", {
    "external_id" => PersonKey::ExternalId,
    "display_name" => PersonKey::DisplayName,
});

impl_from_str!(HistoryRule, "history rule", {
    "completion_tag" => HistoryRule::CompletionTag,
    "completion_status" => HistoryRule::CompletionStatus,
});

/// Profile loading and parsing failures.
#[derive(Debug)]
pub enum ProfileError {
    Io { path: String, message: String },
    Parse(serde_json::Error),
    UnknownValue { field: &'static str, value: String },
}

impl Display for ProfileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => {
                write!(f, "failed to read schema profile `{path}`: {message}")
            }
            Self::Parse(err) => write!(f, "invalid schema profile: {err}"),
            Self::UnknownValue { field, value } => write!(f, "unknown {field} `{value}`"),
        }
    }
}

impl Error for ProfileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

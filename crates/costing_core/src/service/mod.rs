//! Resolver services.
//!
//! # Responsibility
//! - Orchestrate repository reads into the task, detail, permission,
//!   history and person use-cases.
//! - Convert every repository failure into [`ServiceError`] at the service
//!   boundary.
//!
//! # Invariants
//! - Services hold no mutable state; one instance per request is fine.
//! - Representative selection is shared by every caller through
//!   [`pick_representative`].

use crate::config::PersonKey;
use crate::model::records::{AssignmentRecord, MeasurePersonRecord, ProjectAssignment, ProjectRecord};
use crate::repo::RepoError;
use chrono::NaiveDateTime;
use log::error;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod history_service;
pub mod permission_service;
pub mod person_service;
pub mod task_detail_service;
pub mod task_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

const TIMESTAMP_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Error taxonomy surfaced to callers.
#[derive(Debug)]
pub enum ServiceError {
    /// No row matches the requested task/project/person.
    NotFound(String),
    /// A required or paired parameter is missing.
    Validation(String),
    /// The store failed; details stay server side.
    Upstream(RepoError),
}

impl ServiceError {
    /// Wraps a repository failure and logs it with the operation name.
    pub fn upstream(operation: &'static str, err: RepoError) -> Self {
        error!(
            "event=resolver_failed module=service operation={} status=error error={}",
            operation, err
        );
        Self::Upstream(err)
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Validation(message) => write!(f, "invalid request: {message}"),
            Self::Upstream(err) => write!(f, "store failure: {err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Upstream(err) => Some(err),
            _ => None,
        }
    }
}

/// Chooses the one assignment that represents a project.
///
/// With `honor_primary_flag`, the lowest-id row flagged primary wins when one
/// exists. Otherwise the lowest internal id wins.
pub fn pick_representative(
    assignments: &[AssignmentRecord],
    honor_primary_flag: bool,
) -> Option<&AssignmentRecord> {
    if honor_primary_flag {
        let primary = assignments
            .iter()
            .filter(|assignment| assignment.person.is_primary == Some(true))
            .min_by_key(|assignment| assignment.person.id);
        if primary.is_some() {
            return primary;
        }
    }
    assignments.iter().min_by_key(|assignment| assignment.person.id)
}

/// Value identifying a distinct person under the configured key, falling
/// back to the other column when the keyed one is blank.
pub fn person_identity(person: &MeasurePersonRecord, key: PersonKey) -> Option<String> {
    let (preferred, fallback) = match key {
        PersonKey::ExternalId => (&person.person_id, &person.person_name),
        PersonKey::DisplayName => (&person.person_name, &person.person_id),
    };
    non_blank(preferred.as_deref())
        .or_else(|| non_blank(fallback.as_deref()))
        .map(str::to_string)
}

/// Joins non-blank values with `,`, dropping duplicates and keeping
/// first-seen order.
pub fn join_distinct<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for value in values.into_iter().flatten() {
        let value = value.trim();
        if !value.is_empty() && !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen.join(",")
}

/// Renders a stored timestamp as `YYYY-MM-DD HH:MM:SS`.
///
/// `NULL` and blank values become an empty string; unparseable text is
/// returned trimmed rather than dropped.
pub fn format_timestamp(raw: Option<&str>) -> String {
    let Some(value) = non_blank(raw) else {
        return String::new();
    };
    TIMESTAMP_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|parsed| parsed.format(TIMESTAMP_OUTPUT_FORMAT).to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Groups join rows by project, relying on the store's project-id order.
pub(crate) fn group_by_project(
    rows: Vec<ProjectAssignment>,
) -> Vec<(ProjectRecord, Vec<AssignmentRecord>)> {
    let mut grouped: Vec<(ProjectRecord, Vec<AssignmentRecord>)> = Vec::new();
    for row in rows {
        match grouped.last_mut() {
            Some((project, assignments)) if project.id == row.project.id => {
                assignments.push(row.assignment);
            }
            _ => grouped.push((row.project, vec![row.assignment])),
        }
    }
    grouped
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub(crate) fn text(value: Option<&str>) -> String {
    non_blank(value).unwrap_or_default().to_string()
}

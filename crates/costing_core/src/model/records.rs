//! Raw rows read from the reference tables.
//!
//! Columns are kept as stored: codes untranslated, timestamps as text,
//! nullable columns as `Option`. Interpretation happens in the services.

use crate::model::keys::ProjectKey;

/// One `lis_project` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub id: i64,
    /// `measures_project`.
    pub name: Option<String>,
    pub brand: Option<String>,
    /// `sml`.
    pub scale: Option<String>,
    /// `measure_status`.
    pub status: Option<String>,
    /// `measure_tag`: open vs. closed lineage.
    pub completion_tag: Option<String>,
    pub financial_issuer: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl ProjectRecord {
    pub fn key(&self) -> ProjectKey {
        ProjectKey::from_id(self.id)
    }
}

/// One `lis_measure_person` row: a person assigned to a project within a
/// department.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurePersonRecord {
    /// Internal row id, the tie-break order for representatives.
    pub id: i64,
    pub project_id: Option<String>,
    /// Display name (`person`).
    pub person_name: Option<String>,
    /// External identifier (`measure_person_id`).
    pub person_id: Option<String>,
    /// Raw department identifier (`person_department`).
    pub department_id: Option<String>,
    /// `None` when the column is absent or `NULL`.
    pub is_primary: Option<bool>,
}

impl MeasurePersonRecord {
    /// Whether `needle` equals either the external id or the display name.
    pub fn matches_person(&self, needle: &str) -> bool {
        let needle = needle.trim();
        if needle.is_empty() {
            return false;
        }
        [self.person_id.as_deref(), self.person_name.as_deref()]
            .into_iter()
            .flatten()
            .any(|value| value.trim() == needle)
    }
}

/// A person row joined with its department name, when the directory has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRecord {
    pub person: MeasurePersonRecord,
    pub department_name: Option<String>,
}

impl AssignmentRecord {
    /// Department label: directory name, else the raw department id, else
    /// empty.
    pub fn department_label(&self) -> String {
        self.department_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or_else(|| self.person.department_id.as_deref().map(str::trim))
            .unwrap_or_default()
            .to_string()
    }
}

/// Project row joined with one of its assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectAssignment {
    pub project: ProjectRecord,
    pub assignment: AssignmentRecord,
}

/// One `lis_project_order` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectOrderRecord {
    pub id: i64,
    pub project_id: Option<String>,
    pub order_name: Option<String>,
    /// `power_conf`.
    pub power_config: Option<String>,
    pub market: Option<String>,
}

//! Response projections returned by the services.
//!
//! Field names serialize in camelCase to match the web client contract.

use serde::Serialize;

/// One open task assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    /// `lis_measure_person.id` of the assignment row.
    pub assignment_id: i64,
    /// Project id; this is the `task_id` callers pass back.
    pub id: i64,
    pub name: String,
    pub department: String,
    pub department_id: String,
    /// Person display name.
    pub calculator: String,
    pub person_id: String,
    pub brand: String,
    /// Scale label.
    pub spec: String,
}

/// Full view of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    pub project_id: i64,
    pub project_name: String,
    pub department: String,
    pub department_id: String,
    pub brand: String,
    pub scale: String,
    pub status: String,
    pub calculator: String,
    pub person_id: String,
    pub financial_issuer: String,
    pub created_at: String,
    pub updated_at: String,
    /// Distinct order names, comma-joined.
    pub order_info: String,
    /// Distinct power configurations, comma-joined.
    pub power_config: String,
    /// Distinct markets, comma-joined.
    pub market: String,
    pub visible_sheets: Vec<String>,
}

/// A completed project reduced to its representative person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: i64,
    pub name: String,
    pub department: String,
    pub department_id: String,
    pub calculator: String,
    pub person_id: String,
    pub brand: String,
    pub spec: String,
    pub status: String,
}

/// One distinct person with aggregated departments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonSummary {
    /// External identifier, empty when never recorded.
    pub id: String,
    pub name: String,
    /// Distinct department names, comma-joined, or `unknown`.
    pub department: String,
}

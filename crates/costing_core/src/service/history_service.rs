//! Historical and reference project resolution.
//!
//! # Invariants
//! - "Historical" follows the profile's [`HistoryRule`](crate::config::HistoryRule).
//! - Each project is reduced to exactly one representative person.
//! - A reference list never contains the task it was requested for.

use crate::config::SchemaProfile;
use crate::model::keys::{keys_match, ProjectKey};
use crate::model::records::{AssignmentRecord, ProjectRecord};
use crate::model::views::ProjectSummary;
use crate::repo::project_repo::ProjectRepository;
use crate::service::{
    group_by_project, non_blank, pick_representative, text, ServiceError, ServiceResult,
};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

pub struct HistoryService<R: ProjectRepository> {
    repo: R,
    profile: Arc<SchemaProfile>,
}

impl<R: ProjectRepository> HistoryService<R> {
    pub fn new(repo: R, profile: Arc<SchemaProfile>) -> Self {
        Self { repo, profile }
    }

    /// Lists completed projects in the department of `department_id`, minus
    /// the project `exclude_task_id`.
    ///
    /// Department scoping applies to the representative person only; a
    /// project whose other assignees sit in the department does not qualify.
    pub fn list_reference_projects(
        &self,
        exclude_task_id: &str,
        department_id: &str,
    ) -> ServiceResult<Vec<ProjectSummary>> {
        let department_id = non_blank(Some(department_id)).ok_or_else(|| {
            ServiceError::Validation("department_id is required".to_string())
        })?;
        let excluded = ProjectKey::parse(exclude_task_id);

        let rows = self
            .repo
            .list_assignments(&self.profile.history_filter())
            .map_err(|err| ServiceError::upstream("list_reference_projects", err))?;

        let mut references = Vec::new();
        for (project, assignments) in group_by_project(rows) {
            if excluded.as_ref() == Some(&project.key()) {
                continue;
            }
            let Some(representative) =
                pick_representative(&assignments, self.profile.honor_primary_flag)
            else {
                continue;
            };
            let in_department = representative
                .person
                .department_id
                .as_deref()
                .is_some_and(|value| keys_match(value, department_id));
            if in_department {
                references.push(self.summarize(&project, Some(representative)));
            }
        }

        debug!(
            "event=list_reference_projects module=service status=ok references={}",
            references.len()
        );
        Ok(references)
    }

    /// Lists every completed project with its representative person.
    ///
    /// Projects without persons are kept with empty person fields.
    pub fn list_history(&self) -> ServiceResult<Vec<ProjectSummary>> {
        let filter = self.profile.history_filter();
        let projects = self
            .repo
            .list_projects(&filter)
            .map_err(|err| ServiceError::upstream("list_history", err))?;
        let rows = self
            .repo
            .list_assignments(&filter)
            .map_err(|err| ServiceError::upstream("list_history", err))?;

        let mut by_project: HashMap<i64, Vec<AssignmentRecord>> = group_by_project(rows)
            .into_iter()
            .map(|(project, assignments)| (project.id, assignments))
            .collect();

        Ok(projects
            .iter()
            .map(|project| {
                let assignments = by_project.remove(&project.id).unwrap_or_default();
                let representative =
                    pick_representative(&assignments, self.profile.honor_primary_flag);
                self.summarize(project, representative)
            })
            .collect())
    }

    fn summarize(
        &self,
        project: &ProjectRecord,
        representative: Option<&AssignmentRecord>,
    ) -> ProjectSummary {
        let profile = &self.profile;
        ProjectSummary {
            id: project.id,
            name: text(project.name.as_deref()),
            department: representative
                .map(AssignmentRecord::department_label)
                .unwrap_or_default(),
            department_id: representative
                .map(|r| text(r.person.department_id.as_deref()))
                .unwrap_or_default(),
            calculator: representative
                .map(|r| text(r.person.person_name.as_deref()))
                .unwrap_or_default(),
            person_id: representative
                .map(|r| text(r.person.person_id.as_deref()))
                .unwrap_or_default(),
            brand: profile.brand_codes.translate_opt(project.brand.as_deref()),
            spec: profile.scale_codes.translate_opt(project.scale.as_deref()),
            status: profile.status_codes.translate_opt(project.status.as_deref()),
        }
    }
}

//! Single-task detail resolution.
//!
//! # Responsibility
//! - Resolve the (project, person, department) triple for one task.
//! - Aggregate the project's orders and derive visible sheets.
//!
//! # Invariants
//! - With person and department given, only an exact triple matches; a miss
//!   is `NotFound`, never a different row.
//! - Person and department are given together or not at all.
//! - Without them, the project's representative person is used; a project
//!   without persons still resolves with empty person fields.

use crate::config::SchemaProfile;
use crate::model::keys::{keys_match, ProjectKey};
use crate::model::records::AssignmentRecord;
use crate::model::views::TaskDetail;
use crate::repo::directory_repo::DirectoryRepository;
use crate::repo::project_repo::ProjectRepository;
use crate::service::permission_service::PermissionService;
use crate::service::{
    format_timestamp, join_distinct, non_blank, pick_representative, text, ServiceError,
    ServiceResult,
};
use std::sync::Arc;

/// Optional disambiguators for [`TaskDetailService::get_task_detail`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSelector<'a> {
    pub person_id: Option<&'a str>,
    pub department_id: Option<&'a str>,
}

impl<'a> TaskSelector<'a> {
    pub fn exact(person_id: &'a str, department_id: &'a str) -> Self {
        Self {
            person_id: Some(person_id),
            department_id: Some(department_id),
        }
    }
}

pub struct TaskDetailService<R: ProjectRepository, D: DirectoryRepository> {
    repo: R,
    permissions: PermissionService<D>,
    profile: Arc<SchemaProfile>,
}

impl<R: ProjectRepository, D: DirectoryRepository> TaskDetailService<R, D> {
    pub fn new(repo: R, directory: D, profile: Arc<SchemaProfile>) -> Self {
        Self {
            repo,
            permissions: PermissionService::new(directory),
            profile,
        }
    }

    /// Resolves one task by project identity and optional disambiguators.
    ///
    /// # Errors
    /// - `Validation` when exactly one of person/department is given.
    /// - `NotFound` when the project is unknown, or the exact triple has no
    ///   row.
    /// - `Upstream` on store failure.
    pub fn get_task_detail(
        &self,
        task_id: &str,
        selector: TaskSelector<'_>,
    ) -> ServiceResult<TaskDetail> {
        let person_id = non_blank(selector.person_id);
        let department_id = non_blank(selector.department_id);
        if person_id.is_some() != department_id.is_some() {
            return Err(ServiceError::Validation(
                "person_id and department_id must be supplied together".to_string(),
            ));
        }

        let key = ProjectKey::parse(task_id)
            .ok_or_else(|| ServiceError::NotFound(format!("task `{}`", task_id.trim())))?;
        let project = self
            .repo
            .get_project(&key)
            .map_err(|err| ServiceError::upstream("get_task_detail", err))?
            .ok_or_else(|| ServiceError::NotFound(format!("task `{key}`")))?;
        let assignments = self
            .repo
            .assignments_for_project(&key)
            .map_err(|err| ServiceError::upstream("get_task_detail", err))?;

        let assignee: Option<&AssignmentRecord> = match (person_id, department_id) {
            (Some(person_id), Some(department_id)) => {
                let exact = assignments.iter().find(|assignment| {
                    assignment.person.matches_person(person_id)
                        && assignment
                            .person
                            .department_id
                            .as_deref()
                            .is_some_and(|value| keys_match(value, department_id))
                });
                Some(exact.ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "task `{key}` for person `{person_id}` in department `{department_id}`"
                    ))
                })?)
            }
            _ => pick_representative(&assignments, self.profile.honor_primary_flag),
        };

        let orders = self
            .repo
            .orders_for_project(&key)
            .map_err(|err| ServiceError::upstream("get_task_detail", err))?;

        let sheet_department =
            assignee.and_then(|assignee| non_blank(assignee.person.department_id.as_deref()));
        let visible_sheets = match sheet_department {
            Some(department) => self.permissions.visible_sheets(department)?,
            None => Vec::new(),
        };

        let profile = &self.profile;
        Ok(TaskDetail {
            project_id: project.id,
            project_name: text(project.name.as_deref()),
            department: assignee
                .map(AssignmentRecord::department_label)
                .unwrap_or_default(),
            department_id: assignee
                .map(|a| text(a.person.department_id.as_deref()))
                .unwrap_or_default(),
            brand: profile.brand_codes.translate_opt(project.brand.as_deref()),
            scale: profile.scale_codes.translate_opt(project.scale.as_deref()),
            status: profile.status_codes.translate_opt(project.status.as_deref()),
            calculator: assignee
                .map(|a| text(a.person.person_name.as_deref()))
                .unwrap_or_default(),
            person_id: assignee
                .map(|a| text(a.person.person_id.as_deref()))
                .unwrap_or_default(),
            financial_issuer: text(project.financial_issuer.as_deref()),
            created_at: format_timestamp(project.created_at.as_deref()),
            updated_at: format_timestamp(project.updated_at.as_deref()),
            order_info: join_distinct(orders.iter().map(|o| o.order_name.as_deref())),
            power_config: join_distinct(orders.iter().map(|o| o.power_config.as_deref())),
            market: join_distinct(orders.iter().map(|o| o.market.as_deref())),
            visible_sheets,
        })
    }
}

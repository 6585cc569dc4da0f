//! Open-task listing.
//!
//! # Invariants
//! - Only projects with the open tag and the issued status are listed.
//! - A (project, person) pair appears at most once; the first joined
//!   department row wins.
//! - A person filter matches the external id or the display name.

use crate::config::SchemaProfile;
use crate::model::views::TaskSummary;
use crate::repo::project_repo::ProjectRepository;
use crate::service::{non_blank, person_identity, text, ServiceError, ServiceResult};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

/// Task resolver over a project repository.
pub struct TaskService<R: ProjectRepository> {
    repo: R,
    profile: Arc<SchemaProfile>,
}

impl<R: ProjectRepository> TaskService<R> {
    pub fn new(repo: R, profile: Arc<SchemaProfile>) -> Self {
        Self { repo, profile }
    }

    /// Lists open task assignments, optionally restricted to one person.
    ///
    /// A blank filter is treated as absent.
    pub fn list_open_tasks(&self, person_filter: Option<&str>) -> ServiceResult<Vec<TaskSummary>> {
        let person_filter = non_blank(person_filter);
        let rows = self
            .repo
            .list_assignments(&self.profile.open_filter())
            .map_err(|err| ServiceError::upstream("list_open_tasks", err))?;
        let joined_rows = rows.len();

        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for row in rows {
            let person = &row.assignment.person;
            if let Some(filter) = person_filter {
                if !person.matches_person(filter) {
                    continue;
                }
            }

            let identity = person_identity(person, self.profile.person_key)
                .unwrap_or_else(|| format!("#{}", person.id));
            if !seen.insert((row.project.id, identity)) {
                continue;
            }

            tasks.push(TaskSummary {
                assignment_id: person.id,
                id: row.project.id,
                name: text(row.project.name.as_deref()),
                department: row.assignment.department_label(),
                department_id: text(person.department_id.as_deref()),
                calculator: text(person.person_name.as_deref()),
                person_id: text(person.person_id.as_deref()),
                brand: self
                    .profile
                    .brand_codes
                    .translate_opt(row.project.brand.as_deref()),
                spec: self
                    .profile
                    .scale_codes
                    .translate_opt(row.project.scale.as_deref()),
            });
        }

        debug!(
            "event=list_open_tasks module=service status=ok joined_rows={} tasks={} filtered={}",
            joined_rows,
            tasks.len(),
            person_filter.is_some()
        );
        Ok(tasks)
    }
}

//! Department sheet visibility.
//!
//! Reports which report sheets a department may view; it never gates access.
//! Repeated grants are returned as stored.

use crate::repo::directory_repo::DirectoryRepository;
use crate::service::{ServiceError, ServiceResult};

pub struct PermissionService<D: DirectoryRepository> {
    repo: D,
}

impl<D: DirectoryRepository> PermissionService<D> {
    pub fn new(repo: D) -> Self {
        Self { repo }
    }

    /// Lists the sheet names granted to `department_id`; empty when none.
    pub fn visible_sheets(&self, department_id: &str) -> ServiceResult<Vec<String>> {
        self.repo
            .sheets_for_department(department_id)
            .map_err(|err| ServiceError::upstream("visible_sheets", err))
    }
}

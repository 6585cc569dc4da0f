//! Core resolution logic for measurement/costing tasks.
//! This crate is the single source of truth for join, dedup and
//! translation rules over the reference tables.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{HistoryRule, PersonKey, ProfileError, SchemaGeneration, SchemaProfile};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use model::code_table::{translate, CodeTable};
pub use model::keys::{canonical_key, ProjectKey};
pub use model::views::{PersonSummary, ProjectSummary, TaskDetail, TaskSummary};
pub use repo::directory_repo::{DirectoryRepository, SqliteDirectoryRepository};
pub use repo::project_repo::{ProjectFilter, ProjectRepository, SqliteProjectRepository};
pub use repo::{RepoError, RepoResult};
pub use service::history_service::HistoryService;
pub use service::permission_service::PermissionService;
pub use service::person_service::{PersonService, UNKNOWN_DEPARTMENT};
pub use service::task_detail_service::{TaskDetailService, TaskSelector};
pub use service::task_service::TaskService;
pub use service::{ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

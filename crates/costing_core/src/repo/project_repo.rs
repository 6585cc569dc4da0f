//! Project, assignment and order reads.
//!
//! # Responsibility
//! - Join `lis_project` to `lis_measure_person` and `sys_dept` on canonical
//!   keys.
//! - Fetch one project's orders.
//!
//! # Invariants
//! - Integer ids and text references are matched by `canonical_key`; the
//!   project/assignment join is a hash join, linear in both tables.
//! - Joined rows are ordered by `lis_project.id, lis_measure_person.id`.
//! - Deployments without `lis_measure_person.is_primary` read the flag as
//!   `NULL`.

use crate::model::keys::ProjectKey;
use crate::model::records::{AssignmentRecord, ProjectAssignment, ProjectOrderRecord, ProjectRecord};
use crate::repo::{
    department_names, ensure_columns, query_assignments, read_text, table_has_column, RepoResult,
};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;

const PROJECT_COLUMNS: &[&str] = &[
    "id",
    "measures_project",
    "brand",
    "sml",
    "measure_status",
    "measure_tag",
    "financial_issuer",
    "create_time",
    "update_time",
];
const PERSON_COLUMNS: &[&str] = &[
    "id",
    "project_id",
    "person",
    "measure_person_id",
    "person_department",
];
const DEPT_COLUMNS: &[&str] = &["dept_id", "dept_name"];
const ORDER_COLUMNS: &[&str] = &["id", "project_id", "order_name", "power_conf", "market"];

const PROJECT_SELECT_SQL: &str = "SELECT
    p.id AS project_row_id,
    p.measures_project,
    p.brand,
    p.sml,
    p.measure_status,
    p.measure_tag,
    p.financial_issuer,
    p.create_time,
    p.update_time
FROM lis_project p";

/// Equality filter on project lifecycle codes; `None` means unrestricted.
///
/// Codes compare under `canonical_key`, so `'1'` matches a stored `1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    /// `measure_tag`.
    pub completion_tag: Option<String>,
    /// `measure_status`.
    pub status: Option<String>,
}

/// Read contract for project-centric lookups.
pub trait ProjectRepository {
    /// Gets one project by canonical identity.
    fn get_project(&self, key: &ProjectKey) -> RepoResult<Option<ProjectRecord>>;
    /// Lists projects matching `filter`, ordered by id.
    fn list_projects(&self, filter: &ProjectFilter) -> RepoResult<Vec<ProjectRecord>>;
    /// Lists project/assignment join rows for projects matching `filter`.
    ///
    /// Projects without assignments produce no rows.
    fn list_assignments(&self, filter: &ProjectFilter) -> RepoResult<Vec<ProjectAssignment>>;
    /// Lists one project's assignments ordered by assignment id.
    fn assignments_for_project(&self, key: &ProjectKey) -> RepoResult<Vec<AssignmentRecord>>;
    /// Lists one project's orders ordered by order id.
    fn orders_for_project(&self, key: &ProjectKey) -> RepoResult<Vec<ProjectOrderRecord>>;
}

/// SQLite-backed project repository.
#[derive(Clone, Copy)]
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
    has_primary_flag: bool,
}

impl<'conn> SqliteProjectRepository<'conn> {
    /// Constructs a repository after checking the tables it reads.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_columns(conn, "lis_project", PROJECT_COLUMNS)?;
        ensure_columns(conn, "lis_measure_person", PERSON_COLUMNS)?;
        ensure_columns(conn, "sys_dept", DEPT_COLUMNS)?;
        ensure_columns(conn, "lis_project_order", ORDER_COLUMNS)?;
        let has_primary_flag = table_has_column(conn, "lis_measure_person", "is_primary")?;
        Ok(Self {
            conn,
            has_primary_flag,
        })
    }

    /// Whether the deployed schema carries `lis_measure_person.is_primary`.
    pub fn has_primary_flag(&self) -> bool {
        self.has_primary_flag
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn get_project(&self, key: &ProjectKey) -> RepoResult<Option<ProjectRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROJECT_SELECT_SQL}
             WHERE canonical_key(p.id) = ?1
             ORDER BY p.id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query([key.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    fn list_projects(&self, filter: &ProjectFilter) -> RepoResult<Vec<ProjectRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROJECT_SELECT_SQL}
             WHERE (?1 IS NULL OR canonical_key(p.measure_tag) = canonical_key(?1))
               AND (?2 IS NULL OR canonical_key(p.measure_status) = canonical_key(?2))
             ORDER BY p.id ASC;"
        ))?;
        let mut rows = stmt.query(params![
            filter.completion_tag.as_deref(),
            filter.status.as_deref()
        ])?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(parse_project_row(row)?);
        }
        Ok(projects)
    }

    fn list_assignments(&self, filter: &ProjectFilter) -> RepoResult<Vec<ProjectAssignment>> {
        let projects = self.list_projects(filter)?;
        if projects.is_empty() {
            return Ok(Vec::new());
        }

        let departments = department_names(self.conn)?;
        let mut by_project: HashMap<String, Vec<AssignmentRecord>> = HashMap::new();
        for (project_key, assignment) in
            query_assignments(self.conn, self.has_primary_flag, "", [], &departments)?
        {
            if let Some(project_key) = project_key {
                by_project.entry(project_key).or_default().push(assignment);
            }
        }

        let mut joined = Vec::new();
        for project in projects {
            let Some(assignments) = by_project.get(project.key().as_str()) else {
                continue;
            };
            for assignment in assignments {
                joined.push(ProjectAssignment {
                    project: project.clone(),
                    assignment: assignment.clone(),
                });
            }
        }
        Ok(joined)
    }

    fn assignments_for_project(&self, key: &ProjectKey) -> RepoResult<Vec<AssignmentRecord>> {
        let departments = department_names(self.conn)?;
        let assignments = query_assignments(
            self.conn,
            self.has_primary_flag,
            "WHERE canonical_key(mp.project_id) = ?1",
            [key.as_str()],
            &departments,
        )?;
        Ok(assignments
            .into_iter()
            .map(|(_, assignment)| assignment)
            .collect())
    }

    fn orders_for_project(&self, key: &ProjectKey) -> RepoResult<Vec<ProjectOrderRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, order_name, power_conf, market
             FROM lis_project_order
             WHERE canonical_key(project_id) = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([key.as_str()])?;
        let mut orders = Vec::new();
        while let Some(row) = rows.next()? {
            orders.push(ProjectOrderRecord {
                id: row.get("id")?,
                project_id: read_text(row, "project_id")?,
                order_name: read_text(row, "order_name")?,
                power_config: read_text(row, "power_conf")?,
                market: read_text(row, "market")?,
            });
        }
        Ok(orders)
    }
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<ProjectRecord> {
    Ok(ProjectRecord {
        id: row.get("project_row_id")?,
        name: read_text(row, "measures_project")?,
        brand: read_text(row, "brand")?,
        scale: read_text(row, "sml")?,
        status: read_text(row, "measure_status")?,
        completion_tag: read_text(row, "measure_tag")?,
        financial_issuer: read_text(row, "financial_issuer")?,
        created_at: read_text(row, "create_time")?,
        updated_at: read_text(row, "update_time")?,
    })
}

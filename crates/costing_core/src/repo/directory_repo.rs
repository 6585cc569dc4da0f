//! Person directory and sheet-permission reads.
//!
//! # Invariants
//! - Person rows are ordered by `lis_measure_person.id`; department names are
//!   attached through one pass over `sys_dept`.
//! - Sheet rows are ordered by `lis_sheet_control.id`; duplicates are kept.

use crate::model::keys::canonical_key;
use crate::model::records::AssignmentRecord;
use crate::repo::{
    department_names, ensure_columns, query_assignments, read_text, table_has_column, RepoResult,
};
use rusqlite::Connection;

/// Read contract for people and department-scoped permissions.
pub trait DirectoryRepository {
    /// Lists every assignment row joined with its department name.
    fn list_person_assignments(&self) -> RepoResult<Vec<AssignmentRecord>>;
    /// Lists the sheet names granted to one department.
    fn sheets_for_department(&self, department_id: &str) -> RepoResult<Vec<String>>;
}

/// SQLite-backed directory repository.
#[derive(Clone, Copy)]
pub struct SqliteDirectoryRepository<'conn> {
    conn: &'conn Connection,
    has_primary_flag: bool,
}

impl<'conn> SqliteDirectoryRepository<'conn> {
    /// Constructs a repository after checking the tables it reads.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_columns(
            conn,
            "lis_measure_person",
            &[
                "id",
                "project_id",
                "person",
                "measure_person_id",
                "person_department",
            ],
        )?;
        ensure_columns(conn, "sys_dept", &["dept_id", "dept_name"])?;
        ensure_columns(conn, "lis_sheet_control", &["id", "dept_id", "sheet_name"])?;
        let has_primary_flag = table_has_column(conn, "lis_measure_person", "is_primary")?;
        Ok(Self {
            conn,
            has_primary_flag,
        })
    }
}

impl DirectoryRepository for SqliteDirectoryRepository<'_> {
    fn list_person_assignments(&self) -> RepoResult<Vec<AssignmentRecord>> {
        let departments = department_names(self.conn)?;
        let assignments =
            query_assignments(self.conn, self.has_primary_flag, "", [], &departments)?;
        Ok(assignments
            .into_iter()
            .map(|(_, assignment)| assignment)
            .collect())
    }

    fn sheets_for_department(&self, department_id: &str) -> RepoResult<Vec<String>> {
        let key = canonical_key(department_id);
        if key.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT sheet_name
             FROM lis_sheet_control
             WHERE canonical_key(dept_id) = ?1
               AND sheet_name IS NOT NULL
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([key.as_str()])?;
        let mut sheets = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(name) = read_text(row, "sheet_name")? {
                sheets.push(name);
            }
        }
        Ok(sheets)
    }
}

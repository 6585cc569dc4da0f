//! Read-only store adapter over the reference tables.
//!
//! # Responsibility
//! - Define use-case oriented read contracts for the resolvers.
//! - Isolate SQLite query details, including cross-type key joins, from
//!   service orchestration.
//!
//! # Invariants
//! - Repositories never write.
//! - Multi-row reads are ordered by primary key so "first seen" is stable.
//! - Construction verifies required tables and columns up front.
//! - Cross-table matches run in Rust over `canonical_key`: each table is read
//!   once and joined through hash maps.
//! - One malformed cell never fails a whole listing; it degrades to lossy
//!   text or an absent flag.

use crate::db::DbError;
use crate::model::keys::{canonical_key, canonical_real};
use crate::model::records::{AssignmentRecord, MeasurePersonRecord};
use log::warn;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Params, Row};
use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod directory_repo;
pub mod project_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Store-layer error for reference-table reads.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Verifies that `table` exists and carries every listed column.
pub(crate) fn ensure_columns(
    conn: &Connection,
    table: &'static str,
    columns: &[&'static str],
) -> RepoResult<()> {
    if !table_exists(conn, table)? {
        return Err(RepoError::MissingRequiredTable(table));
    }
    for column in columns {
        if !table_has_column(conn, table, column)? {
            return Err(RepoError::MissingRequiredColumn { table, column });
        }
    }
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type IN ('table', 'view') AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Reads a loosely typed column as text.
///
/// Code and id columns hold integers in some deployments and text in others;
/// both render to the same string here.
pub(crate) fn read_text(row: &Row<'_>, column: &str) -> RepoResult<Option<String>> {
    let value = match row.get_ref(column)? {
        ValueRef::Null => None,
        ValueRef::Integer(value) => Some(value.to_string()),
        ValueRef::Real(value) => Some(value.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Some(decode_utf8(column, bytes)),
    };
    Ok(value)
}

/// Reads a loosely typed key column in canonical form.
pub(crate) fn read_key(row: &Row<'_>, column: &str) -> RepoResult<Option<String>> {
    let key = match row.get_ref(column)? {
        ValueRef::Null => None,
        ValueRef::Integer(value) => Some(value.to_string()),
        ValueRef::Real(value) => Some(canonical_real(value)),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(canonical_key(&decode_utf8(column, bytes)))
        }
    };
    Ok(key)
}

/// Reads a nullable 0/1 flag column.
///
/// Unrecognized values read as `None`.
pub(crate) fn read_flag(row: &Row<'_>, column: &str) -> RepoResult<Option<bool>> {
    let flag = match row.get_ref(column)? {
        ValueRef::Null => None,
        ValueRef::Integer(value) => Some(value != 0),
        ValueRef::Real(value) => Some(value != 0.0),
        ValueRef::Text(bytes) => match decode_utf8(column, bytes).trim() {
            "" => None,
            "1" | "true" | "Y" | "y" => Some(true),
            "0" | "false" | "N" | "n" => Some(false),
            other => {
                warn!(
                    "event=repo_read module=repo status=degraded column={} error=unrecognized_flag value={}",
                    column, other
                );
                None
            }
        },
        ValueRef::Blob(_) => {
            warn!(
                "event=repo_read module=repo status=degraded column={} error=blob_flag",
                column
            );
            None
        }
    };
    Ok(flag)
}

fn decode_utf8(column: &str, bytes: &[u8]) -> String {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(text) => text.to_string(),
        Cow::Owned(text) => {
            warn!(
                "event=repo_read module=repo status=degraded column={} error=non_utf8",
                column
            );
            text
        }
    }
}

/// Loads `sys_dept` as canonical department id to name.
///
/// When several rows share a canonical id the first one read wins.
pub(crate) fn department_names(
    conn: &Connection,
) -> RepoResult<HashMap<String, Option<String>>> {
    let mut stmt = conn.prepare("SELECT dept_id, dept_name FROM sys_dept;")?;
    let mut rows = stmt.query([])?;
    let mut names = HashMap::new();
    while let Some(row) = rows.next()? {
        if let Some(key) = read_key(row, "dept_id")? {
            let name = read_text(row, "dept_name")?;
            names.entry(key).or_insert(name);
        }
    }
    Ok(names)
}

/// Reads `lis_measure_person` rows matching `where_clause`, ordered by id,
/// each paired with its department name from `departments`.
///
/// Returns the canonical project key alongside each row.
pub(crate) fn query_assignments<P: Params>(
    conn: &Connection,
    has_primary_flag: bool,
    where_clause: &str,
    params: P,
    departments: &HashMap<String, Option<String>>,
) -> RepoResult<Vec<(Option<String>, AssignmentRecord)>> {
    let primary_column = if has_primary_flag {
        "mp.is_primary"
    } else {
        "NULL"
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT
            mp.id,
            mp.project_id,
            mp.person,
            mp.measure_person_id,
            mp.person_department,
            {primary_column} AS is_primary
         FROM lis_measure_person mp
         {where_clause}
         ORDER BY mp.id ASC;"
    ))?;
    let mut rows = stmt.query(params)?;
    let mut assignments = Vec::new();
    while let Some(row) = rows.next()? {
        let project_key = read_key(row, "project_id")?;
        let department_name = read_key(row, "person_department")?
            .and_then(|key| departments.get(&key).cloned())
            .flatten();
        assignments.push((
            project_key,
            AssignmentRecord {
                person: MeasurePersonRecord {
                    id: row.get("id")?,
                    project_id: read_text(row, "project_id")?,
                    person_name: read_text(row, "person")?,
                    person_id: read_text(row, "measure_person_id")?,
                    department_id: read_text(row, "person_department")?,
                    is_primary: read_flag(row, "is_primary")?,
                },
                department_name,
            },
        ));
    }
    Ok(assignments)
}

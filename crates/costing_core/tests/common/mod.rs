#![allow(dead_code)]

use costing_core::db::open_db_in_memory;
use rusqlite::{params, Connection};

pub fn seeded_db() -> Connection {
    let conn = open_db_in_memory().unwrap();
    insert_dept(&conn, 1, "车身部");
    insert_dept(&conn, 2, "动力部");
    insert_dept(&conn, 3, "底盘部");
    conn
}

pub fn insert_dept(conn: &Connection, dept_id: i64, name: &str) {
    conn.execute(
        "INSERT INTO sys_dept (dept_id, dept_name) VALUES (?1, ?2);",
        params![dept_id, name],
    )
    .unwrap();
}

pub struct Project<'a> {
    pub id: i64,
    pub name: &'a str,
    pub tag: &'a str,
    pub status: &'a str,
    pub brand: Option<&'a str>,
    pub scale: Option<&'a str>,
}

pub fn insert_project(conn: &Connection, project: Project<'_>) {
    conn.execute(
        "INSERT INTO lis_project (id, measures_project, measure_tag, measure_status, brand, sml)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            project.id,
            project.name,
            project.tag,
            project.status,
            project.brand,
            project.scale
        ],
    )
    .unwrap();
}

pub fn project<'a>(id: i64, name: &'a str, tag: &'a str, status: &'a str) -> Project<'a> {
    Project {
        id,
        name,
        tag,
        status,
        brand: None,
        scale: None,
    }
}

pub fn insert_person(
    conn: &Connection,
    id: i64,
    project_id: &str,
    name: &str,
    person_id: &str,
    department: &str,
) {
    insert_person_flagged(conn, id, project_id, name, person_id, department, None);
}

pub fn insert_person_flagged(
    conn: &Connection,
    id: i64,
    project_id: &str,
    name: &str,
    person_id: &str,
    department: &str,
    is_primary: Option<bool>,
) {
    conn.execute(
        "INSERT INTO lis_measure_person
            (id, project_id, person, measure_person_id, person_department, is_primary)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![id, project_id, name, person_id, department, is_primary],
    )
    .unwrap();
}

pub fn insert_order(
    conn: &Connection,
    id: i64,
    project_id: &str,
    order_name: &str,
    power_conf: &str,
    market: &str,
) {
    conn.execute(
        "INSERT INTO lis_project_order (id, project_id, order_name, power_conf, market)
         VALUES (?1, ?2, ?3, ?4, ?5);",
        params![id, project_id, order_name, power_conf, market],
    )
    .unwrap();
}

pub fn insert_sheet(conn: &Connection, id: i64, dept_id: &str, sheet_name: &str) {
    conn.execute(
        "INSERT INTO lis_sheet_control (id, dept_id, sheet_name) VALUES (?1, ?2, ?3);",
        params![id, dept_id, sheet_name],
    )
    .unwrap();
}

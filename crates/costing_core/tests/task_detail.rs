mod common;

use common::{
    insert_order, insert_person, insert_person_flagged, insert_project, insert_sheet, project,
    seeded_db, Project,
};
use costing_core::{
    SchemaProfile, ServiceError, SqliteDirectoryRepository, SqliteProjectRepository,
    TaskDetailService, TaskSelector,
};
use rusqlite::{params, Connection};
use std::sync::Arc;

type Service<'conn> =
    TaskDetailService<SqliteProjectRepository<'conn>, SqliteDirectoryRepository<'conn>>;

fn seed(conn: &Connection) {
    insert_project(
        conn,
        Project {
            brand: Some("10"),
            scale: Some("2"),
            ..project(100, "A车型测算", "0", "20")
        },
    );
    conn.execute(
        "UPDATE lis_project
         SET financial_issuer = ?1, create_time = ?2, update_time = ?3
         WHERE id = 100;",
        params!["财务一部", "2024-03-01 08:30:00", "2024-03-02T09:15:30.123"],
    )
    .unwrap();
    insert_project(
        conn,
        Project {
            brand: Some("99"),
            ..project(77, "无人项目", "0", "20")
        },
    );

    insert_person(conn, 1, "100", "张三", "P1", "1");
    insert_person(conn, 2, "100", "张三", "P1", "2");
    insert_person(conn, 3, "0100", "李四", "P2", "3");

    insert_order(conn, 1, "100", "O-1", "PC-A", "国内");
    insert_order(conn, 2, "100", "O-1", "PC-B", "国内");
    insert_order(conn, 3, "0100", "O-2", "PC-A", "海外");

    insert_sheet(conn, 1, "1", "成本汇总");
    insert_sheet(conn, 2, "01", "材料清单");
    insert_sheet(conn, 3, "2", "动力表");
    insert_sheet(conn, 4, "1", "成本汇总");
}

fn service(conn: &Connection) -> Service<'_> {
    TaskDetailService::new(
        SqliteProjectRepository::try_new(conn).unwrap(),
        SqliteDirectoryRepository::try_new(conn).unwrap(),
        Arc::new(SchemaProfile::default()),
    )
}

#[test]
fn detail_aggregates_distinct_orders_in_first_seen_order() {
    let conn = seeded_db();
    seed(&conn);

    let detail = service(&conn)
        .get_task_detail("100", TaskSelector::default())
        .unwrap();

    assert_eq!(detail.order_info, "O-1,O-2");
    assert_eq!(detail.power_config, "PC-A,PC-B");
    assert_eq!(detail.market, "国内,海外");
}

#[test]
fn detail_without_selector_uses_lowest_assignment() {
    let conn = seeded_db();
    seed(&conn);

    let detail = service(&conn)
        .get_task_detail("100", TaskSelector::default())
        .unwrap();

    assert_eq!(detail.project_id, 100);
    assert_eq!(detail.project_name, "A车型测算");
    assert_eq!(detail.calculator, "张三");
    assert_eq!(detail.department, "车身部");
    assert_eq!(detail.department_id, "1");
    assert_eq!(detail.brand, "自主品牌");
    assert_eq!(detail.scale, "中改款");
    assert_eq!(detail.status, "已下发");
    assert_eq!(detail.financial_issuer, "财务一部");
}

#[test]
fn primary_flag_overrides_lowest_assignment() {
    let conn = seeded_db();
    seed(&conn);
    insert_person_flagged(&conn, 9, "100", "王五", "P5", "2", Some(true));

    let detail = service(&conn)
        .get_task_detail("100", TaskSelector::default())
        .unwrap();

    assert_eq!(detail.person_id, "P5");
    assert_eq!(detail.department, "动力部");
}

#[test]
fn timestamps_are_normalized() {
    let conn = seeded_db();
    seed(&conn);

    let detail = service(&conn)
        .get_task_detail("100", TaskSelector::default())
        .unwrap();

    assert_eq!(detail.created_at, "2024-03-01 08:30:00");
    assert_eq!(detail.updated_at, "2024-03-02 09:15:30");
}

#[test]
fn exact_selector_picks_the_matching_department() {
    let conn = seeded_db();
    seed(&conn);
    let service = service(&conn);

    let by_id = service
        .get_task_detail("100", TaskSelector::exact("P1", "2"))
        .unwrap();
    assert_eq!(by_id.department, "动力部");
    assert_eq!(by_id.visible_sheets, vec!["动力表".to_string()]);

    let by_name = service
        .get_task_detail("100", TaskSelector::exact("张三", "02"))
        .unwrap();
    assert_eq!(by_name.department_id, "2");
}

#[test]
fn exact_selector_miss_is_not_found_instead_of_another_row() {
    let conn = seeded_db();
    seed(&conn);

    let err = service(&conn)
        .get_task_detail("100", TaskSelector::exact("P2", "1"))
        .unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[test]
fn single_disambiguator_is_rejected() {
    let conn = seeded_db();
    seed(&conn);
    let service = service(&conn);

    let only_person = TaskSelector {
        person_id: Some("P1"),
        department_id: None,
    };
    let err = service.get_task_detail("100", only_person).unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let blank_person = TaskSelector {
        person_id: Some("  "),
        department_id: Some("1"),
    };
    let err = service.get_task_detail("100", blank_person).unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[test]
fn padded_task_id_resolves_the_same_project() {
    let conn = seeded_db();
    seed(&conn);

    let detail = service(&conn)
        .get_task_detail(" 0100 ", TaskSelector::default())
        .unwrap();

    assert_eq!(detail.project_id, 100);
}

#[test]
fn unknown_or_blank_task_is_not_found() {
    let conn = seeded_db();
    seed(&conn);
    let service = service(&conn);

    for task_id in ["4040", "abc", "   "] {
        let err = service
            .get_task_detail(task_id, TaskSelector::default())
            .unwrap_err();
        assert!(
            matches!(err, ServiceError::NotFound(_)),
            "task `{task_id}` should be not found"
        );
    }
}

#[test]
fn project_without_persons_resolves_with_empty_person_fields() {
    let conn = seeded_db();
    seed(&conn);

    let detail = service(&conn)
        .get_task_detail("77", TaskSelector::default())
        .unwrap();

    assert_eq!(detail.project_name, "无人项目");
    assert_eq!(detail.calculator, "");
    assert_eq!(detail.person_id, "");
    assert_eq!(detail.department, "");
    assert_eq!(detail.brand, "99");
    assert_eq!(detail.scale, "");
    assert_eq!(detail.order_info, "");
    assert_eq!(detail.created_at, "");
    assert!(detail.visible_sheets.is_empty());
}

#[test]
fn visible_sheets_keep_repeated_grants_in_order() {
    let conn = seeded_db();
    seed(&conn);

    let detail = service(&conn)
        .get_task_detail("100", TaskSelector::default())
        .unwrap();

    assert_eq!(
        detail.visible_sheets,
        vec![
            "成本汇总".to_string(),
            "材料清单".to_string(),
            "成本汇总".to_string()
        ]
    );
}

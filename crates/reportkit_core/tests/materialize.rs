use chrono::NaiveDate;
use reportkit_core::{
    open_db, open_db_in_memory, Axis, EntityRef, MaterializeOptions, MaterializeSummary,
    NewEntry, NewGroup, NewReport, NewTable, ReportRepository, ReportService, ReportServiceOptions,
    ServiceError, SqliteReportRepository, SqliteTemplateRepository, TemplateService,
    DEFAULT_CELL_VALUE,
};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::thread;
use uuid::Uuid;

type Reports<'conn> = ReportService<SqliteTemplateRepository<'conn>, SqliteReportRepository<'conn>>;

struct Q1 {
    template: Uuid,
    table: Uuid,
    a: Uuid,
    b: Uuid,
    x: Uuid,
    y: Uuid,
}

fn templates(conn: &Connection) -> TemplateService<SqliteTemplateRepository<'_>> {
    TemplateService::new(SqliteTemplateRepository::try_new(conn).unwrap())
}

fn reports(conn: &Connection, options: MaterializeOptions) -> Reports<'_> {
    ReportService::with_options(
        SqliteTemplateRepository::try_new(conn).unwrap(),
        SqliteReportRepository::try_new(conn).unwrap(),
        ReportServiceOptions {
            materialize: options,
            ..ReportServiceOptions::default()
        },
    )
}

fn entry(conn: &Connection, table: Uuid, axis: Axis, title: &str) -> Uuid {
    templates(conn)
        .create_entry(&NewEntry::ungrouped(table, axis, title))
        .unwrap()
        .uuid
}

/// Template T, table Q1, rows {A, B}, columns {X, Y}.
fn q1(conn: &Connection) -> Q1 {
    let service = templates(conn);
    let template = service.create_template("T", None).unwrap().uuid;
    let table = service
        .create_table(&NewTable {
            template_uuid: template,
            title: "Q1".to_string(),
            description: None,
            order: None,
        })
        .unwrap()
        .uuid;
    Q1 {
        template,
        table,
        a: entry(conn, table, Axis::Row, "A"),
        b: entry(conn, table, Axis::Row, "B"),
        x: entry(conn, table, Axis::Column, "X"),
        y: entry(conn, table, Axis::Column, "Y"),
    }
}

fn new_report(template: Uuid) -> NewReport {
    NewReport {
        template_uuid: template,
        date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        owner: Some("auditor".to_string()),
    }
}

fn pairs(cells: &[reportkit_core::Cell]) -> BTreeSet<(Uuid, Uuid)> {
    cells
        .iter()
        .map(|cell| (cell.row_uuid, cell.column_uuid))
        .collect()
}

#[test]
fn create_report_materializes_the_full_cross_product() {
    let conn = open_db_in_memory().unwrap();
    let q1 = q1(&conn);
    let service = reports(&conn, MaterializeOptions::default());

    let created = service.create_report(&new_report(q1.template)).unwrap();
    assert_eq!(
        created.materialized,
        MaterializeSummary {
            tables: 1,
            pairs: 4,
            created: 4,
            existing: 0,
        }
    );

    let cells = service.get_report_data(created.report.uuid).unwrap();
    assert_eq!(cells.len(), 4);
    assert_eq!(
        pairs(&cells),
        BTreeSet::from([(q1.a, q1.x), (q1.a, q1.y), (q1.b, q1.x), (q1.b, q1.y)])
    );
    assert!(cells
        .iter()
        .all(|cell| cell.value.as_deref() == Some(DEFAULT_CELL_VALUE)));

    let again = service.materialize(created.report.uuid).unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(again.existing, 4);
    assert_eq!(service.get_report_data(created.report.uuid).unwrap(), cells);
}

#[test]
fn rematerializing_keeps_edited_values() {
    let conn = open_db_in_memory().unwrap();
    let q1 = q1(&conn);
    let service = reports(&conn, MaterializeOptions::default());
    let report = service.create_report(&new_report(q1.template)).unwrap().report;

    service
        .update_cell(report.uuid, q1.b, q1.y, Some("42"))
        .unwrap();
    service.materialize(report.uuid).unwrap();
    service.materialize(report.uuid).unwrap();

    let cells = service.get_report_data(report.uuid).unwrap();
    assert_eq!(cells.len(), 4);
    let edited = cells
        .iter()
        .find(|cell| cell.row_uuid == q1.b && cell.column_uuid == q1.y)
        .unwrap();
    assert_eq!(edited.value.as_deref(), Some("42"));
}

#[test]
fn every_table_and_nested_leaf_is_covered() {
    let conn = open_db_in_memory().unwrap();
    let q1 = q1(&conn);
    let authoring = templates(&conn);

    let group = authoring
        .create_group(&NewGroup {
            table_uuid: q1.table,
            axis: Axis::Row,
            parent_uuid: None,
            title: "Group".to_string(),
            order: None,
        })
        .unwrap();
    let nested = authoring
        .create_group(&NewGroup {
            table_uuid: q1.table,
            axis: Axis::Row,
            parent_uuid: Some(group.uuid),
            title: "Nested".to_string(),
            order: None,
        })
        .unwrap();
    authoring
        .create_entry(&NewEntry::in_group(q1.table, Axis::Row, nested.uuid, "deep"))
        .unwrap();

    let q2 = authoring
        .create_table(&NewTable {
            template_uuid: q1.template,
            title: "Q2".to_string(),
            description: None,
            order: None,
        })
        .unwrap();
    for title in ["r1", "r2", "r3"] {
        entry(&conn, q2.uuid, Axis::Row, title);
    }
    entry(&conn, q2.uuid, Axis::Column, "c1");

    // A table with no columns contributes no pairs.
    let empty = authoring
        .create_table(&NewTable {
            template_uuid: q1.template,
            title: "Empty".to_string(),
            description: None,
            order: None,
        })
        .unwrap();
    entry(&conn, empty.uuid, Axis::Row, "lonely");

    let service = reports(&conn, MaterializeOptions::default());
    let created = service.create_report(&new_report(q1.template)).unwrap();
    assert_eq!(created.materialized.tables, 3);
    assert_eq!(created.materialized.pairs, 3 * 2 + 3);
    assert_eq!(created.materialized.created, 9);
    assert_eq!(
        service.get_report_data(created.report.uuid).unwrap().len(),
        9
    );
}

#[test]
fn deactivated_or_moved_leaves_keep_their_cells() {
    let conn = open_db_in_memory().unwrap();
    let q1 = q1(&conn);
    let authoring = templates(&conn);
    let service = reports(&conn, MaterializeOptions::default());
    let report = service.create_report(&new_report(q1.template)).unwrap().report;
    service
        .update_cell(report.uuid, q1.a, q1.x, Some("7"))
        .unwrap();

    authoring.set_entry_active(Axis::Row, q1.a, false).unwrap();
    let group = authoring
        .create_group(&NewGroup {
            table_uuid: q1.table,
            axis: Axis::Column,
            parent_uuid: None,
            title: "Moved".to_string(),
            order: None,
        })
        .unwrap();
    authoring
        .move_entry(Axis::Column, q1.y, Some(group.uuid))
        .unwrap();

    let filtered = reports(
        &conn,
        MaterializeOptions {
            active_only: true,
            ..MaterializeOptions::default()
        },
    );
    let summary = filtered.materialize(report.uuid).unwrap();
    assert_eq!(summary.pairs, 2);
    assert_eq!(summary.created, 0);

    let cells = service.get_report_data(report.uuid).unwrap();
    assert_eq!(cells.len(), 4);
    let kept = cells
        .iter()
        .find(|cell| cell.row_uuid == q1.a && cell.column_uuid == q1.x)
        .unwrap();
    assert_eq!(kept.value.as_deref(), Some("7"));

    // Schema refuses to drop a leaf that still has cells.
    let deleted = conn.execute(
        "DELETE FROM row_entries WHERE entry_uuid = ?1;",
        [q1.a.to_string()],
    );
    assert!(deleted.is_err());
    assert_eq!(service.get_report_data(report.uuid).unwrap().len(), 4);
}

#[test]
fn active_only_skips_inactive_leaves_for_new_reports() {
    let conn = open_db_in_memory().unwrap();
    let q1 = q1(&conn);
    templates(&conn)
        .set_entry_active(Axis::Column, q1.y, false)
        .unwrap();

    let unfiltered = reports(&conn, MaterializeOptions::default());
    let all = unfiltered.create_report(&new_report(q1.template)).unwrap();
    assert_eq!(all.materialized.created, 4);

    let filtered = reports(
        &conn,
        MaterializeOptions {
            active_only: true,
            ..MaterializeOptions::default()
        },
    );
    let some = filtered.create_report(&new_report(q1.template)).unwrap();
    assert_eq!(some.materialized.created, 2);
    assert_eq!(
        pairs(&filtered.get_report_data(some.report.uuid).unwrap()),
        BTreeSet::from([(q1.a, q1.x), (q1.b, q1.x)])
    );
}

#[test]
fn leaves_added_later_are_backfilled_on_demand() {
    let conn = open_db_in_memory().unwrap();
    let q1 = q1(&conn);
    let service = reports(&conn, MaterializeOptions::default());
    let report = service.create_report(&new_report(q1.template)).unwrap().report;

    let c = entry(&conn, q1.table, Axis::Row, "C");
    let grid = service.get_report_grid(report.uuid).unwrap();
    assert_eq!(grid.len(), 1);
    assert_eq!(grid[0].rows.len(), 3);
    assert_eq!(grid[0].values[2], vec![None, None]);
    assert_eq!(
        grid[0].values[0],
        vec![
            Some(DEFAULT_CELL_VALUE.to_string()),
            Some(DEFAULT_CELL_VALUE.to_string())
        ]
    );

    let summary = service.materialize(report.uuid).unwrap();
    assert_eq!((summary.created, summary.existing), (2, 4));
    let cells = service.get_report_data(report.uuid).unwrap();
    assert!(pairs(&cells).contains(&(c, q1.y)));
}

#[test]
fn entries_inside_a_persisted_group_cycle_still_get_cells() {
    let conn = open_db_in_memory().unwrap();
    let q1 = q1(&conn);
    let authoring = templates(&conn);
    let outer = authoring
        .create_group(&NewGroup {
            table_uuid: q1.table,
            axis: Axis::Row,
            parent_uuid: None,
            title: "outer".to_string(),
            order: None,
        })
        .unwrap()
        .uuid;
    let inner = authoring
        .create_group(&NewGroup {
            table_uuid: q1.table,
            axis: Axis::Row,
            parent_uuid: Some(outer),
            title: "inner".to_string(),
            order: None,
        })
        .unwrap()
        .uuid;
    let c = authoring
        .create_entry(&NewEntry::in_group(q1.table, Axis::Row, inner, "C"))
        .unwrap()
        .uuid;

    // Close the loop outer -> inner -> outer directly in storage.
    conn.execute(
        "UPDATE row_groups SET parent_uuid = ?1 WHERE group_uuid = ?2;",
        [inner.to_string(), outer.to_string()],
    )
    .unwrap();

    let service = reports(&conn, MaterializeOptions::default());
    let created = service.create_report(&new_report(q1.template)).unwrap();
    assert_eq!(created.materialized.pairs, 6);
    assert_eq!(created.materialized.created, 6);

    let cells = service.get_report_data(created.report.uuid).unwrap();
    let for_c: BTreeSet<(Uuid, Uuid)> = pairs(&cells)
        .into_iter()
        .filter(|(row, _)| *row == c)
        .collect();
    assert_eq!(for_c, BTreeSet::from([(c, q1.x), (c, q1.y)]));

    // The grid lists the stranded leaf after the reachable ones.
    let grid = service.get_report_grid(created.report.uuid).unwrap();
    let rows: Vec<Uuid> = grid[0].rows.iter().map(|row| row.uuid).collect();
    assert_eq!(rows, vec![q1.a, q1.b, c]);
    assert_eq!(
        grid[0].values[2],
        vec![
            Some(DEFAULT_CELL_VALUE.to_string()),
            Some(DEFAULT_CELL_VALUE.to_string())
        ]
    );

    let leaves: Vec<Uuid> = authoring
        .list_axis_entries(q1.table, Axis::Row)
        .unwrap()
        .into_iter()
        .map(|leaf| leaf.uuid)
        .collect();
    assert_eq!(leaves, rows);
}

#[test]
fn oversized_tables_fail_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let q1 = q1(&conn);
    let big = templates(&conn)
        .create_table(&NewTable {
            template_uuid: q1.template,
            title: "Big".to_string(),
            description: None,
            order: None,
        })
        .unwrap();
    for index in 0..3 {
        entry(&conn, big.uuid, Axis::Row, &format!("r{index}"));
        entry(&conn, big.uuid, Axis::Column, &format!("c{index}"));
    }

    let bounded = reports(
        &conn,
        MaterializeOptions {
            max_pairs_per_table: Some(4),
            ..MaterializeOptions::default()
        },
    );
    let err = bounded.create_report(&new_report(q1.template)).unwrap_err();
    match err {
        ServiceError::MatrixTooLarge {
            table,
            pairs,
            limit,
        } => {
            assert_eq!(table, big.uuid);
            assert_eq!(pairs, 9);
            assert_eq!(limit, 4);
        }
        other => panic!("unexpected error: {other}"),
    }

    // The report row exists, but Q1 was not half-written either.
    let report = bounded.list_reports(Some(q1.template)).unwrap().remove(0);
    assert!(bounded.get_report_data(report.uuid).unwrap().is_empty());

    let unbounded = reports(&conn, MaterializeOptions::default());
    let summary = unbounded.materialize(report.uuid).unwrap();
    assert_eq!(summary.created, 4 + 9);
}

#[test]
fn missing_template_or_report_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = reports(&conn, MaterializeOptions::default());

    let template = Uuid::new_v4();
    assert!(matches!(
        service.create_report(&new_report(template)),
        Err(ServiceError::NotFound(EntityRef::Template(id))) if id == template
    ));
    let report = Uuid::new_v4();
    assert!(matches!(
        service.materialize(report),
        Err(ServiceError::NotFound(EntityRef::Report(id))) if id == report
    ));
    assert!(service.list_reports(None).unwrap().is_empty());
}

#[test]
fn concurrent_materialization_creates_each_cell_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cells.sqlite3");
    let report = {
        let conn = open_db(&path).unwrap();
        let q1 = q1(&conn);
        // Insert the report row without the initial materialization.
        SqliteReportRepository::try_new(&conn)
            .unwrap()
            .create_report(&new_report(q1.template))
            .unwrap()
            .uuid
    };

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let summary = reports(&conn, MaterializeOptions::default())
                    .materialize(report)
                    .unwrap();
                summary
            })
        })
        .collect();
    let summaries: Vec<MaterializeSummary> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();

    assert_eq!(summaries.iter().map(|s| s.created).sum::<usize>(), 4);
    assert_eq!(summaries.iter().map(|s| s.existing).sum::<usize>(), 12);

    let conn = open_db(&path).unwrap();
    let cells = reports(&conn, MaterializeOptions::default())
        .get_report_data(report)
        .unwrap();
    assert_eq!(cells.len(), 4);
}

use chrono::NaiveDate;
use reportkit_core::{
    open_db_in_memory, Axis, EntityRef, NewEntry, NewReport, NewTable, ReportPatch,
    ReportService, ReportServiceOptions, ReportStatus, ServiceError, SqliteReportRepository,
    SqliteTemplateRepository, StatusPolicy, TemplateService,
};
use rusqlite::Connection;
use uuid::Uuid;

type Reports<'conn> = ReportService<SqliteTemplateRepository<'conn>, SqliteReportRepository<'conn>>;

struct Fixture {
    template: Uuid,
    row: Uuid,
    column: Uuid,
}

fn reports(conn: &Connection, status_policy: StatusPolicy) -> Reports<'_> {
    ReportService::with_options(
        SqliteTemplateRepository::try_new(conn).unwrap(),
        SqliteReportRepository::try_new(conn).unwrap(),
        ReportServiceOptions {
            status_policy,
            ..ReportServiceOptions::default()
        },
    )
}

/// One table with a single row and a single column.
fn fixture(conn: &Connection) -> Fixture {
    let service = TemplateService::new(SqliteTemplateRepository::try_new(conn).unwrap());
    let template = service.create_template("Monthly", None).unwrap().uuid;
    let table = service
        .create_table(&NewTable {
            template_uuid: template,
            title: "Totals".to_string(),
            description: None,
            order: None,
        })
        .unwrap()
        .uuid;
    let row = service
        .create_entry(&NewEntry::ungrouped(table, Axis::Row, "Employees"))
        .unwrap()
        .uuid;
    let column = service
        .create_entry(&NewEntry::ungrouped(table, Axis::Column, "Count"))
        .unwrap()
        .uuid;
    Fixture {
        template,
        row,
        column,
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
}

fn create(service: &Reports<'_>, template: Uuid, day: u32) -> Uuid {
    service
        .create_report(&NewReport {
            template_uuid: template,
            date: date(day),
            owner: None,
        })
        .unwrap()
        .report
        .uuid
}

#[test]
fn new_reports_start_as_draft_and_accept_edits() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let service = reports(&conn, StatusPolicy::default());
    let report = create(&service, fx.template, 1);

    assert_eq!(service.get_report(report).unwrap().status, ReportStatus::Draft);
    let cell = service
        .update_cell(report, fx.row, fx.column, Some("15"))
        .unwrap();
    assert_eq!(cell.value.as_deref(), Some("15"));

    let cleared = service.update_cell(report, fx.row, fx.column, None).unwrap();
    assert_eq!(cleared.value, None);
    let grid = service.get_report_grid(report).unwrap();
    assert_eq!(grid[0].values, vec![vec![None]]);
}

#[test]
fn cells_are_frozen_outside_draft() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let service = reports(&conn, StatusPolicy::default());
    let report = create(&service, fx.template, 1);
    service
        .update_cell(report, fx.row, fx.column, Some("15"))
        .unwrap();

    for status in [ReportStatus::ForApproval, ReportStatus::Approved] {
        service
            .update_report(report, &ReportPatch::status(status))
            .unwrap();
        let err = service
            .update_cell(report, fx.row, fx.column, Some("99"))
            .unwrap_err();
        match err {
            ServiceError::StateConflict {
                report: rejected,
                status: current,
            } => {
                assert_eq!(rejected, report);
                assert_eq!(current, status);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    let cells = service.get_report_data(report).unwrap();
    assert_eq!(cells[0].value.as_deref(), Some("15"));

    // Unrestricted policy lets the report go straight back to draft.
    service
        .update_report(report, &ReportPatch::status(ReportStatus::Draft))
        .unwrap();
    service
        .update_cell(report, fx.row, fx.column, Some("16"))
        .unwrap();
}

#[test]
fn unrestricted_policy_allows_skips_and_rollbacks() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let service = reports(&conn, StatusPolicy::Unrestricted);
    let report = create(&service, fx.template, 1);

    let approved = service
        .update_report(report, &ReportPatch::status(ReportStatus::Approved))
        .unwrap();
    assert_eq!(approved.status, ReportStatus::Approved);
    let back = service
        .update_report(report, &ReportPatch::status(ReportStatus::Draft))
        .unwrap();
    assert_eq!(back.status, ReportStatus::Draft);
}

#[test]
fn forward_only_policy_rejects_skips_and_rollbacks() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let service = reports(&conn, StatusPolicy::ForwardOnly);
    let report = create(&service, fx.template, 1);

    let err = service
        .update_report(report, &ReportPatch::status(ReportStatus::Approved))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::InvalidTransition {
            from: ReportStatus::Draft,
            to: ReportStatus::Approved,
        }
    ));
    assert_eq!(service.get_report(report).unwrap().status, ReportStatus::Draft);

    service
        .update_report(report, &ReportPatch::status(ReportStatus::ForApproval))
        .unwrap();
    // Writing the current status again is a no-op, not a transition.
    service
        .update_report(report, &ReportPatch::status(ReportStatus::ForApproval))
        .unwrap();
    let err = service
        .update_report(report, &ReportPatch::status(ReportStatus::Draft))
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));

    let approved = service
        .update_report(report, &ReportPatch::status(ReportStatus::Approved))
        .unwrap();
    assert_eq!(approved.status, ReportStatus::Approved);

    // Non-status fields are still editable.
    let moved = service
        .update_report(
            report,
            &ReportPatch {
                date: Some(date(31)),
                ..ReportPatch::default()
            },
        )
        .unwrap();
    assert_eq!(moved.date, date(31));
    assert_eq!(moved.status, ReportStatus::Approved);
}

#[test]
fn missing_report_or_cell_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let service = reports(&conn, StatusPolicy::default());
    let report = create(&service, fx.template, 1);

    let ghost = Uuid::new_v4();
    assert!(matches!(
        service.update_cell(ghost, fx.row, fx.column, Some("1")),
        Err(ServiceError::NotFound(EntityRef::Report(id))) if id == ghost
    ));
    assert!(matches!(
        service.get_report_data(ghost),
        Err(ServiceError::NotFound(EntityRef::Report(_)))
    ));
    assert!(matches!(
        service.update_report(ghost, &ReportPatch::status(ReportStatus::Approved)),
        Err(ServiceError::NotFound(EntityRef::Report(_)))
    ));

    // Swapped axes never name a materialized cell.
    assert!(matches!(
        service.update_cell(report, fx.column, fx.row, Some("1")),
        Err(ServiceError::NotFound(EntityRef::Cell { .. }))
    ));
}

#[test]
fn report_fields_are_patched_and_listed_by_date() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let service = reports(&conn, StatusPolicy::default());
    let later = create(&service, fx.template, 20);
    let earlier = create(&service, fx.template, 5);

    let listed: Vec<Uuid> = service
        .list_reports(Some(fx.template))
        .unwrap()
        .into_iter()
        .map(|report| report.uuid)
        .collect();
    assert_eq!(listed, vec![earlier, later]);
    assert!(service.list_reports(Some(Uuid::new_v4())).unwrap().is_empty());

    let owned = service
        .update_report(
            later,
            &ReportPatch {
                owner: Some(Some("  hr-team ".to_string())),
                ..ReportPatch::default()
            },
        )
        .unwrap();
    assert_eq!(owned.owner.as_deref(), Some("hr-team"));
    assert_eq!(owned.status, ReportStatus::Draft);

    let cleared = service
        .update_report(
            later,
            &ReportPatch {
                owner: Some(None),
                ..ReportPatch::default()
            },
        )
        .unwrap();
    assert_eq!(cleared.owner, None);

    let unchanged = service.update_report(later, &ReportPatch::default()).unwrap();
    assert_eq!(unchanged, cleared);
}

#[test]
fn grid_and_data_serialize_for_callers() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let service = reports(&conn, StatusPolicy::default());
    let report = create(&service, fx.template, 1);
    service
        .update_cell(report, fx.row, fx.column, Some("3"))
        .unwrap();

    let grid = serde_json::to_value(service.get_report_grid(report).unwrap()).unwrap();
    assert_eq!(grid[0]["table"]["title"], "Totals");
    assert_eq!(grid[0]["rows"][0]["title"], "Employees");
    assert_eq!(grid[0]["columns"][0]["title"], "Count");
    assert_eq!(grid[0]["values"][0][0], "3");

    let data = serde_json::to_value(service.get_report_data(report).unwrap()).unwrap();
    assert_eq!(data[0]["value"], "3");

    let report = serde_json::to_value(service.get_report(report).unwrap()).unwrap();
    assert_eq!(report["status"], "draft");
    assert_eq!(report["date"], "2025-03-01");
}

//! Report and cell repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist report instances and their materialized cells.
//! - Own the `(report, row, column)` uniqueness safety net for cell creation.
//! - Apply the draft gate and the cell write in one transaction, and the
//!   status policy and the report write in another.
//!
//! # Invariants
//! - Cell inserts never overwrite an existing value; conflicts are no-ops.
//! - Cells are never deleted by this repository.
//! - A cell value changes only while its report status is `draft`.

use crate::model::report::{
    Cell, NewReport, Report, ReportId, ReportPatch, ReportStatus, StatusPolicy,
    DEFAULT_CELL_VALUE,
};
use crate::model::template::{EntryId, TemplateId};
use crate::repo::{ensure_connection_ready, parse_uuid, EntityRef, RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const REPORT_SELECT_SQL: &str = "SELECT
    report_uuid,
    template_uuid,
    report_date,
    owner,
    status,
    created_at,
    updated_at
FROM reports";

const CELL_SELECT_SQL: &str = "SELECT
    cell_uuid,
    report_uuid,
    row_uuid,
    column_uuid,
    value
FROM report_cells";

const REQUIRED_TABLES: &[&str] = &["reports", "report_cells"];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Counts produced by one batch of idempotent cell inserts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnsureCellsOutcome {
    /// Cells inserted by this call.
    pub created: usize,
    /// Pairs that already had a cell (including ones inserted concurrently).
    pub existing: usize,
}

/// Result of a gated cell write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellWrite {
    /// The report was a draft and the value was stored.
    Updated(Cell),
    /// The report status does not allow edits; nothing was written.
    Frozen(ReportStatus),
}

/// Result of a policy-checked report update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportWrite {
    Updated(Report),
    /// The status change is not permitted by the policy; nothing was written.
    Rejected {
        from: ReportStatus,
        to: ReportStatus,
    },
}

/// Repository interface for reports and their cells.
pub trait ReportRepository {
    fn create_report(&self, input: &NewReport) -> RepoResult<Report>;
    fn get_report(&self, report_uuid: ReportId) -> RepoResult<Option<Report>>;
    /// Lists reports ordered by date, then creation time.
    fn list_reports(&self, template_uuid: Option<TemplateId>) -> RepoResult<Vec<Report>>;
    /// Applies a partial update if `policy` permits its status change.
    fn update_report(
        &self,
        report_uuid: ReportId,
        patch: &ReportPatch,
        policy: StatusPolicy,
    ) -> RepoResult<ReportWrite>;

    /// Inserts a default-valued cell for every pair that has none yet.
    fn ensure_cells(
        &self,
        report_uuid: ReportId,
        pairs: &[(EntryId, EntryId)],
    ) -> RepoResult<EnsureCellsOutcome>;
    /// Lists all cells of one report in creation order.
    fn list_cells(&self, report_uuid: ReportId) -> RepoResult<Vec<Cell>>;
    fn get_cell(
        &self,
        report_uuid: ReportId,
        row_uuid: EntryId,
        column_uuid: EntryId,
    ) -> RepoResult<Option<Cell>>;
    /// Writes one cell value if and only if the report is a draft.
    fn update_draft_cell(
        &self,
        report_uuid: ReportId,
        row_uuid: EntryId,
        column_uuid: EntryId,
        value: Option<&str>,
    ) -> RepoResult<CellWrite>;
}

/// SQLite-backed report repository.
pub struct SqliteReportRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReportRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl ReportRepository for SqliteReportRepository<'_> {
    fn create_report(&self, input: &NewReport) -> RepoResult<Report> {
        let report_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO reports (report_uuid, template_uuid, report_date, owner, status)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                report_uuid.to_string(),
                input.template_uuid.to_string(),
                input.date.format(DATE_FORMAT).to_string(),
                input.owner.as_deref(),
                ReportStatus::Draft.as_str(),
            ],
        )?;
        load_report(self.conn, report_uuid)?
            .ok_or(RepoError::NotFound(EntityRef::Report(report_uuid)))
    }

    fn get_report(&self, report_uuid: ReportId) -> RepoResult<Option<Report>> {
        load_report(self.conn, report_uuid)
    }

    fn list_reports(&self, template_uuid: Option<TemplateId>) -> RepoResult<Vec<Report>> {
        let mut items = Vec::new();
        match template_uuid {
            Some(template_uuid) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{REPORT_SELECT_SQL}
                     WHERE template_uuid = ?1
                     ORDER BY report_date ASC, created_at ASC, report_uuid ASC;"
                ))?;
                let mut rows = stmt.query([template_uuid.to_string()])?;
                while let Some(row) = rows.next()? {
                    items.push(parse_report_row(row)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "{REPORT_SELECT_SQL}
                     ORDER BY report_date ASC, created_at ASC, report_uuid ASC;"
                ))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    items.push(parse_report_row(row)?);
                }
            }
        }
        Ok(items)
    }

    fn update_report(
        &self,
        report_uuid: ReportId,
        patch: &ReportPatch,
        policy: StatusPolicy,
    ) -> RepoResult<ReportWrite> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_report(&tx, report_uuid)?
            .ok_or(RepoError::NotFound(EntityRef::Report(report_uuid)))?;

        let status = patch.status.unwrap_or(current.status);
        if !policy.permits(current.status, status) {
            return Ok(ReportWrite::Rejected {
                from: current.status,
                to: status,
            });
        }
        let date = patch.date.unwrap_or(current.date);
        let owner = match &patch.owner {
            Some(value) => value.clone(),
            None => current.owner.clone(),
        };

        tx.execute(
            "UPDATE reports
             SET status = ?2,
                 report_date = ?3,
                 owner = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE report_uuid = ?1;",
            params![
                report_uuid.to_string(),
                status.as_str(),
                date.format(DATE_FORMAT).to_string(),
                owner.as_deref(),
            ],
        )?;
        tx.commit()?;

        load_report(self.conn, report_uuid)?
            .map(ReportWrite::Updated)
            .ok_or(RepoError::NotFound(EntityRef::Report(report_uuid)))
    }

    fn ensure_cells(
        &self,
        report_uuid: ReportId,
        pairs: &[(EntryId, EntryId)],
    ) -> RepoResult<EnsureCellsOutcome> {
        let mut outcome = EnsureCellsOutcome::default();
        if pairs.is_empty() {
            return Ok(outcome);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO report_cells (cell_uuid, report_uuid, row_uuid, column_uuid, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (report_uuid, row_uuid, column_uuid) DO NOTHING;",
            )?;
            let report_text = report_uuid.to_string();
            for (row_uuid, column_uuid) in pairs {
                let inserted = stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    report_text.as_str(),
                    row_uuid.to_string(),
                    column_uuid.to_string(),
                    DEFAULT_CELL_VALUE,
                ])?;
                if inserted == 0 {
                    outcome.existing += 1;
                } else {
                    outcome.created += 1;
                }
            }
        }
        tx.commit()?;

        Ok(outcome)
    }

    fn list_cells(&self, report_uuid: ReportId) -> RepoResult<Vec<Cell>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CELL_SELECT_SQL}
             WHERE report_uuid = ?1
             ORDER BY rowid ASC;"
        ))?;
        let mut rows = stmt.query([report_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_cell_row(row)?);
        }
        Ok(items)
    }

    fn get_cell(
        &self,
        report_uuid: ReportId,
        row_uuid: EntryId,
        column_uuid: EntryId,
    ) -> RepoResult<Option<Cell>> {
        load_cell(self.conn, report_uuid, row_uuid, column_uuid)
    }

    fn update_draft_cell(
        &self,
        report_uuid: ReportId,
        row_uuid: EntryId,
        column_uuid: EntryId,
        value: Option<&str>,
    ) -> RepoResult<CellWrite> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let status_text: Option<String> = tx
            .query_row(
                "SELECT status FROM reports WHERE report_uuid = ?1;",
                [report_uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let status = match status_text {
            None => return Err(RepoError::NotFound(EntityRef::Report(report_uuid))),
            Some(text) => parse_status(&text)?,
        };
        if !status.allows_cell_edit() {
            return Ok(CellWrite::Frozen(status));
        }

        let changed = tx.execute(
            "UPDATE report_cells
             SET value = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE report_uuid = ?1
               AND row_uuid = ?2
               AND column_uuid = ?3;",
            params![
                report_uuid.to_string(),
                row_uuid.to_string(),
                column_uuid.to_string(),
                value,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Cell {
                report: report_uuid,
                row: row_uuid,
                column: column_uuid,
            }));
        }
        tx.commit()?;

        load_cell(self.conn, report_uuid, row_uuid, column_uuid)?
            .map(CellWrite::Updated)
            .ok_or(RepoError::NotFound(EntityRef::Cell {
                report: report_uuid,
                row: row_uuid,
                column: column_uuid,
            }))
    }
}

fn load_report(conn: &Connection, report_uuid: ReportId) -> RepoResult<Option<Report>> {
    let mut stmt = conn.prepare(&format!("{REPORT_SELECT_SQL} WHERE report_uuid = ?1;"))?;
    let mut rows = stmt.query([report_uuid.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_report_row(row)?));
    }
    Ok(None)
}

fn load_cell(
    conn: &Connection,
    report_uuid: ReportId,
    row_uuid: EntryId,
    column_uuid: EntryId,
) -> RepoResult<Option<Cell>> {
    let mut stmt = conn.prepare(&format!(
        "{CELL_SELECT_SQL}
         WHERE report_uuid = ?1
           AND row_uuid = ?2
           AND column_uuid = ?3;"
    ))?;
    let mut rows = stmt.query(params![
        report_uuid.to_string(),
        row_uuid.to_string(),
        column_uuid.to_string(),
    ])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_cell_row(row)?));
    }
    Ok(None)
}

fn parse_report_row(row: &Row<'_>) -> RepoResult<Report> {
    let uuid_text: String = row.get("report_uuid")?;
    let template_text: String = row.get("template_uuid")?;
    let date_text: String = row.get("report_date")?;
    let status_text: String = row.get("status")?;

    let date = NaiveDate::parse_from_str(&date_text, DATE_FORMAT).map_err(|_| {
        RepoError::InvalidData(format!("invalid date `{date_text}` in reports.report_date"))
    })?;

    Ok(Report {
        uuid: parse_uuid(&uuid_text, "reports.report_uuid")?,
        template_uuid: parse_uuid(&template_text, "reports.template_uuid")?,
        date,
        owner: row.get("owner")?,
        status: parse_status(&status_text)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_cell_row(row: &Row<'_>) -> RepoResult<Cell> {
    let uuid_text: String = row.get("cell_uuid")?;
    let report_text: String = row.get("report_uuid")?;
    let row_text: String = row.get("row_uuid")?;
    let column_text: String = row.get("column_uuid")?;
    Ok(Cell {
        uuid: parse_uuid(&uuid_text, "report_cells.cell_uuid")?,
        report_uuid: parse_uuid(&report_text, "report_cells.report_uuid")?,
        row_uuid: parse_uuid(&row_text, "report_cells.row_uuid")?,
        column_uuid: parse_uuid(&column_text, "report_cells.column_uuid")?,
        value: row.get("value")?,
    })
}

fn parse_status(value: &str) -> RepoResult<ReportStatus> {
    ReportStatus::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid report status `{value}` in reports.status"))
    })
}

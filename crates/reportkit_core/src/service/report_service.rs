//! Report lifecycle service.
//!
//! # Responsibility
//! - Create reports and run the first materialization.
//! - Gate cell edits on draft status and status writes on [`StatusPolicy`].
//! - Project stored cells onto the template structure as per-table grids.
//!
//! # Invariants
//! - A rejected cell edit or status change writes nothing.
//! - Materialization is also exposed on its own for repair and backfill.

use crate::model::report::{Cell, NewReport, Report, ReportId, ReportPatch, StatusPolicy};
use crate::model::template::{Axis, EntryId, TableTemplate, TemplateId};
use crate::repo::report_repo::{CellWrite, ReportRepository, ReportWrite};
use crate::repo::template_repo::TemplateRepository;
use crate::repo::EntityRef;
use crate::service::materializer::{
    leaf_selected, MaterializeOptions, MaterializeSummary, MatrixMaterializer,
};
use crate::service::template_service::load_forest;
use crate::service::{normalize_optional, ServiceError, ServiceResult};
use crate::tree::EntryNode;
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;

/// Parses a `YYYY-MM-DD` report date.
pub fn parse_report_date(value: &str) -> ServiceResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ServiceError::Validation(format!("report date `{value}` is not a YYYY-MM-DD date"))
    })
}

/// Behaviour switches for [`ReportService`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportServiceOptions {
    pub materialize: MaterializeOptions,
    pub status_policy: StatusPolicy,
}

/// A freshly created report with the result of its first materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedReport {
    pub report: Report,
    pub materialized: MaterializeSummary,
}

/// One table of a report laid out as a matrix.
///
/// `values[r][c]` belongs to `rows[r]` and `columns[c]`; it is `None` when
/// no cell exists for the pair or the stored value is null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableGrid {
    pub table: TableTemplate,
    pub rows: Vec<EntryNode>,
    pub columns: Vec<EntryNode>,
    pub values: Vec<Vec<Option<String>>>,
}

/// Report service facade.
pub struct ReportService<T: TemplateRepository, R: ReportRepository> {
    templates: T,
    reports: R,
    options: ReportServiceOptions,
}

impl<T: TemplateRepository, R: ReportRepository> ReportService<T, R> {
    pub fn new(templates: T, reports: R) -> Self {
        Self::with_options(templates, reports, ReportServiceOptions::default())
    }

    pub fn with_options(templates: T, reports: R, options: ReportServiceOptions) -> Self {
        Self {
            templates,
            reports,
            options,
        }
    }

    /// Creates a draft report and materializes its cells.
    ///
    /// The report row is committed before materialization starts; if
    /// materialization fails the report stays and [`Self::materialize`] can
    /// be re-run.
    pub fn create_report(&self, input: &NewReport) -> ServiceResult<CreatedReport> {
        self.templates
            .get_template(input.template_uuid)?
            .ok_or(ServiceError::NotFound(EntityRef::Template(
                input.template_uuid,
            )))?;

        let normalized = NewReport {
            owner: normalize_optional(input.owner.as_deref()),
            ..input.clone()
        };
        let report = self.reports.create_report(&normalized)?;
        info!(
            "event=report_create module=service status=ok report={} template={} date={}",
            report.uuid, report.template_uuid, report.date
        );

        let materialized = self.materialize(report.uuid)?;
        Ok(CreatedReport {
            report,
            materialized,
        })
    }

    /// Idempotently creates missing cells for a report.
    pub fn materialize(&self, report_uuid: ReportId) -> ServiceResult<MaterializeSummary> {
        MatrixMaterializer::new(&self.templates, &self.reports, self.options.materialize)
            .materialize(report_uuid)
    }

    pub fn get_report(&self, report_uuid: ReportId) -> ServiceResult<Report> {
        self.reports
            .get_report(report_uuid)?
            .ok_or(ServiceError::NotFound(EntityRef::Report(report_uuid)))
    }

    /// Lists reports, optionally for one template, by date then creation.
    pub fn list_reports(&self, template_uuid: Option<TemplateId>) -> ServiceResult<Vec<Report>> {
        self.reports.list_reports(template_uuid).map_err(Into::into)
    }

    /// Returns every materialized cell of a report.
    pub fn get_report_data(&self, report_uuid: ReportId) -> ServiceResult<Vec<Cell>> {
        self.get_report(report_uuid)?;
        self.reports.list_cells(report_uuid).map_err(Into::into)
    }

    /// Writes one cell value. Only draft reports accept edits.
    pub fn update_cell(
        &self,
        report_uuid: ReportId,
        row_uuid: EntryId,
        column_uuid: EntryId,
        value: Option<&str>,
    ) -> ServiceResult<Cell> {
        match self
            .reports
            .update_draft_cell(report_uuid, row_uuid, column_uuid, value)?
        {
            CellWrite::Updated(cell) => Ok(cell),
            CellWrite::Frozen(status) => {
                warn!(
                    "event=cell_update module=service status=rejected report={} report_status={}",
                    report_uuid,
                    status.as_str()
                );
                Err(ServiceError::StateConflict {
                    report: report_uuid,
                    status,
                })
            }
        }
    }

    /// Applies a partial update. Status changes go through the configured policy.
    pub fn update_report(
        &self,
        report_uuid: ReportId,
        patch: &ReportPatch,
    ) -> ServiceResult<Report> {
        if patch.is_empty() {
            return self.get_report(report_uuid);
        }
        let patch = ReportPatch {
            owner: patch
                .owner
                .as_ref()
                .map(|owner| normalize_optional(owner.as_deref())),
            ..patch.clone()
        };

        match self
            .reports
            .update_report(report_uuid, &patch, self.options.status_policy)?
        {
            ReportWrite::Updated(report) => {
                info!(
                    "event=report_update module=service status=ok report={} report_status={}",
                    report.uuid,
                    report.status.as_str()
                );
                Ok(report)
            }
            ReportWrite::Rejected { from, to } => {
                warn!(
                    "event=report_update module=service status=rejected report={} from={} to={}",
                    report_uuid,
                    from.as_str(),
                    to.as_str()
                );
                Err(ServiceError::InvalidTransition { from, to })
            }
        }
    }

    /// Lays out each table of the report as a row x column value matrix.
    ///
    /// Rows and columns follow display order and the same leaf selection as
    /// materialization.
    pub fn get_report_grid(&self, report_uuid: ReportId) -> ServiceResult<Vec<TableGrid>> {
        let report = self.get_report(report_uuid)?;
        let active_only = self.options.materialize.active_only;

        let values_by_pair: HashMap<(EntryId, EntryId), Option<String>> = self
            .reports
            .list_cells(report_uuid)?
            .into_iter()
            .map(|cell| ((cell.row_uuid, cell.column_uuid), cell.value))
            .collect();

        let mut grids = Vec::new();
        for table in self.templates.list_tables(report.template_uuid)? {
            if active_only && !table.is_active {
                continue;
            }
            let rows = self.grid_axis(&table, Axis::Row, active_only)?;
            let columns = self.grid_axis(&table, Axis::Column, active_only)?;
            let values = rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|column| {
                            values_by_pair
                                .get(&(row.uuid, column.uuid))
                                .cloned()
                                .flatten()
                        })
                        .collect()
                })
                .collect();
            grids.push(TableGrid {
                table,
                rows,
                columns,
                values,
            });
        }
        Ok(grids)
    }

    fn grid_axis(
        &self,
        table: &TableTemplate,
        axis: Axis,
        active_only: bool,
    ) -> ServiceResult<Vec<EntryNode>> {
        let forest = load_forest(&self.templates, table.uuid, axis)?;
        Ok(forest
            .leaves()
            .into_iter()
            .filter(|leaf| leaf_selected(leaf, active_only))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::parse_report_date;
    use crate::service::ServiceError;
    use chrono::NaiveDate;

    #[test]
    fn parses_iso_dates_and_rejects_others() {
        assert_eq!(
            parse_report_date(" 2025-01-01 ").expect("iso date parses"),
            NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date")
        );
        for bad in ["01/01/2025", "2025-02-30", ""] {
            assert!(matches!(
                parse_report_date(bad),
                Err(ServiceError::Validation(_))
            ));
        }
    }
}

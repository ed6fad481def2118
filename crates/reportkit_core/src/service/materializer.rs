//! Cell materialization for one report.
//!
//! # Responsibility
//! - Compute the row x column cross product of every table of a report's
//!   template and make sure each pair has exactly one cell.
//!
//! # Invariants
//! - Re-running is a no-op for cells that already exist; their values are
//!   never touched.
//! - No cell is ever deleted, even when its row or column was deactivated
//!   or moved after the first run.
//! - Pairs are only formed from leaves of the same table.
//! - Size bounds are checked for every table before the first write.

use crate::model::report::ReportId;
use crate::model::template::{Axis, EntryId, TableTemplate, TemplateId};
use crate::repo::report_repo::ReportRepository;
use crate::repo::template_repo::TemplateRepository;
use crate::repo::EntityRef;
use crate::service::template_service::load_forest;
use crate::service::{ServiceError, ServiceResult};
use crate::tree::EntryNode;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Tuning knobs for materialization.
///
/// The default materializes every leaf and places no bound on table size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializeOptions {
    /// Skip inactive tables and inactive leaves.
    pub active_only: bool,
    /// Fail with [`ServiceError::MatrixTooLarge`] when one table has more pairs.
    pub max_pairs_per_table: Option<u64>,
}

/// Counts from one materialization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeSummary {
    pub tables: usize,
    pub pairs: usize,
    pub created: usize,
    pub existing: usize,
}

/// Materializes report cells from template structure.
pub struct MatrixMaterializer<'a, T: TemplateRepository, R: ReportRepository> {
    templates: &'a T,
    reports: &'a R,
    options: MaterializeOptions,
}

impl<'a, T: TemplateRepository, R: ReportRepository> MatrixMaterializer<'a, T, R> {
    pub fn new(templates: &'a T, reports: &'a R, options: MaterializeOptions) -> Self {
        Self {
            templates,
            reports,
            options,
        }
    }

    /// Ensures a cell exists for every `(row, column)` pair of every table.
    pub fn materialize(&self, report_uuid: ReportId) -> ServiceResult<MaterializeSummary> {
        let started_at = Instant::now();
        let report = self
            .reports
            .get_report(report_uuid)?
            .ok_or(ServiceError::NotFound(EntityRef::Report(report_uuid)))?;

        let plans = match self.plan(report.template_uuid) {
            Ok(plans) => plans,
            Err(err) => {
                warn!(
                    "event=report_materialize module=service status=error report={} error={}",
                    report_uuid, err
                );
                return Err(err);
            }
        };

        let mut summary = MaterializeSummary::default();
        for pairs in &plans {
            let outcome = self.reports.ensure_cells(report_uuid, pairs)?;
            summary.tables += 1;
            summary.pairs += pairs.len();
            summary.created += outcome.created;
            summary.existing += outcome.existing;
        }

        info!(
            "event=report_materialize module=service status=ok report={} tables={} pairs={} created={} existing={} duration_ms={}",
            report_uuid,
            summary.tables,
            summary.pairs,
            summary.created,
            summary.existing,
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }

    /// Pair lists per table, in table order and row-major leaf order.
    fn plan(&self, template_uuid: TemplateId) -> ServiceResult<Vec<Vec<(EntryId, EntryId)>>> {
        let mut plans = Vec::new();
        for table in self.templates.list_tables(template_uuid)? {
            if self.options.active_only && !table.is_active {
                continue;
            }
            let rows = self.axis_leaves(&table, Axis::Row)?;
            let columns = self.axis_leaves(&table, Axis::Column)?;

            let pair_count = (rows.len() as u64).saturating_mul(columns.len() as u64);
            if let Some(limit) = self.options.max_pairs_per_table {
                if pair_count > limit {
                    return Err(ServiceError::MatrixTooLarge {
                        table: table.uuid,
                        pairs: pair_count,
                        limit,
                    });
                }
            }

            plans.push(
                rows.iter()
                    .flat_map(|row| columns.iter().map(move |column| (*row, *column)))
                    .collect(),
            );
        }
        Ok(plans)
    }

    fn axis_leaves(&self, table: &TableTemplate, axis: Axis) -> ServiceResult<Vec<EntryId>> {
        let forest = load_forest(self.templates, table.uuid, axis)?;
        Ok(forest
            .leaves()
            .into_iter()
            .filter(|leaf| leaf_selected(leaf, self.options.active_only))
            .map(|leaf| leaf.uuid)
            .collect())
    }
}

pub(crate) fn leaf_selected(leaf: &EntryNode, active_only: bool) -> bool {
    !active_only || leaf.is_active
}

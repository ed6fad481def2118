//! Report template engine.
//!
//! Templates describe tables whose rows and columns are ordered, nested
//! groups of leaf entries. Reports bind a template to a date, get one cell
//! per row/column pair, and freeze those cells once they leave draft.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod tree;

pub use config::{ConfigError, ReportkitConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_timeout, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::report::{
    Cell, NewReport, Report, ReportId, ReportPatch, ReportStatus, StatusPolicy,
    DEFAULT_CELL_VALUE,
};
pub use model::template::{
    Axis, AxisEntry, AxisGroup, EntryId, GroupId, NewEntry, NewGroup, NewTable, ReportTemplate,
    TableId, TableTemplate, TemplateId,
};
pub use repo::report_repo::{ReportRepository, SqliteReportRepository};
pub use repo::template_repo::{SqliteTemplateRepository, TemplateRepository};
pub use repo::{EntityRef, RepoError, RepoResult};
pub use service::materializer::{MaterializeOptions, MaterializeSummary, MatrixMaterializer};
pub use service::report_service::{
    parse_report_date, CreatedReport, ReportService, ReportServiceOptions, TableGrid,
};
pub use service::template_service::{TemplateListQuery, TemplateService};
pub use service::{ServiceError, ServiceResult};
pub use tree::{AxisForest, EntryNode, GroupNode, TableDetail, TemplateDetail};

/// Health-check probe used by the CLI.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Use-case services over the repositories.
//!
//! # Responsibility
//! - Validate authoring rules the storage layer does not express
//!   (same table, same axis, acyclic parents, non-blank titles).
//! - Drive materialization and the report lifecycle.
//! - Map repository failures into one caller-facing error type.

use crate::model::report::{ReportId, ReportStatus};
use crate::model::template::{GroupId, TableId};
use crate::repo::{EntityRef, RepoError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod materializer;
pub mod report_service;
pub mod template_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors from service operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Referenced record does not exist.
    NotFound(EntityRef),
    /// Input is malformed or violates an authoring rule.
    Validation(String),
    /// Cell edit attempted on a report that is not a draft.
    StateConflict {
        report: ReportId,
        status: ReportStatus,
    },
    /// Status change rejected by the configured policy.
    InvalidTransition {
        from: ReportStatus,
        to: ReportStatus,
    },
    /// Re-parenting would make a group its own ancestor.
    CycleDetected { group: GroupId, parent: GroupId },
    /// Table cross product exceeds the configured bound.
    MatrixTooLarge {
        table: TableId,
        pairs: u64,
        limit: u64,
    },
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::StateConflict { report, status } => write!(
                f,
                "report {report} is `{}`; cells can only change while it is a draft",
                status.as_str()
            ),
            Self::InvalidTransition { from, to } => write!(
                f,
                "status change `{}` -> `{}` is not allowed",
                from.as_str(),
                to.as_str()
            ),
            Self::CycleDetected { group, parent } => write!(
                f,
                "moving group {group} under {parent} would create a cycle"
            ),
            Self::MatrixTooLarge {
                table,
                pairs,
                limit,
            } => write!(
                f,
                "table {table} has {pairs} row/column pairs, above the limit of {limit}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(entity) => Self::NotFound(entity),
            other => Self::Repo(other),
        }
    }
}

pub(crate) fn normalize_title(value: &str, field: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

/// Trims optional free text and maps blank values to `None`.
pub(crate) fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

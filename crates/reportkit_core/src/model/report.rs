//! Report instances, cells and the report status lifecycle.
//!
//! # Responsibility
//! - Model one filled-in report bound to a template and a date.
//! - Model sparse cell values keyed by `(report, row entry, column entry)`.
//! - Decide which status values allow cell edits and which status writes are
//!   permitted under a [`StatusPolicy`].
//!
//! # Invariants
//! - At most one cell exists per `(report, row, column)`.
//! - Cell values may change only while the report is `draft`.

use crate::model::template::{EntryId, TemplateId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ReportId = Uuid;
pub type CellId = Uuid;

/// Value stored in freshly materialized cells.
pub const DEFAULT_CELL_VALUE: &str = "0";

/// Report lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Initial state; cells are editable.
    Draft,
    /// Submitted for review; cells are frozen.
    ForApproval,
    /// Signed off; cells are frozen.
    Approved,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::ForApproval => "for_approval",
            Self::Approved => "approved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "draft" => Some(Self::Draft),
            "for_approval" => Some(Self::ForApproval),
            "approved" => Some(Self::Approved),
            _ => None,
        }
    }

    /// Only drafts accept cell value writes.
    pub fn allows_cell_edit(self) -> bool {
        matches!(self, Self::Draft)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::ForApproval => 1,
            Self::Approved => 2,
        }
    }
}

/// Rule applied when a report's status field is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Any status may be written over any other.
    #[default]
    Unrestricted,
    /// Only `draft -> for_approval -> approved`, one step at a time.
    ForwardOnly,
}

impl StatusPolicy {
    /// Returns whether moving `from -> to` is allowed. Writing the current
    /// status again is always allowed.
    pub fn permits(self, from: ReportStatus, to: ReportStatus) -> bool {
        if from == to {
            return true;
        }
        match self {
            Self::Unrestricted => true,
            Self::ForwardOnly => to.rank() == from.rank() + 1,
        }
    }
}

/// One report instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub uuid: ReportId,
    pub template_uuid: TemplateId,
    pub date: NaiveDate,
    /// Acting user that created the report, when known.
    pub owner: Option<String>,
    pub status: ReportStatus,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
}

/// Materialized value at one `(row, column)` intersection of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub uuid: CellId,
    pub report_uuid: ReportId,
    pub row_uuid: EntryId,
    pub column_uuid: EntryId,
    pub value: Option<String>,
}

/// Input for creating a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReport {
    pub template_uuid: TemplateId,
    pub date: NaiveDate,
    pub owner: Option<String>,
}

/// Partial report update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportPatch {
    pub status: Option<ReportStatus>,
    pub date: Option<NaiveDate>,
    /// `Some(None)` clears the owner.
    pub owner: Option<Option<String>>,
}

impl ReportPatch {
    pub fn status(status: ReportStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.date.is_none() && self.owner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::{ReportStatus, StatusPolicy};

    const ALL: [ReportStatus; 3] = [
        ReportStatus::Draft,
        ReportStatus::ForApproval,
        ReportStatus::Approved,
    ];

    #[test]
    fn only_draft_allows_cell_edit() {
        assert!(ReportStatus::Draft.allows_cell_edit());
        assert!(!ReportStatus::ForApproval.allows_cell_edit());
        assert!(!ReportStatus::Approved.allows_cell_edit());
    }

    #[test]
    fn status_parse_matches_as_str() {
        for status in ALL {
            assert_eq!(ReportStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReportStatus::parse("archived"), None);
    }

    #[test]
    fn unrestricted_policy_permits_every_transition() {
        for from in ALL {
            for to in ALL {
                assert!(StatusPolicy::Unrestricted.permits(from, to));
            }
        }
    }

    #[test]
    fn forward_only_policy_rejects_skips_and_rollbacks() {
        let policy = StatusPolicy::ForwardOnly;
        assert!(policy.permits(ReportStatus::Draft, ReportStatus::ForApproval));
        assert!(policy.permits(ReportStatus::ForApproval, ReportStatus::Approved));
        assert!(policy.permits(ReportStatus::Approved, ReportStatus::Approved));
        assert!(!policy.permits(ReportStatus::Draft, ReportStatus::Approved));
        assert!(!policy.permits(ReportStatus::Approved, ReportStatus::Draft));
        assert!(!policy.permits(ReportStatus::ForApproval, ReportStatus::Draft));
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&ReportStatus::ForApproval).expect("serialize status");
        assert_eq!(json, "\"for_approval\"");
    }
}

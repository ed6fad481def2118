//! Report template records.
//!
//! # Responsibility
//! - Describe the authored structure of a report: tables, and for every table
//!   two independent axes (rows, columns) made of groups and leaf entries.
//!
//! # Invariants
//! - A group's parent, when set, lives on the same table and the same axis.
//! - An entry's group, when set, lives on the same table and the same axis.
//! - `order` is meaningful only among siblings of one scope.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TemplateId = Uuid;
pub type TableId = Uuid;
pub type GroupId = Uuid;
pub type EntryId = Uuid;

/// One of the two independent trees a table owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Row,
    Column,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Row => "row",
            Self::Column => "column",
        }
    }

    /// SQLite table holding this axis' groups.
    pub(crate) fn groups_table(self) -> &'static str {
        match self {
            Self::Row => "row_groups",
            Self::Column => "column_groups",
        }
    }

    /// SQLite table holding this axis' leaf entries.
    pub(crate) fn entries_table(self) -> &'static str {
        match self {
            Self::Row => "row_entries",
            Self::Column => "column_entries",
        }
    }
}

/// Top-level authored report definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub uuid: TemplateId,
    pub title: String,
    pub description: Option<String>,
    /// Controls visibility in template listings only.
    pub is_active: bool,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
}

/// One matrix definition inside a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTemplate {
    pub uuid: TableId,
    pub template_uuid: TemplateId,
    pub title: String,
    pub description: Option<String>,
    /// Sibling order within the owning template.
    pub order: u32,
    pub is_active: bool,
}

/// Orderable, optionally nested container on one axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisGroup {
    pub uuid: GroupId,
    pub table_uuid: TableId,
    pub axis: Axis,
    /// `None` means top-level inside the table.
    pub parent_uuid: Option<GroupId>,
    pub title: String,
    /// Sibling order within `(table, parent)`.
    pub order: u32,
}

/// Terminal row or column that takes part in the cross product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisEntry {
    pub uuid: EntryId,
    pub table_uuid: TableId,
    pub axis: Axis,
    /// `None` means attached directly to the table.
    pub group_uuid: Option<GroupId>,
    pub title: String,
    /// Sibling order within `(table, group)`.
    pub order: u32,
    pub is_active: bool,
}

/// Input for creating a table.
///
/// `order = None` asks the store to append after the current siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTable {
    pub template_uuid: TemplateId,
    pub title: String,
    pub description: Option<String>,
    pub order: Option<u32>,
}

/// Input for creating a group on one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub table_uuid: TableId,
    pub axis: Axis,
    pub parent_uuid: Option<GroupId>,
    pub title: String,
    pub order: Option<u32>,
}

/// Input for creating a leaf entry on one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub table_uuid: TableId,
    pub axis: Axis,
    pub group_uuid: Option<GroupId>,
    pub title: String,
    pub order: Option<u32>,
}

impl NewEntry {
    /// Entry attached directly to the table with an auto-assigned order.
    pub fn ungrouped(table_uuid: TableId, axis: Axis, title: impl Into<String>) -> Self {
        Self {
            table_uuid,
            axis,
            group_uuid: None,
            title: title.into(),
            order: None,
        }
    }

    /// Entry inside `group_uuid` with an auto-assigned order.
    pub fn in_group(
        table_uuid: TableId,
        axis: Axis,
        group_uuid: GroupId,
        title: impl Into<String>,
    ) -> Self {
        Self {
            table_uuid,
            axis,
            group_uuid: Some(group_uuid),
            title: title.into(),
            order: None,
        }
    }
}

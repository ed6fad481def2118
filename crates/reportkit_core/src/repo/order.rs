//! Sibling-scoped order assignment.
//!
//! # Responsibility
//! - Compute the next `sort_order` for a new node inside one sibling scope.
//! - Keep caller-supplied orders untouched.
//!
//! # Invariants
//! - Auto-assigned orders are dense from 1 when every sibling was auto-assigned.
//! - Explicit orders are never checked for uniqueness.
//! - Callers must run [`resolve_order`] and the insert inside one
//!   `BEGIN IMMEDIATE` transaction so that concurrent writers serialize on the
//!   SQLite write lock before reading `MAX(sort_order)`.

use crate::model::template::{Axis, GroupId, TableId, TemplateId};
use crate::repo::{RepoError, RepoResult};
use rusqlite::{params_from_iter, Connection};

/// Set of records sharing one parent context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingScope {
    /// Tables of one template.
    Tables { template_uuid: TemplateId },
    /// Groups of one axis under one parent (or at top level) in a table.
    Groups {
        axis: Axis,
        table_uuid: TableId,
        parent_uuid: Option<GroupId>,
    },
    /// Entries of one axis inside one group (or ungrouped) in a table.
    Entries {
        axis: Axis,
        table_uuid: TableId,
        group_uuid: Option<GroupId>,
    },
}

impl SiblingScope {
    fn filter(&self) -> (String, Vec<String>) {
        match *self {
            Self::Tables { template_uuid } => (
                "SELECT COALESCE(MAX(sort_order), 0) FROM table_templates WHERE template_uuid = ?1"
                    .to_string(),
                vec![template_uuid.to_string()],
            ),
            Self::Groups {
                axis,
                table_uuid,
                parent_uuid,
            } => scoped_filter(axis.groups_table(), "parent_uuid", table_uuid, parent_uuid),
            Self::Entries {
                axis,
                table_uuid,
                group_uuid,
            } => scoped_filter(axis.entries_table(), "group_uuid", table_uuid, group_uuid),
        }
    }
}

fn scoped_filter(
    table: &str,
    parent_column: &str,
    table_uuid: TableId,
    parent: Option<GroupId>,
) -> (String, Vec<String>) {
    match parent {
        Some(parent) => (
            format!(
                "SELECT COALESCE(MAX(sort_order), 0) FROM {table}
                 WHERE table_uuid = ?1 AND {parent_column} = ?2"
            ),
            vec![table_uuid.to_string(), parent.to_string()],
        ),
        None => (
            format!(
                "SELECT COALESCE(MAX(sort_order), 0) FROM {table}
                 WHERE table_uuid = ?1 AND {parent_column} IS NULL"
            ),
            vec![table_uuid.to_string()],
        ),
    }
}

/// Returns `max(order) + 1` over the scope, or `1` for an empty scope.
pub fn next_order(conn: &Connection, scope: &SiblingScope) -> RepoResult<u32> {
    let (sql, bind_values) = scope.filter();
    let current_max: i64 = conn.query_row(&sql, params_from_iter(bind_values), |row| row.get(0))?;
    u32::try_from(current_max + 1).map_err(|_| {
        RepoError::InvalidData(format!("sibling order overflow after `{current_max}`"))
    })
}

/// Keeps an explicit order or assigns the next free one in `scope`.
pub fn resolve_order(
    conn: &Connection,
    scope: &SiblingScope,
    requested: Option<u32>,
) -> RepoResult<u32> {
    match requested {
        Some(order) => Ok(order),
        None => next_order(conn, scope),
    }
}

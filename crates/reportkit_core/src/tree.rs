//! Nested read model for one axis of a table template.
//!
//! # Responsibility
//! - Turn flat group/entry records into an ordered forest.
//! - Provide the leaf sequence used for materialization and grid layout.
//!   That sequence covers every entry of the axis, grouped or not.
//!
//! # Invariants
//! - Every list is ordered by `(order, uuid)` ascending at every level.
//! - Groups are held in an index arena; traversal never follows references,
//!   so a persisted parent cycle cannot make building loop forever. Groups
//!   not reachable from a top-level group are counted in
//!   [`AxisForest::unreachable_groups`] and left out of the nested view;
//!   their entries are kept in [`AxisForest::stranded`].

use crate::model::template::{
    AxisEntry, AxisGroup, EntryId, GroupId, ReportTemplate, TableTemplate,
};
use serde::Serialize;
use std::collections::HashMap;

/// Serialized leaf entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryNode {
    pub uuid: EntryId,
    pub title: String,
    pub order: u32,
    pub is_active: bool,
}

/// Serialized group with its direct entries and nested subgroups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupNode {
    pub uuid: GroupId,
    pub title: String,
    pub order: u32,
    pub entries: Vec<EntryNode>,
    pub subgroups: Vec<GroupNode>,
}

/// Ordered forest of one axis: top-level groups plus ungrouped entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AxisForest {
    /// Entries attached directly to the table.
    pub entries: Vec<EntryNode>,
    pub groups: Vec<GroupNode>,
    /// Groups skipped because no top-level group leads to them.
    #[serde(skip)]
    pub unreachable_groups: usize,
    /// Entries of unreachable groups, ordered by `(order, uuid)`.
    #[serde(skip)]
    pub stranded: Vec<EntryNode>,
}

impl AxisForest {
    /// Returns all leaves in display order.
    ///
    /// Ungrouped entries come first, then each top-level group depth-first,
    /// with a group's own entries before its subgroups. Stranded entries
    /// close the list.
    pub fn leaves(&self) -> Vec<&EntryNode> {
        let mut leaves: Vec<&EntryNode> = self.entries.iter().collect();
        let mut stack: Vec<&GroupNode> = self.groups.iter().rev().collect();
        while let Some(group) = stack.pop() {
            leaves.extend(group.entries.iter());
            stack.extend(group.subgroups.iter().rev());
        }
        leaves.extend(self.stranded.iter());
        leaves
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.groups.is_empty() && self.stranded.is_empty()
    }
}

/// One table with both axis forests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDetail {
    pub table: TableTemplate,
    pub rows: AxisForest,
    pub columns: AxisForest,
}

/// Full nested structure of one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateDetail {
    pub template: ReportTemplate,
    pub tables: Vec<TableDetail>,
}

/// Builds the forest of one axis from every group and entry of a table.
///
/// Groups whose parent is unknown are treated as top-level. Entries whose
/// group is unknown are treated as ungrouped.
pub fn build_forest(groups: Vec<AxisGroup>, entries: Vec<AxisEntry>) -> AxisForest {
    let mut groups = groups;
    groups.sort_by(|a, b| (a.order, a.uuid).cmp(&(b.order, b.uuid)));
    let mut entries = entries;
    entries.sort_by(|a, b| (a.order, a.uuid).cmp(&(b.order, b.uuid)));

    let index: HashMap<GroupId, usize> = groups
        .iter()
        .enumerate()
        .map(|(position, group)| (group.uuid, position))
        .collect();

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); groups.len()];
    for (position, group) in groups.iter().enumerate() {
        match group.parent_uuid.and_then(|parent| index.get(&parent)) {
            Some(&parent) => children[parent].push(position),
            None => roots.push(position),
        }
    }

    let mut loose = Vec::new();
    let mut grouped: Vec<Vec<EntryNode>> = vec![Vec::new(); groups.len()];
    for entry in entries {
        let node = EntryNode {
            uuid: entry.uuid,
            title: entry.title,
            order: entry.order,
            is_active: entry.is_active,
        };
        match entry.group_uuid.and_then(|group| index.get(&group)) {
            Some(&position) => grouped[position].push(node),
            None => loose.push(node),
        }
    }

    // Post-order build over arena indices: a node is assembled only after
    // all of its children have been assembled.
    let mut built: Vec<Option<GroupNode>> = (0..groups.len()).map(|_| None).collect();
    let mut visited = vec![false; groups.len()];
    let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|&root| (root, false)).collect();
    while let Some((position, expanded)) = stack.pop() {
        if expanded {
            let subgroups = children[position]
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            let group = &groups[position];
            built[position] = Some(GroupNode {
                uuid: group.uuid,
                title: group.title.clone(),
                order: group.order,
                entries: std::mem::take(&mut grouped[position]),
                subgroups,
            });
            continue;
        }
        if visited[position] {
            continue;
        }
        visited[position] = true;
        stack.push((position, true));
        for &child in children[position].iter().rev() {
            stack.push((child, false));
        }
    }

    let mut unreachable_groups = 0;
    let mut stranded = Vec::new();
    for (position, seen) in visited.iter().enumerate() {
        if !seen {
            unreachable_groups += 1;
            stranded.append(&mut grouped[position]);
        }
    }
    stranded.sort_by(|a, b| (a.order, a.uuid).cmp(&(b.order, b.uuid)));

    AxisForest {
        entries: loose,
        groups: roots
            .iter()
            .filter_map(|&root| built[root].take())
            .collect(),
        unreachable_groups,
        stranded,
    }
}

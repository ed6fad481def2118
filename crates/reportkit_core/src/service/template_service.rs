//! Template authoring and read service.
//!
//! # Responsibility
//! - Validate hierarchy rules above the repository layer.
//! - Build nested template/table read models.
//!
//! # Invariants
//! - A group's parent and an entry's group live on the same table and axis.
//! - `move_group` never creates a parent cycle.
//! - The template `active` listing filter does not cascade into tables,
//!   groups or entries.

use crate::model::template::{
    Axis, AxisEntry, AxisGroup, EntryId, GroupId, NewEntry, NewGroup, NewTable, ReportTemplate,
    TableId, TableTemplate, TemplateId,
};
use crate::repo::template_repo::TemplateRepository;
use crate::repo::EntityRef;
use crate::service::{normalize_optional, normalize_title, ServiceError, ServiceResult};
use crate::tree::{build_forest, AxisForest, EntryNode, TableDetail, TemplateDetail};
use log::warn;
use std::collections::HashSet;

/// Template listing filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateListQuery {
    /// `Some(flag)` keeps only templates whose active flag equals `flag`.
    pub active: Option<bool>,
}

/// Template service facade.
pub struct TemplateService<T: TemplateRepository> {
    repo: T,
}

impl<T: TemplateRepository> TemplateService<T> {
    pub fn new(repo: T) -> Self {
        Self { repo }
    }

    pub fn create_template(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> ServiceResult<ReportTemplate> {
        let title = normalize_title(title, "template title")?;
        let description = normalize_optional(description);
        self.repo
            .create_template(title.as_str(), description.as_deref())
            .map_err(Into::into)
    }

    pub fn set_template_active(
        &self,
        template_uuid: TemplateId,
        is_active: bool,
    ) -> ServiceResult<()> {
        self.repo
            .set_template_active(template_uuid, is_active)
            .map_err(Into::into)
    }

    /// Creates a table; `input.order = None` appends after existing tables.
    pub fn create_table(&self, input: &NewTable) -> ServiceResult<TableTemplate> {
        self.require_template(input.template_uuid)?;
        let normalized = NewTable {
            title: normalize_title(&input.title, "table title")?,
            description: normalize_optional(input.description.as_deref()),
            ..input.clone()
        };
        self.repo.create_table(&normalized).map_err(Into::into)
    }

    pub fn set_table_active(&self, table_uuid: TableId, is_active: bool) -> ServiceResult<()> {
        self.repo
            .set_table_active(table_uuid, is_active)
            .map_err(Into::into)
    }

    /// Creates a group at top level or under a parent on the same axis and table.
    pub fn create_group(&self, input: &NewGroup) -> ServiceResult<AxisGroup> {
        self.require_table(input.table_uuid)?;
        if let Some(parent_uuid) = input.parent_uuid {
            self.require_group_in_table(input.axis, parent_uuid, input.table_uuid)?;
        }
        let normalized = NewGroup {
            title: normalize_title(&input.title, "group title")?,
            ..input.clone()
        };
        self.repo.create_group(&normalized).map_err(Into::into)
    }

    /// Creates a leaf entry directly on the table or inside a same-table group.
    pub fn create_entry(&self, input: &NewEntry) -> ServiceResult<AxisEntry> {
        self.require_table(input.table_uuid)?;
        if let Some(group_uuid) = input.group_uuid {
            self.require_group_in_table(input.axis, group_uuid, input.table_uuid)?;
        }
        let normalized = NewEntry {
            title: normalize_title(&input.title, "entry title")?,
            ..input.clone()
        };
        self.repo.create_entry(&normalized).map_err(Into::into)
    }

    /// Toggles an entry's active flag. Cells already created for it are kept.
    pub fn set_entry_active(
        &self,
        axis: Axis,
        entry_uuid: EntryId,
        is_active: bool,
    ) -> ServiceResult<()> {
        self.repo
            .set_entry_active(axis, entry_uuid, is_active)
            .map_err(Into::into)
    }

    /// Moves an entry into `new_group_uuid`, or detaches it with `None`.
    pub fn move_entry(
        &self,
        axis: Axis,
        entry_uuid: EntryId,
        new_group_uuid: Option<GroupId>,
    ) -> ServiceResult<AxisEntry> {
        let entry = self
            .repo
            .get_entry(axis, entry_uuid)?
            .ok_or(ServiceError::NotFound(EntityRef::Entry(axis, entry_uuid)))?;
        if let Some(group_uuid) = new_group_uuid {
            self.require_group_in_table(axis, group_uuid, entry.table_uuid)?;
        }
        self.repo
            .move_entry(axis, entry_uuid, new_group_uuid)
            .map_err(Into::into)
    }

    /// Re-parents a group. Rejects self-parenting and moves under a descendant.
    pub fn move_group(
        &self,
        axis: Axis,
        group_uuid: GroupId,
        new_parent_uuid: Option<GroupId>,
    ) -> ServiceResult<AxisGroup> {
        let group = self
            .repo
            .get_group(axis, group_uuid)?
            .ok_or(ServiceError::NotFound(EntityRef::Group(axis, group_uuid)))?;

        if let Some(parent_uuid) = new_parent_uuid {
            if parent_uuid == group_uuid {
                return Err(ServiceError::CycleDetected {
                    group: group_uuid,
                    parent: parent_uuid,
                });
            }
            self.require_group_in_table(axis, parent_uuid, group.table_uuid)?;
            if self.would_create_cycle(axis, group_uuid, parent_uuid)? {
                return Err(ServiceError::CycleDetected {
                    group: group_uuid,
                    parent: parent_uuid,
                });
            }
        }

        self.repo
            .move_group(axis, group_uuid, new_parent_uuid)
            .map_err(Into::into)
    }

    pub fn get_template(&self, template_uuid: TemplateId) -> ServiceResult<ReportTemplate> {
        self.require_template(template_uuid)
    }

    pub fn list_tables(&self, template_uuid: TemplateId) -> ServiceResult<Vec<TableTemplate>> {
        self.require_template(template_uuid)?;
        self.repo.list_tables(template_uuid).map_err(Into::into)
    }

    /// Returns one table with its row and column forests.
    pub fn get_table_detail(&self, table_uuid: TableId) -> ServiceResult<TableDetail> {
        let table = self.require_table(table_uuid)?;
        table_detail(&self.repo, table)
    }

    /// Returns the nested structure of one template, inactive parts included.
    pub fn get_template_detail(&self, template_uuid: TemplateId) -> ServiceResult<TemplateDetail> {
        let template = self.require_template(template_uuid)?;
        template_detail(&self.repo, template)
    }

    /// Lists template details. The `active` filter applies to templates only.
    pub fn list_templates(&self, query: &TemplateListQuery) -> ServiceResult<Vec<TemplateDetail>> {
        self.repo
            .list_templates(query.active)?
            .into_iter()
            .map(|template| template_detail(&self.repo, template))
            .collect()
    }

    /// Returns every leaf of one axis in display order.
    pub fn list_axis_entries(
        &self,
        table_uuid: TableId,
        axis: Axis,
    ) -> ServiceResult<Vec<EntryNode>> {
        self.require_table(table_uuid)?;
        let forest = load_forest(&self.repo, table_uuid, axis)?;
        Ok(forest.leaves().into_iter().cloned().collect())
    }

    fn require_template(&self, template_uuid: TemplateId) -> ServiceResult<ReportTemplate> {
        self.repo
            .get_template(template_uuid)?
            .ok_or(ServiceError::NotFound(EntityRef::Template(template_uuid)))
    }

    fn require_table(&self, table_uuid: TableId) -> ServiceResult<TableTemplate> {
        self.repo
            .get_table(table_uuid)?
            .ok_or(ServiceError::NotFound(EntityRef::Table(table_uuid)))
    }

    fn require_group_in_table(
        &self,
        axis: Axis,
        group_uuid: GroupId,
        table_uuid: TableId,
    ) -> ServiceResult<AxisGroup> {
        let group = self
            .repo
            .get_group(axis, group_uuid)?
            .ok_or(ServiceError::NotFound(EntityRef::Group(axis, group_uuid)))?;
        if group.table_uuid != table_uuid {
            return Err(ServiceError::Validation(format!(
                "{} group {group_uuid} belongs to table {}, not {table_uuid}",
                axis.as_str(),
                group.table_uuid
            )));
        }
        Ok(group)
    }

    /// Walks up from `candidate_parent`; reaching `group_uuid` or revisiting a
    /// node means the move would close a loop.
    fn would_create_cycle(
        &self,
        axis: Axis,
        group_uuid: GroupId,
        candidate_parent: GroupId,
    ) -> ServiceResult<bool> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent);
        while let Some(current) = cursor {
            if current == group_uuid || !visited.insert(current) {
                return Ok(true);
            }
            let node = self
                .repo
                .get_group(axis, current)?
                .ok_or(ServiceError::NotFound(EntityRef::Group(axis, current)))?;
            cursor = node.parent_uuid;
        }
        Ok(false)
    }
}

/// Loads and builds the forest of one axis, warning about skipped groups.
pub(crate) fn load_forest<T: TemplateRepository>(
    repo: &T,
    table_uuid: TableId,
    axis: Axis,
) -> ServiceResult<AxisForest> {
    let groups = repo.list_groups(table_uuid, axis)?;
    let entries = repo.list_entries(table_uuid, axis)?;
    let forest = build_forest(groups, entries);
    if forest.unreachable_groups > 0 {
        warn!(
            "event=tree_build module=service status=degraded table={} axis={} unreachable_groups={} stranded_entries={}",
            table_uuid,
            axis.as_str(),
            forest.unreachable_groups,
            forest.stranded.len()
        );
    }
    Ok(forest)
}

fn table_detail<T: TemplateRepository>(
    repo: &T,
    table: TableTemplate,
) -> ServiceResult<TableDetail> {
    let rows = load_forest(repo, table.uuid, Axis::Row)?;
    let columns = load_forest(repo, table.uuid, Axis::Column)?;
    Ok(TableDetail {
        table,
        rows,
        columns,
    })
}

fn template_detail<T: TemplateRepository>(
    repo: &T,
    template: ReportTemplate,
) -> ServiceResult<TemplateDetail> {
    let tables = repo
        .list_tables(template.uuid)?
        .into_iter()
        .map(|table| table_detail(repo, table))
        .collect::<ServiceResult<Vec<_>>>()?;
    Ok(TemplateDetail { template, tables })
}

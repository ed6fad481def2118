//! Report template repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist templates, tables, and per-axis groups and entries.
//! - Assign sibling orders atomically with the insert that uses them.
//!
//! # Invariants
//! - Creates and moves run in `BEGIN IMMEDIATE` transactions.
//! - Listings are ordered by `sort_order ASC, uuid ASC`.
//! - This layer does not validate hierarchy rules (same table, acyclic
//!   parents); the template service does.

use crate::model::template::{
    Axis, AxisEntry, AxisGroup, EntryId, GroupId, NewEntry, NewGroup, NewTable, ReportTemplate,
    TableId, TableTemplate, TemplateId,
};
use crate::repo::order::{resolve_order, SiblingScope};
use crate::repo::{
    bool_to_int, ensure_connection_ready, parse_flag, parse_optional_uuid, parse_uuid, EntityRef,
    RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const TEMPLATE_SELECT_SQL: &str = "SELECT
    template_uuid,
    title,
    description,
    is_active,
    created_at,
    updated_at
FROM report_templates";

const TABLE_SELECT_SQL: &str = "SELECT
    table_uuid,
    template_uuid,
    title,
    description,
    sort_order,
    is_active
FROM table_templates";

const REQUIRED_TABLES: &[&str] = &[
    "report_templates",
    "table_templates",
    "row_groups",
    "column_groups",
    "row_entries",
    "column_entries",
];

/// Repository interface for template authoring and reads.
pub trait TemplateRepository {
    fn create_template(&self, title: &str, description: Option<&str>)
        -> RepoResult<ReportTemplate>;
    fn get_template(&self, template_uuid: TemplateId) -> RepoResult<Option<ReportTemplate>>;
    /// Lists templates, optionally filtered by their active flag.
    fn list_templates(&self, active: Option<bool>) -> RepoResult<Vec<ReportTemplate>>;
    fn set_template_active(&self, template_uuid: TemplateId, is_active: bool) -> RepoResult<()>;

    fn create_table(&self, input: &NewTable) -> RepoResult<TableTemplate>;
    fn get_table(&self, table_uuid: TableId) -> RepoResult<Option<TableTemplate>>;
    fn list_tables(&self, template_uuid: TemplateId) -> RepoResult<Vec<TableTemplate>>;
    fn set_table_active(&self, table_uuid: TableId, is_active: bool) -> RepoResult<()>;

    fn create_group(&self, input: &NewGroup) -> RepoResult<AxisGroup>;
    fn get_group(&self, axis: Axis, group_uuid: GroupId) -> RepoResult<Option<AxisGroup>>;
    /// Lists every group of one axis in a table, at all nesting levels.
    fn list_groups(&self, table_uuid: TableId, axis: Axis) -> RepoResult<Vec<AxisGroup>>;
    /// Re-parents a group and appends it to the target sibling scope.
    fn move_group(
        &self,
        axis: Axis,
        group_uuid: GroupId,
        new_parent_uuid: Option<GroupId>,
    ) -> RepoResult<AxisGroup>;

    fn create_entry(&self, input: &NewEntry) -> RepoResult<AxisEntry>;
    fn get_entry(&self, axis: Axis, entry_uuid: EntryId) -> RepoResult<Option<AxisEntry>>;
    /// Lists every entry of one axis in a table, grouped or not.
    fn list_entries(&self, table_uuid: TableId, axis: Axis) -> RepoResult<Vec<AxisEntry>>;
    fn set_entry_active(&self, axis: Axis, entry_uuid: EntryId, is_active: bool)
        -> RepoResult<()>;
    /// Moves an entry into another group (or detaches it with `None`).
    fn move_entry(
        &self,
        axis: Axis,
        entry_uuid: EntryId,
        new_group_uuid: Option<GroupId>,
    ) -> RepoResult<AxisEntry>;
}

/// SQLite-backed template repository.
pub struct SqliteTemplateRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTemplateRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl TemplateRepository for SqliteTemplateRepository<'_> {
    fn create_template(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> RepoResult<ReportTemplate> {
        let template_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO report_templates (template_uuid, title, description, is_active)
             VALUES (?1, ?2, ?3, 1);",
            params![template_uuid.to_string(), title, description],
        )?;
        self.get_template(template_uuid)?
            .ok_or(RepoError::NotFound(EntityRef::Template(template_uuid)))
    }

    fn get_template(&self, template_uuid: TemplateId) -> RepoResult<Option<ReportTemplate>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TEMPLATE_SELECT_SQL} WHERE template_uuid = ?1;"))?;
        let mut rows = stmt.query([template_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_template_row(row)?));
        }
        Ok(None)
    }

    fn list_templates(&self, active: Option<bool>) -> RepoResult<Vec<ReportTemplate>> {
        let mut items = Vec::new();
        match active {
            Some(flag) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{TEMPLATE_SELECT_SQL}
                     WHERE is_active = ?1
                     ORDER BY created_at ASC, template_uuid ASC;"
                ))?;
                let mut rows = stmt.query([bool_to_int(flag)])?;
                while let Some(row) = rows.next()? {
                    items.push(parse_template_row(row)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "{TEMPLATE_SELECT_SQL} ORDER BY created_at ASC, template_uuid ASC;"
                ))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    items.push(parse_template_row(row)?);
                }
            }
        }
        Ok(items)
    }

    fn set_template_active(&self, template_uuid: TemplateId, is_active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE report_templates
             SET is_active = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE template_uuid = ?1;",
            params![template_uuid.to_string(), bool_to_int(is_active)],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Template(template_uuid)));
        }
        Ok(())
    }

    fn create_table(&self, input: &NewTable) -> RepoResult<TableTemplate> {
        let table_uuid = Uuid::new_v4();
        let scope = SiblingScope::Tables {
            template_uuid: input.template_uuid,
        };

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let order = resolve_order(&tx, &scope, input.order)?;
        tx.execute(
            "INSERT INTO table_templates (
                table_uuid,
                template_uuid,
                title,
                description,
                sort_order,
                is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1);",
            params![
                table_uuid.to_string(),
                input.template_uuid.to_string(),
                input.title.as_str(),
                input.description.as_deref(),
                order,
            ],
        )?;
        tx.commit()?;

        self.get_table(table_uuid)?
            .ok_or(RepoError::NotFound(EntityRef::Table(table_uuid)))
    }

    fn get_table(&self, table_uuid: TableId) -> RepoResult<Option<TableTemplate>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TABLE_SELECT_SQL} WHERE table_uuid = ?1;"))?;
        let mut rows = stmt.query([table_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_table_row(row)?));
        }
        Ok(None)
    }

    fn list_tables(&self, template_uuid: TemplateId) -> RepoResult<Vec<TableTemplate>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TABLE_SELECT_SQL}
             WHERE template_uuid = ?1
             ORDER BY sort_order ASC, table_uuid ASC;"
        ))?;
        let mut rows = stmt.query([template_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_table_row(row)?);
        }
        Ok(items)
    }

    fn set_table_active(&self, table_uuid: TableId, is_active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE table_templates
             SET is_active = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE table_uuid = ?1;",
            params![table_uuid.to_string(), bool_to_int(is_active)],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Table(table_uuid)));
        }
        Ok(())
    }

    fn create_group(&self, input: &NewGroup) -> RepoResult<AxisGroup> {
        let group_uuid = Uuid::new_v4();
        let scope = SiblingScope::Groups {
            axis: input.axis,
            table_uuid: input.table_uuid,
            parent_uuid: input.parent_uuid,
        };

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let order = resolve_order(&tx, &scope, input.order)?;
        tx.execute(
            &format!(
                "INSERT INTO {} (group_uuid, table_uuid, parent_uuid, title, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                input.axis.groups_table()
            ),
            params![
                group_uuid.to_string(),
                input.table_uuid.to_string(),
                input.parent_uuid.map(|value| value.to_string()),
                input.title.as_str(),
                order,
            ],
        )?;
        tx.commit()?;

        self.get_group(input.axis, group_uuid)?
            .ok_or(RepoError::NotFound(EntityRef::Group(input.axis, group_uuid)))
    }

    fn get_group(&self, axis: Axis, group_uuid: GroupId) -> RepoResult<Option<AxisGroup>> {
        load_group(self.conn, axis, group_uuid)
    }

    fn list_groups(&self, table_uuid: TableId, axis: Axis) -> RepoResult<Vec<AxisGroup>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT group_uuid, table_uuid, parent_uuid, title, sort_order
             FROM {}
             WHERE table_uuid = ?1
             ORDER BY sort_order ASC, group_uuid ASC;",
            axis.groups_table()
        ))?;
        let mut rows = stmt.query([table_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_group_row(row, axis)?);
        }
        Ok(items)
    }

    fn move_group(
        &self,
        axis: Axis,
        group_uuid: GroupId,
        new_parent_uuid: Option<GroupId>,
    ) -> RepoResult<AxisGroup> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_group(&tx, axis, group_uuid)?
            .ok_or(RepoError::NotFound(EntityRef::Group(axis, group_uuid)))?;
        if current.parent_uuid == new_parent_uuid {
            return Ok(current);
        }

        let scope = SiblingScope::Groups {
            axis,
            table_uuid: current.table_uuid,
            parent_uuid: new_parent_uuid,
        };
        let order = resolve_order(&tx, &scope, None)?;
        tx.execute(
            &format!(
                "UPDATE {}
                 SET parent_uuid = ?2,
                     sort_order = ?3,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE group_uuid = ?1;",
                axis.groups_table()
            ),
            params![
                group_uuid.to_string(),
                new_parent_uuid.map(|value| value.to_string()),
                order,
            ],
        )?;
        tx.commit()?;

        self.get_group(axis, group_uuid)?
            .ok_or(RepoError::NotFound(EntityRef::Group(axis, group_uuid)))
    }

    fn create_entry(&self, input: &NewEntry) -> RepoResult<AxisEntry> {
        let entry_uuid = Uuid::new_v4();
        let scope = SiblingScope::Entries {
            axis: input.axis,
            table_uuid: input.table_uuid,
            group_uuid: input.group_uuid,
        };

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let order = resolve_order(&tx, &scope, input.order)?;
        tx.execute(
            &format!(
                "INSERT INTO {} (entry_uuid, table_uuid, group_uuid, title, sort_order, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1);",
                input.axis.entries_table()
            ),
            params![
                entry_uuid.to_string(),
                input.table_uuid.to_string(),
                input.group_uuid.map(|value| value.to_string()),
                input.title.as_str(),
                order,
            ],
        )?;
        tx.commit()?;

        self.get_entry(input.axis, entry_uuid)?
            .ok_or(RepoError::NotFound(EntityRef::Entry(input.axis, entry_uuid)))
    }

    fn get_entry(&self, axis: Axis, entry_uuid: EntryId) -> RepoResult<Option<AxisEntry>> {
        load_entry(self.conn, axis, entry_uuid)
    }

    fn list_entries(&self, table_uuid: TableId, axis: Axis) -> RepoResult<Vec<AxisEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT entry_uuid, table_uuid, group_uuid, title, sort_order, is_active
             FROM {}
             WHERE table_uuid = ?1
             ORDER BY sort_order ASC, entry_uuid ASC;",
            axis.entries_table()
        ))?;
        let mut rows = stmt.query([table_uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_entry_row(row, axis)?);
        }
        Ok(items)
    }

    fn set_entry_active(
        &self,
        axis: Axis,
        entry_uuid: EntryId,
        is_active: bool,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE {}
                 SET is_active = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE entry_uuid = ?1;",
                axis.entries_table()
            ),
            params![entry_uuid.to_string(), bool_to_int(is_active)],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::Entry(axis, entry_uuid)));
        }
        Ok(())
    }

    fn move_entry(
        &self,
        axis: Axis,
        entry_uuid: EntryId,
        new_group_uuid: Option<GroupId>,
    ) -> RepoResult<AxisEntry> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_entry(&tx, axis, entry_uuid)?
            .ok_or(RepoError::NotFound(EntityRef::Entry(axis, entry_uuid)))?;
        if current.group_uuid == new_group_uuid {
            return Ok(current);
        }

        let scope = SiblingScope::Entries {
            axis,
            table_uuid: current.table_uuid,
            group_uuid: new_group_uuid,
        };
        let order = resolve_order(&tx, &scope, None)?;
        tx.execute(
            &format!(
                "UPDATE {}
                 SET group_uuid = ?2,
                     sort_order = ?3,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE entry_uuid = ?1;",
                axis.entries_table()
            ),
            params![
                entry_uuid.to_string(),
                new_group_uuid.map(|value| value.to_string()),
                order,
            ],
        )?;
        tx.commit()?;

        self.get_entry(axis, entry_uuid)?
            .ok_or(RepoError::NotFound(EntityRef::Entry(axis, entry_uuid)))
    }
}

fn load_group(conn: &Connection, axis: Axis, group_uuid: GroupId) -> RepoResult<Option<AxisGroup>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT group_uuid, table_uuid, parent_uuid, title, sort_order
         FROM {}
         WHERE group_uuid = ?1;",
        axis.groups_table()
    ))?;
    let mut rows = stmt.query([group_uuid.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_group_row(row, axis)?));
    }
    Ok(None)
}

fn load_entry(conn: &Connection, axis: Axis, entry_uuid: EntryId) -> RepoResult<Option<AxisEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT entry_uuid, table_uuid, group_uuid, title, sort_order, is_active
         FROM {}
         WHERE entry_uuid = ?1;",
        axis.entries_table()
    ))?;
    let mut rows = stmt.query([entry_uuid.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_entry_row(row, axis)?));
    }
    Ok(None)
}

fn parse_template_row(row: &Row<'_>) -> RepoResult<ReportTemplate> {
    let uuid_text: String = row.get("template_uuid")?;
    Ok(ReportTemplate {
        uuid: parse_uuid(&uuid_text, "report_templates.template_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        is_active: parse_flag(row.get("is_active")?, "report_templates.is_active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_table_row(row: &Row<'_>) -> RepoResult<TableTemplate> {
    let uuid_text: String = row.get("table_uuid")?;
    let template_text: String = row.get("template_uuid")?;
    Ok(TableTemplate {
        uuid: parse_uuid(&uuid_text, "table_templates.table_uuid")?,
        template_uuid: parse_uuid(&template_text, "table_templates.template_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        order: row.get("sort_order")?,
        is_active: parse_flag(row.get("is_active")?, "table_templates.is_active")?,
    })
}

fn parse_group_row(row: &Row<'_>, axis: Axis) -> RepoResult<AxisGroup> {
    let uuid_text: String = row.get("group_uuid")?;
    let table_text: String = row.get("table_uuid")?;
    Ok(AxisGroup {
        uuid: parse_uuid(&uuid_text, "groups.group_uuid")?,
        table_uuid: parse_uuid(&table_text, "groups.table_uuid")?,
        axis,
        parent_uuid: parse_optional_uuid(row.get("parent_uuid")?, "groups.parent_uuid")?,
        title: row.get("title")?,
        order: row.get("sort_order")?,
    })
}

fn parse_entry_row(row: &Row<'_>, axis: Axis) -> RepoResult<AxisEntry> {
    let uuid_text: String = row.get("entry_uuid")?;
    let table_text: String = row.get("table_uuid")?;
    Ok(AxisEntry {
        uuid: parse_uuid(&uuid_text, "entries.entry_uuid")?,
        table_uuid: parse_uuid(&table_text, "entries.table_uuid")?,
        axis,
        group_uuid: parse_optional_uuid(row.get("group_uuid")?, "entries.group_uuid")?,
        title: row.get("title")?,
        order: row.get("sort_order")?,
        is_active: parse_flag(row.get("is_active")?, "entries.is_active")?,
    })
}

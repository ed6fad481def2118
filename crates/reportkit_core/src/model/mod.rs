//! Domain model for report templates and report instances.
//!
//! # Responsibility
//! - Define the template hierarchy records (template, table, group, entry).
//! - Define report instances, their cells, and the status lifecycle.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - Sibling `order` values are scoped, never global.

pub mod report;
pub mod template;

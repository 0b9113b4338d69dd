//! Constraint enforcement around every mutation.
//!
//! Checks run in a fixed order inside the mutation's transaction:
//! required fields first (here, before any SQL runs), then uniqueness and
//! foreign keys (SQLite raises UNIQUE during the row write and immediate
//! foreign keys at statement end). Storage failures are translated into
//! [`StoreError`] variants using the [`Schema`] so callers see constraint
//! names instead of raw SQLite messages.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{ffi, Connection, ErrorCode, OptionalExtension};

use super::error::StoreError;
use super::relations::RelationKind;
use super::schema::{OnDelete, Schema};

static CONTACT_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("contact address pattern is valid"));

pub fn require_text(entity: &str, field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(entity, field, "is required"));
    }
    Ok(())
}

pub fn require_contact_address(entity: &str, field: &str, value: &str) -> Result<(), StoreError> {
    require_text(entity, field, value)?;
    if !CONTACT_ADDRESS.is_match(value.trim()) {
        return Err(StoreError::validation(
            entity,
            field,
            "is not a valid contact address",
        ));
    }
    Ok(())
}

pub fn require_present<T: Copy>(entity: &str, field: &str, value: Option<T>) -> Result<T, StoreError> {
    value.ok_or_else(|| StoreError::validation(entity, field, "is required"))
}

pub fn require_non_negative(entity: &str, field: &str, value: i32) -> Result<(), StoreError> {
    if value < 0 {
        return Err(StoreError::validation(entity, field, "must not be negative"));
    }
    Ok(())
}

/// Translate a failed write on `table` into the store's error taxonomy.
///
/// `references` lists the row's foreign key values so a foreign key failure
/// can be traced to the column whose parent is missing. The connection must
/// be the one (or the transaction) that ran the failed statement.
pub fn classify(
    schema: &Schema,
    table: &str,
    conn: &Connection,
    references: &[(&str, Option<String>)],
    err: rusqlite::Error,
) -> StoreError {
    let (code, message) = match &err {
        rusqlite::Error::SqliteFailure(e, message) if e.code == ErrorCode::ConstraintViolation => {
            (e.extended_code, message.clone().unwrap_or_default())
        }
        _ => return StoreError::Database(err),
    };

    match code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            conflict(schema, &message)
        }
        ffi::SQLITE_CONSTRAINT_NOTNULL => match failed_columns(&message).first() {
            Some((entity, field)) => StoreError::validation(entity, field, "is required"),
            None => StoreError::Database(err),
        },
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => match missing_reference(schema, table, conn, references) {
            Ok(Some(reference)) => reference,
            // The parent vanished between the write and the probe, or the
            // failing key was not listed; report the write's own table.
            Ok(None) => StoreError::Reference {
                entity: table.to_string(),
                column: "unknown".to_string(),
                target: "unknown".to_string(),
            },
            Err(probe) => probe,
        },
        _ => StoreError::Database(err),
    }
}

/// Parse `"UNIQUE constraint failed: likes.user_id, likes.post_id"` into
/// `[("likes", "user_id"), ("likes", "post_id")]`.
fn failed_columns(message: &str) -> Vec<(String, String)> {
    let Some((_, list)) = message.split_once(": ") else {
        return Vec::new();
    };
    list.split(", ")
        .filter_map(|qualified| qualified.trim().split_once('.'))
        .map(|(table, column)| (table.to_string(), column.to_string()))
        .collect()
}

fn conflict(schema: &Schema, message: &str) -> StoreError {
    let columns = failed_columns(message);
    let named = columns.first().and_then(|(table, _)| {
        let names: Vec<&str> = columns.iter().map(|(_, c)| c.as_str()).collect();
        schema
            .entity(table)
            .and_then(|entity| entity.unique_for_columns(&names))
            .map(|unique| unique.name.to_string())
    });

    let constraint = named.unwrap_or_else(|| {
        columns
            .iter()
            .map(|(table, column)| format!("{}.{}", table, column))
            .collect::<Vec<_>>()
            .join(", ")
    });
    StoreError::Conflict { constraint }
}

fn missing_reference(
    schema: &Schema,
    table: &str,
    conn: &Connection,
    references: &[(&str, Option<String>)],
) -> Result<Option<StoreError>, StoreError> {
    let entity = schema.require_entity(table)?;
    for (column, value) in references {
        let (Some(fk), Some(value)) = (entity.foreign_key(column), value) else {
            continue;
        };
        let exists = conn
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE {} = ?",
                    fk.target_table, fk.target_column
                ),
                [value],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(Some(StoreError::Reference {
                entity: table.to_string(),
                column: fk.column.to_string(),
                target: fk.target_table.to_string(),
            }));
        }
    }
    Ok(None)
}

/// Rows removed by deleting one parent row, per table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    removed: BTreeMap<&'static str, usize>,
}

impl CascadeReport {
    pub fn count(&self, table: &str) -> usize {
        self.removed.get(table).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.removed.values().sum()
    }
}

/// Count every row that deleting `table.id = id` will cascade to, following
/// the schema's has-many relations whose foreign keys cascade. Rows reachable
/// along several paths (a like on the account's own post) are counted once.
pub fn cascade_report(
    schema: &Schema,
    conn: &Connection,
    table: &'static str,
    id: &str,
) -> Result<CascadeReport, StoreError> {
    let mut reached: BTreeMap<&'static str, BTreeSet<String>> = BTreeMap::new();
    let mut frontier: Vec<(&'static str, String)> = vec![(table, id.to_string())];

    while let Some((parent, parent_id)) = frontier.pop() {
        for relation in schema
            .relations_from(parent)
            .filter(|r| r.kind == RelationKind::HasMany)
        {
            let child = schema.require_entity(relation.to)?;
            let cascades = child
                .foreign_key(relation.fk_column())
                .is_some_and(|fk| fk.on_delete == OnDelete::Cascade);
            if !cascades {
                continue;
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT id FROM {} WHERE {} = ?",
                child.table,
                relation.fk_column()
            ))?;
            let child_ids = stmt
                .query_map([&parent_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let seen = reached.entry(child.table).or_default();
            for child_id in child_ids {
                if seen.insert(child_id.clone()) {
                    frontier.push((child.table, child_id));
                }
            }
        }
    }

    Ok(CascadeReport {
        removed: reached
            .into_iter()
            .map(|(table, ids)| (table, ids.len()))
            .collect(),
    })
}

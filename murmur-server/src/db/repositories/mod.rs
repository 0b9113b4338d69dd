mod account_repository;
mod like_repository;
mod post_repository;

pub use account_repository::AccountRepository;
pub use like_repository::LikeRepository;
pub use post_repository::PostRepository;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

use super::codec::encode_timestamp;
use super::error::StoreResult;
use super::schema::EntityDef;
use super::DbConnection;

/// Start a write transaction that takes SQLite's write lock at BEGIN, so
/// concurrent mutations serialize instead of failing on lock upgrade.
fn begin(conn: &mut DbConnection) -> StoreResult<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Prefix every column with a table alias: `p.id, p.content, ...`
fn qualified(alias: &str, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| format!("{}.{}", alias, column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Apply `assignments` to one row and stamp every refresh-on-update column
/// of the entity with `stamp`.
fn update_row(
    conn: &Connection,
    entity: &EntityDef,
    id: &Uuid,
    mut assignments: Vec<(&'static str, Value)>,
    stamp: &DateTime<Utc>,
) -> rusqlite::Result<usize> {
    for column in entity.refreshed_columns() {
        assignments.push((column.name, Value::Text(encode_timestamp(stamp))));
    }

    let set_clause = assignments
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE {} SET {} WHERE id = ?", entity.table, set_clause);

    let mut values: Vec<Value> = assignments.into_iter().map(|(_, value)| value).collect();
    values.push(Value::Text(id.to_string()));
    conn.execute(&sql, params_from_iter(values))
}

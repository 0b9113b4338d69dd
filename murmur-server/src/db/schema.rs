//! Entity definitions for the Murmur store.
//!
//! Every table is described by an immutable [`EntityDef`] value built by a
//! plain function, and the full set is gathered into a [`Schema`] that the
//! caller hands to [`Database`](super::Database) at startup. The schema renders
//! its own DDL and is consulted at runtime by the constraint enforcer and the
//! repositories (unique constraint names, foreign keys, columns refreshed on
//! update, relations).

use super::error::StoreError;
use super::relations::{social_relations, Relation};

pub const USERS: &str = "users";
pub const POSTS: &str = "posts";
pub const LIKES: &str = "likes";

/// SQL expression producing the current UTC time in the same fixed-width
/// RFC 3339 shape the repositories write. SQLite only resolves milliseconds,
/// so the remaining nanosecond digits are zero.
const NOW_SQL: &str = "(strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000000Z')";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Text,
    Boolean,
    Integer,
    Timestamp,
    /// Ordered list of strings, stored as a JSON array
    TextList,
}

impl ColumnKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Uuid | ColumnKind::Text | ColumnKind::Timestamp | ColumnKind::TextList => {
                "TEXT"
            }
            ColumnKind::Boolean | ColumnKind::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    None,
    Bool(bool),
    Int(i64),
    Now,
}

impl ColumnDefault {
    fn to_sql(self) -> Option<String> {
        match self {
            ColumnDefault::None => None,
            ColumnDefault::Bool(value) => Some(if value { "1" } else { "0" }.to_string()),
            ColumnDefault::Int(value) => Some(value.to_string()),
            ColumnDefault::Now => Some(NOW_SQL.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub default: ColumnDefault,
    pub primary_key: bool,
    /// Rewritten with the mutation time on every update of the row
    pub refresh_on_update: bool,
}

impl ColumnDef {
    pub fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
            default: ColumnDefault::None,
            primary_key: false,
            refresh_on_update: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_to(mut self, default: ColumnDefault) -> Self {
        self.default = default;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn refresh_on_update(mut self) -> Self {
        self.refresh_on_update = true;
        self
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.kind.sql_type());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default.to_sql() {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }
        sql
    }
}

/// A named uniqueness constraint, materialized as a unique index of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueDef {
    pub name: &'static str,
    pub columns: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
}

impl OnDelete {
    fn to_sql(self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub column: &'static str,
    pub target_table: &'static str,
    pub target_column: &'static str,
    pub on_delete: OnDelete,
}

/// Plain (non-unique) lookup index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub columns: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    pub table: &'static str,
    pub columns: Vec<ColumnDef>,
    pub uniques: Vec<UniqueDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
    pub indexes: Vec<IndexDef>,
}

impl EntityDef {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            columns: Vec::new(),
            uniques: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn unique_column(mut self, (column, unique): (ColumnDef, UniqueDef)) -> Self {
        self.columns.push(column);
        self.uniques.push(unique);
        self
    }

    pub fn unique(mut self, name: &'static str, columns: &[&'static str]) -> Self {
        self.uniques.push(UniqueDef {
            name,
            columns: columns.to_vec(),
        });
        self
    }

    /// Declare `column` as a reference to `target_table.id` with cascade on delete.
    pub fn references(mut self, column: ColumnDef, target_table: &'static str) -> Self {
        self.foreign_keys.push(ForeignKeyDef {
            column: column.name,
            target_table,
            target_column: "id",
            on_delete: OnDelete::Cascade,
        });
        self.columns.push(column);
        self
    }

    pub fn index(mut self, name: &'static str, columns: &[&'static str]) -> Self {
        self.indexes.push(IndexDef {
            name,
            columns: columns.to_vec(),
        });
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeyDef> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Find the unique constraint covering exactly `columns` (order-insensitive).
    pub fn unique_for_columns(&self, columns: &[&str]) -> Option<&UniqueDef> {
        self.uniques.iter().find(|u| {
            u.columns.len() == columns.len()
                && columns.iter().all(|c| u.columns.iter().any(|uc| uc == c))
        })
    }

    pub fn refreshed_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.refresh_on_update)
    }

    pub fn create_table_sql(&self) -> String {
        let mut lines: Vec<String> = self.columns.iter().map(ColumnDef::to_sql).collect();
        for fk in &self.foreign_keys {
            lines.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
                fk.column,
                fk.target_table,
                fk.target_column,
                fk.on_delete.to_sql()
            ));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.table,
            lines.join(",\n    ")
        )
    }

    pub fn create_index_sql(&self) -> Vec<String> {
        let uniques = self.uniques.iter().map(|u| {
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {}({});",
                u.name,
                self.table,
                u.columns.join(", ")
            )
        });
        let plain = self.indexes.iter().map(|i| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({});",
                i.name,
                self.table,
                i.columns.join(", ")
            )
        });
        uniques.chain(plain).collect()
    }
}

// Field helpers shared by every entity

pub fn id() -> ColumnDef {
    ColumnDef::new("id", ColumnKind::Uuid).primary_key()
}

pub fn text_field(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Text).not_null()
}

pub fn optional_text(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Text)
}

/// Required text column plus a unique constraint named `unique_<name>`.
pub fn unique_text(name: &'static str, constraint: &'static str) -> (ColumnDef, UniqueDef) {
    (
        text_field(name),
        UniqueDef {
            name: constraint,
            columns: vec![name],
        },
    )
}

pub fn flag(name: &'static str, default: bool) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Boolean)
        .not_null()
        .default_to(ColumnDefault::Bool(default))
}

pub fn counter(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Integer)
        .not_null()
        .default_to(ColumnDefault::Int(0))
}

/// `created_at` and `updated_at`, both defaulting to now; `updated_at` is
/// refreshed on every mutation.
pub fn timestamps() -> [ColumnDef; 2] {
    [
        ColumnDef::new("created_at", ColumnKind::Timestamp)
            .not_null()
            .default_to(ColumnDefault::Now),
        ColumnDef::new("updated_at", ColumnKind::Timestamp)
            .not_null()
            .default_to(ColumnDefault::Now)
            .refresh_on_update(),
    ]
}

// Entities

pub fn users() -> EntityDef {
    EntityDef::new(USERS)
        .column(id())
        .column(text_field("name"))
        // Required but deliberately not unique
        .column(text_field("username"))
        .column(text_field("password"))
        .column(optional_text("bio"))
        .column(flag("is_private", false))
        .column(ColumnDef::new("last_active", ColumnKind::Timestamp).default_to(ColumnDefault::Now))
        .unique_column(unique_text("email", "unique_email"))
        .column(optional_text("avatar_url"))
        .columns(timestamps())
        .index("idx_users_username", &["username"])
}

pub fn posts() -> EntityDef {
    EntityDef::new(POSTS)
        .column(id())
        .column(text_field("content"))
        .column(ColumnDef::new("media_urls", ColumnKind::TextList))
        .references(ColumnDef::new("user_id", ColumnKind::Uuid).not_null(), USERS)
        .column(flag("is_public", true))
        .column(flag("allow_comments", true))
        .column(counter("like_count"))
        .column(counter("comment_count"))
        .column(counter("share_count"))
        .columns(timestamps())
        .index("idx_posts_user_id", &["user_id"])
        .index("idx_posts_created_at", &["created_at"])
}

pub fn likes() -> EntityDef {
    EntityDef::new(LIKES)
        .column(id())
        .references(ColumnDef::new("user_id", ColumnKind::Uuid).not_null(), USERS)
        // Nullable to leave room for a second likeable target
        .references(ColumnDef::new("post_id", ColumnKind::Uuid), POSTS)
        .unique("unique_post_like", &["user_id", "post_id"])
        .index("idx_likes_post_id", &["post_id"])
}

/// The complete set of entity definitions and relations for one store.
#[derive(Debug, Clone)]
pub struct Schema {
    pub entities: Vec<EntityDef>,
    pub relations: Vec<Relation>,
}

impl Schema {
    pub fn new(entities: Vec<EntityDef>, relations: Vec<Relation>) -> Self {
        Self {
            entities,
            relations,
        }
    }

    /// Accounts, posts and likes with their navigable relations.
    pub fn social() -> Self {
        Self::new(vec![users(), posts(), likes()], social_relations())
    }

    pub fn entity(&self, table: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.table == table)
    }

    pub fn require_entity(&self, table: &str) -> Result<&EntityDef, StoreError> {
        self.entity(table)
            .ok_or_else(|| StoreError::Schema(format!("unknown entity {}", table)))
    }

    pub fn relation(&self, from: &str, name: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.from == from && r.name == name)
    }

    pub fn require_relation(&self, from: &str, name: &str) -> Result<&Relation, StoreError> {
        self.relation(from, name)
            .ok_or_else(|| StoreError::Schema(format!("unknown relation {}.{}", from, name)))
    }

    pub fn relations_from<'a>(&'a self, from: &'a str) -> impl Iterator<Item = &'a Relation> + 'a {
        self.relations.iter().filter(move |r| r.from == from)
    }

    /// Check that every foreign key targets an entity declared earlier and
    /// that every relation is backed by a foreign key.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (position, entity) in self.entities.iter().enumerate() {
            for fk in &entity.foreign_keys {
                if entity.get_column(fk.column).is_none() {
                    return Err(StoreError::Schema(format!(
                        "{}.{} is a foreign key but not a column",
                        entity.table, fk.column
                    )));
                }
                let declared_before = self.entities[..position]
                    .iter()
                    .any(|e| e.table == fk.target_table);
                if !declared_before {
                    return Err(StoreError::Schema(format!(
                        "{}.{} references {} which is not declared before it",
                        entity.table, fk.column, fk.target_table
                    )));
                }
            }
        }

        for relation in &self.relations {
            let child = self.require_entity(relation.child_table())?;
            let backed = child.foreign_key(relation.fk_column()).is_some_and(|fk| {
                fk.target_table == relation.parent_table() && fk.target_column == relation.key_column()
            });
            if !backed {
                return Err(StoreError::Schema(format!(
                    "relation {}.{} has no matching foreign key",
                    relation.from, relation.name
                )));
            }
        }

        Ok(())
    }

    /// DDL for every entity, parents first.
    pub fn ddl(&self) -> String {
        let mut statements = Vec::new();
        for entity in &self.entities {
            statements.push(entity.create_table_sql());
            statements.extend(entity.create_index_sql());
        }
        statements.join("\n\n")
    }
}

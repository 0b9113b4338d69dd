//! Navigable associations between entities.
//!
//! Relations are metadata only. Integrity is enforced by the foreign keys in
//! [`schema`](super::schema); repositories use relations to build joins
//! without spelling out join conditions by hand.

use super::schema::{LIKES, POSTS, USERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Parent to children, e.g. an account's posts
    HasMany,
    /// Child to parent, e.g. a post's author
    BelongsTo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    pub from: &'static str,
    pub to: &'static str,
    pub kind: RelationKind,
    /// Column on the `from` side of the join
    pub local_column: &'static str,
    /// Column on the `to` side of the join
    pub foreign_column: &'static str,
}

impl Relation {
    /// `from` owns many rows of `to`, linked by `to.fk_column = from.id`.
    pub fn has_many(
        name: &'static str,
        from: &'static str,
        to: &'static str,
        fk_column: &'static str,
    ) -> Self {
        Self {
            name,
            from,
            to,
            kind: RelationKind::HasMany,
            local_column: "id",
            foreign_column: fk_column,
        }
    }

    /// `from` points at one row of `to` through `from.fk_column = to.id`.
    pub fn belongs_to(
        name: &'static str,
        from: &'static str,
        to: &'static str,
        fk_column: &'static str,
    ) -> Self {
        Self {
            name,
            from,
            to,
            kind: RelationKind::BelongsTo,
            local_column: fk_column,
            foreign_column: "id",
        }
    }

    /// Table holding the foreign key
    pub fn child_table(&self) -> &'static str {
        match self.kind {
            RelationKind::HasMany => self.to,
            RelationKind::BelongsTo => self.from,
        }
    }

    pub fn parent_table(&self) -> &'static str {
        match self.kind {
            RelationKind::HasMany => self.from,
            RelationKind::BelongsTo => self.to,
        }
    }

    pub fn fk_column(&self) -> &'static str {
        match self.kind {
            RelationKind::HasMany => self.foreign_column,
            RelationKind::BelongsTo => self.local_column,
        }
    }

    /// Referenced key on the parent table
    pub fn key_column(&self) -> &'static str {
        match self.kind {
            RelationKind::HasMany => self.local_column,
            RelationKind::BelongsTo => self.foreign_column,
        }
    }

    /// Render the join condition between aliases of `from` and `to`.
    pub fn join_predicate(&self, from_alias: &str, to_alias: &str) -> String {
        format!(
            "{}.{} = {}.{}",
            to_alias, self.foreign_column, from_alias, self.local_column
        )
    }
}

pub fn social_relations() -> Vec<Relation> {
    vec![
        Relation::has_many("posts", USERS, POSTS, "user_id"),
        Relation::has_many("likes", USERS, LIKES, "user_id"),
        Relation::belongs_to("user", POSTS, USERS, "user_id"),
        Relation::has_many("likes", POSTS, LIKES, "post_id"),
        Relation::belongs_to("user", LIKES, USERS, "user_id"),
        Relation::belongs_to("post", LIKES, POSTS, "post_id"),
    ]
}

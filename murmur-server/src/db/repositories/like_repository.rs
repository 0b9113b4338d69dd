use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use murmur_types::{Like, NewLike};

use super::{begin, qualified};
use crate::db::codec::{opt_uuid_at, uuid_at};
use crate::db::constraints::{classify, require_present};
use crate::db::error::{StoreError, StoreResult};
use crate::db::schema::{LIKES, POSTS, USERS};
use crate::db::Database;

const LIKE_COLUMNS: &[&str] = &["id", "user_id", "post_id"];

fn like_from_row(row: &Row) -> rusqlite::Result<Like> {
    Ok(Like {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        post_id: opt_uuid_at(row, 2)?,
    })
}

pub struct LikeRepository {
    db: Database,
}

impl LikeRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record that an account likes a post. A second like for the same pair
    /// is a conflict on `unique_post_like`.
    pub fn create(&self, new: &NewLike) -> StoreResult<Like> {
        let post_id = require_present(LIKES, "post_id", new.post_id)?;
        let like = Like {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            post_id: Some(post_id),
        };

        let mut conn = self.db.pool.get()?;
        let tx = begin(&mut conn)?;
        tx.execute(
            "INSERT INTO likes (id, user_id, post_id) VALUES (?1, ?2, ?3)",
            params![
                like.id.to_string(),
                like.user_id.to_string(),
                post_id.to_string()
            ],
        )
        .map_err(|e| {
            classify(
                self.db.schema(),
                LIKES,
                &tx,
                &[
                    ("user_id", Some(like.user_id.to_string())),
                    ("post_id", Some(post_id.to_string())),
                ],
                e,
            )
        })?;
        tx.commit()?;

        tracing::debug!("Account {} liked post {}", like.user_id, post_id);
        Ok(like)
    }

    pub fn get_by_id(&self, id: &Uuid) -> StoreResult<Option<Like>> {
        let conn = self.db.pool.get()?;
        let like = conn
            .query_row(
                &format!("SELECT {} FROM likes WHERE id = ?", LIKE_COLUMNS.join(", ")),
                [id.to_string()],
                like_from_row,
            )
            .optional()?;
        Ok(like)
    }

    /// Get the like an account left on a post, if any
    pub fn get(&self, user_id: &Uuid, post_id: &Uuid) -> StoreResult<Option<Like>> {
        let conn = self.db.pool.get()?;
        let like = conn
            .query_row(
                &format!(
                    "SELECT {} FROM likes WHERE user_id = ? AND post_id = ?",
                    LIKE_COLUMNS.join(", ")
                ),
                params![user_id.to_string(), post_id.to_string()],
                like_from_row,
            )
            .optional()?;
        Ok(like)
    }

    /// Likes on a post in the order they were recorded
    pub fn list_by_post(&self, post_id: &Uuid) -> StoreResult<Vec<Like>> {
        let likes = self.db.schema().require_relation(POSTS, "likes")?;
        let conn = self.db.pool.get()?;

        let sql = format!(
            "SELECT {} FROM posts p JOIN likes l ON {} WHERE p.id = ? ORDER BY l.rowid",
            qualified("l", LIKE_COLUMNS),
            likes.join_predicate("p", "l")
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt
            .query_map([post_id.to_string()], like_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(result)
    }

    /// Likes left by an account in the order they were recorded
    pub fn list_by_account(&self, user_id: &Uuid) -> StoreResult<Vec<Like>> {
        let likes = self.db.schema().require_relation(USERS, "likes")?;
        let conn = self.db.pool.get()?;

        let sql = format!(
            "SELECT {} FROM users u JOIN likes l ON {} WHERE u.id = ? ORDER BY l.rowid",
            qualified("l", LIKE_COLUMNS),
            likes.join_predicate("u", "l")
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt
            .query_map([user_id.to_string()], like_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(result)
    }

    pub fn count_for_post(&self, post_id: &Uuid) -> StoreResult<i64> {
        let conn = self.db.pool.get()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?",
            [post_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count(&self) -> StoreResult<i64> {
        let conn = self.db.pool.get()?;
        let count = conn.query_row("SELECT COUNT(*) FROM likes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove an account's like from a post
    pub fn delete(&self, user_id: &Uuid, post_id: &Uuid) -> StoreResult<()> {
        let mut conn = self.db.pool.get()?;
        let tx = begin(&mut conn)?;
        let removed = tx.execute(
            "DELETE FROM likes WHERE user_id = ? AND post_id = ?",
            params![user_id.to_string(), post_id.to_string()],
        )?;
        if removed == 0 {
            return Err(StoreError::not_found(LIKES, format!("{}/{}", user_id, post_id)));
        }
        tx.commit()?;
        Ok(())
    }
}

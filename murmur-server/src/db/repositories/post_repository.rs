use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use murmur_types::{NewPost, Post, PostUpdate, PostWithAuthor};

use super::{begin, qualified, update_row};
use crate::db::codec::{advance, encode_text_list, encode_timestamp, text_list_at, timestamp_at, uuid_at};
use crate::db::constraints::{
    cascade_report, classify, require_non_negative, require_text, CascadeReport,
};
use crate::db::error::{StoreError, StoreResult};
use crate::db::schema::{POSTS, USERS};
use crate::db::Database;

const POST_COLUMNS: &[&str] = &[
    "id",
    "content",
    "media_urls",
    "user_id",
    "is_public",
    "allow_comments",
    "like_count",
    "comment_count",
    "share_count",
    "created_at",
    "updated_at",
];

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: uuid_at(row, 0)?,
        content: row.get(1)?,
        media_urls: text_list_at(row, 2)?,
        user_id: uuid_at(row, 3)?,
        is_public: row.get(4)?,
        allow_comments: row.get(5)?,
        like_count: row.get(6)?,
        comment_count: row.get(7)?,
        share_count: row.get(8)?,
        created_at: timestamp_at(row, 9)?,
        updated_at: timestamp_at(row, 10)?,
    })
}

fn validate_media(urls: Option<&[String]>) -> StoreResult<()> {
    for url in urls.unwrap_or_default() {
        require_text(POSTS, "media_urls", url)?;
    }
    Ok(())
}

pub struct PostRepository {
    db: Database,
}

impl PostRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn fetch(conn: &Connection, id: &Uuid) -> StoreResult<Option<Post>> {
        let post = conn
            .query_row(
                &format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS.join(", ")),
                [id.to_string()],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    /// Create a new post for an existing account
    pub fn create(&self, new: &NewPost) -> StoreResult<Post> {
        require_text(POSTS, "content", &new.content)?;
        validate_media(new.media_urls.as_deref())?;

        let now = Utc::now();
        let stamp = encode_timestamp(&now);
        let post = Post {
            id: Uuid::new_v4(),
            content: new.content.clone(),
            media_urls: new.media_urls.clone(),
            user_id: new.user_id,
            is_public: new.is_public.unwrap_or(true),
            allow_comments: new.allow_comments.unwrap_or(true),
            like_count: 0,
            comment_count: 0,
            share_count: 0,
            created_at: now,
            updated_at: now,
        };
        let media = encode_text_list(post.media_urls.as_deref())?;

        let mut conn = self.db.pool.get()?;
        let tx = begin(&mut conn)?;
        tx.execute(
            &format!(
                "INSERT INTO posts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, 0, ?7, ?8)",
                POST_COLUMNS.join(", ")
            ),
            params![
                post.id.to_string(),
                &post.content,
                media,
                post.user_id.to_string(),
                post.is_public,
                post.allow_comments,
                &stamp,
                &stamp,
            ],
        )
        .map_err(|e| {
            classify(
                self.db.schema(),
                POSTS,
                &tx,
                &[("user_id", Some(post.user_id.to_string()))],
                e,
            )
        })?;
        tx.commit()?;

        tracing::debug!("Created post {} for account {}", post.id, post.user_id);
        Ok(post)
    }

    /// Get post by ID
    pub fn get_by_id(&self, id: &Uuid) -> StoreResult<Option<Post>> {
        let conn = self.db.pool.get()?;
        Self::fetch(&conn, id)
    }

    /// Get a post joined with its author's display fields
    pub fn get_with_author(&self, id: &Uuid) -> StoreResult<Option<PostWithAuthor>> {
        let author = self.db.schema().require_relation(POSTS, "user")?;
        let conn = self.db.pool.get()?;

        let sql = format!(
            "SELECT {}, u.name, u.username FROM posts p JOIN users u ON {} WHERE p.id = ?",
            qualified("p", POST_COLUMNS),
            author.join_predicate("p", "u")
        );
        let post = conn
            .query_row(&sql, [id.to_string()], |row| {
                Ok(PostWithAuthor {
                    post: post_from_row(row)?,
                    author_name: row.get(11)?,
                    author_username: row.get(12)?,
                })
            })
            .optional()?;
        Ok(post)
    }

    /// Posts authored by an account, newest first
    pub fn list_by_account(&self, user_id: &Uuid) -> StoreResult<Vec<Post>> {
        let posts = self.db.schema().require_relation(USERS, "posts")?;
        let conn = self.db.pool.get()?;

        let sql = format!(
            "SELECT {} FROM users u JOIN posts p ON {} WHERE u.id = ? ORDER BY p.created_at DESC, p.id",
            qualified("p", POST_COLUMNS),
            posts.join_predicate("u", "p")
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt
            .query_map([user_id.to_string()], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(result)
    }

    pub fn count(&self) -> StoreResult<i64> {
        let conn = self.db.pool.get()?;
        let count = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Apply a partial edit, including the denormalized counters
    pub fn update(&self, id: &Uuid, update: &PostUpdate) -> StoreResult<Post> {
        if let Some(content) = &update.content {
            require_text(POSTS, "content", content)?;
        }
        validate_media(update.media_urls.as_ref().and_then(|urls| urls.as_deref()))?;

        let mut assignments: Vec<(&'static str, Value)> = Vec::new();
        if let Some(content) = &update.content {
            assignments.push(("content", Value::from(content.clone())));
        }
        if let Some(urls) = &update.media_urls {
            let encoded = encode_text_list(urls.as_deref())?;
            assignments.push(("media_urls", Value::from(encoded)));
        }
        if let Some(is_public) = update.is_public {
            assignments.push(("is_public", Value::from(is_public)));
        }
        if let Some(allow_comments) = update.allow_comments {
            assignments.push(("allow_comments", Value::from(allow_comments)));
        }
        for (column, value) in [
            ("like_count", update.like_count),
            ("comment_count", update.comment_count),
            ("share_count", update.share_count),
        ] {
            if let Some(value) = value {
                require_non_negative(POSTS, column, value)?;
                assignments.push((column, Value::from(value)));
            }
        }

        let schema = self.db.schema();
        let entity = schema.require_entity(POSTS)?;
        let mut conn = self.db.pool.get()?;
        let tx = begin(&mut conn)?;

        let current = Self::fetch(&tx, id)?.ok_or_else(|| StoreError::not_found(POSTS, id))?;
        if update.is_empty() {
            return Ok(current);
        }

        let stamp = advance(&current.updated_at);
        update_row(&tx, entity, id, assignments, &stamp)
            .map_err(|e| classify(schema, POSTS, &tx, &[], e))?;

        let updated = Self::fetch(&tx, id)?.ok_or_else(|| StoreError::not_found(POSTS, id))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Delete a post and every like on it
    pub fn delete(&self, id: &Uuid) -> StoreResult<CascadeReport> {
        let mut conn = self.db.pool.get()?;
        let tx = begin(&mut conn)?;

        if Self::fetch(&tx, id)?.is_none() {
            return Err(StoreError::not_found(POSTS, id));
        }
        let report = cascade_report(self.db.schema(), &tx, POSTS, &id.to_string())?;
        tx.execute("DELETE FROM posts WHERE id = ?", [id.to_string()])?;
        tx.commit()?;

        tracing::info!("Deleted post {} with {} likes", id, report.total());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::AccountRepository;
    use crate::db::schema::LIKES;
    use crate::db::{ErrorKind, Schema};
    use murmur_types::NewAccount;

    fn setup() -> (Database, Uuid) {
        let db = Database::in_memory(Schema::social()).expect("Failed to create database");
        db.initialize().expect("Failed to initialize schema");
        let author = AccountRepository::new(db.clone())
            .create(&NewAccount {
                name: "Sarah Smith".to_string(),
                username: "sarahsmith".to_string(),
                password: "hash".to_string(),
                email: "sarah@example.com".to_string(),
                bio: None,
                avatar_url: None,
                is_private: Some(true),
            })
            .expect("Failed to create author");
        (db, author.id)
    }

    fn new_post(user_id: Uuid, content: &str) -> NewPost {
        NewPost {
            user_id,
            content: content.to_string(),
            media_urls: None,
            is_public: None,
            allow_comments: None,
        }
    }

    #[test]
    fn test_create_applies_defaults() {
        let (db, author) = setup();
        let repo = PostRepository::new(db);
        let post = repo.create(&new_post(author, "Hello")).unwrap();

        assert!(post.is_public);
        assert!(post.allow_comments);
        assert_eq!(post.like_count, 0);
        assert_eq!(post.comment_count, 0);
        assert_eq!(post.share_count, 0);
        assert_eq!(repo.get_by_id(&post.id).unwrap(), Some(post));
    }

    #[test]
    fn test_media_urls_keep_order() {
        let (db, author) = setup();
        let repo = PostRepository::new(db);
        let mut new = new_post(author, "Gallery");
        new.media_urls = Some(vec!["b.jpg".to_string(), "a.jpg".to_string()]);

        let post = repo.create(&new).unwrap();
        let stored = repo.get_by_id(&post.id).unwrap().unwrap();
        assert_eq!(
            stored.media_urls,
            Some(vec!["b.jpg".to_string(), "a.jpg".to_string()])
        );
    }

    #[test]
    fn test_unknown_author_is_reference_error() {
        let (db, _) = setup();
        let repo = PostRepository::new(db);
        let err = repo.create(&new_post(Uuid::new_v4(), "Orphan")).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Reference);
        assert!(err.to_string().contains("user_id"));
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_blank_content_is_validation_error() {
        let (db, author) = setup();
        let repo = PostRepository::new(db);
        let err = repo.create(&new_post(author, "")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_get_with_author() {
        let (db, author) = setup();
        let repo = PostRepository::new(db);
        let post = repo.create(&new_post(author, "Sunset")).unwrap();

        let joined = repo.get_with_author(&post.id).unwrap().unwrap();
        assert_eq!(joined.post.id, post.id);
        assert_eq!(joined.author_name, "Sarah Smith");
        assert_eq!(joined.author_username, "sarahsmith");
        assert!(repo.get_with_author(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_list_by_account() {
        let (db, author) = setup();
        let repo = PostRepository::new(db);
        let first = repo.create(&new_post(author, "one")).unwrap();
        let second = repo.create(&new_post(author, "two")).unwrap();

        let listed: Vec<Uuid> = repo
            .list_by_account(&author)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&first.id));
        assert!(listed.contains(&second.id));
        assert!(repo.list_by_account(&Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_update_counters() {
        let (db, author) = setup();
        let repo = PostRepository::new(db);
        let post = repo.create(&new_post(author, "count me")).unwrap();

        let update = PostUpdate {
            like_count: Some(3),
            ..Default::default()
        };
        let updated = repo.update(&post.id, &update).unwrap();
        assert_eq!(updated.like_count, 3);
        assert!(updated.updated_at > post.updated_at);
        assert_eq!(updated.created_at, post.created_at);

        let negative = PostUpdate {
            share_count: Some(-1),
            ..Default::default()
        };
        let err = repo.update(&post.id, &negative).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_update_replaces_and_clears_media() {
        let (db, author) = setup();
        let repo = PostRepository::new(db);
        let mut new = new_post(author, "album");
        new.media_urls = Some(vec!["a.jpg".to_string()]);
        let post = repo.create(&new).unwrap();

        let replaced = repo
            .update(
                &post.id,
                &PostUpdate {
                    media_urls: Some(Some(vec!["b.jpg".to_string(), "c.mp4".to_string()])),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            replaced.media_urls,
            Some(vec!["b.jpg".to_string(), "c.mp4".to_string()])
        );

        let cleared = repo
            .update(
                &post.id,
                &PostUpdate {
                    media_urls: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(cleared.media_urls.is_none());
        assert!(cleared.updated_at > replaced.updated_at);
        assert_eq!(repo.get_by_id(&post.id).unwrap().unwrap().media_urls, None);
    }

    #[test]
    fn test_default_stamped_rows_sort_with_repository_rows() {
        let (db, author) = setup();
        let conn = db.connection().unwrap();
        conn.execute(
            "INSERT INTO posts (id, content, user_id) VALUES (?1, 'raw', ?2)",
            [Uuid::new_v4().to_string(), author.to_string()],
        )
        .unwrap();
        drop(conn);

        let repo = PostRepository::new(db);
        repo.create(&new_post(author, "later")).unwrap();

        let newest_first: Vec<String> = repo
            .list_by_account(&author)
            .unwrap()
            .into_iter()
            .map(|p| p.content)
            .collect();
        assert_eq!(newest_first, vec!["later", "raw"]);
    }

    #[test]
    fn test_empty_update_leaves_row_untouched() {
        let (db, author) = setup();
        let repo = PostRepository::new(db);
        let post = repo.create(&new_post(author, "still")).unwrap();

        let same = repo.update(&post.id, &PostUpdate::default()).unwrap();
        assert_eq!(same.updated_at, post.updated_at);
    }

    #[test]
    fn test_delete_reports_cascade() {
        let (db, author) = setup();
        let repo = PostRepository::new(db);
        let post = repo.create(&new_post(author, "bye")).unwrap();

        let report = repo.delete(&post.id).unwrap();
        assert_eq!(report.count(LIKES), 0);
        assert!(repo.get_by_id(&post.id).unwrap().is_none());
        assert_eq!(repo.delete(&post.id).unwrap_err().kind(), ErrorKind::NotFound);
    }
}

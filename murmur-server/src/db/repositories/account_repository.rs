use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use murmur_types::{Account, AccountUpdate, NewAccount};

use super::{begin, update_row};
use crate::db::codec::{advance, encode_timestamp, opt_timestamp_at, timestamp_at, uuid_at};
use crate::db::constraints::{
    cascade_report, classify, require_contact_address, require_text, CascadeReport,
};
use crate::db::error::{StoreError, StoreResult};
use crate::db::schema::USERS;
use crate::db::Database;

const ACCOUNT_COLUMNS: &str = "id, name, username, password, bio, is_private, avatar_url, \
                               last_active, email, created_at, updated_at";

fn account_from_row(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        password: row.get(3)?,
        bio: row.get(4)?,
        is_private: row.get(5)?,
        avatar_url: row.get(6)?,
        last_active: opt_timestamp_at(row, 7)?,
        email: row.get(8)?,
        created_at: timestamp_at(row, 9)?,
        updated_at: timestamp_at(row, 10)?,
    })
}

fn validate_new(account: &NewAccount) -> StoreResult<()> {
    require_text(USERS, "name", &account.name)?;
    require_text(USERS, "username", &account.username)?;
    require_text(USERS, "password", &account.password)?;
    require_contact_address(USERS, "email", &account.email)
}

fn validate_update(update: &AccountUpdate) -> StoreResult<()> {
    if let Some(name) = &update.name {
        require_text(USERS, "name", name)?;
    }
    if let Some(username) = &update.username {
        require_text(USERS, "username", username)?;
    }
    if let Some(password) = &update.password {
        require_text(USERS, "password", password)?;
    }
    if let Some(email) = &update.email {
        require_contact_address(USERS, "email", email)?;
    }
    Ok(())
}

pub struct AccountRepository {
    db: Database,
}

impl AccountRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn fetch(conn: &Connection, id: &Uuid) -> StoreResult<Option<Account>> {
        let account = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", ACCOUNT_COLUMNS),
                [id.to_string()],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    /// Validate and insert every account of `batch` on `conn`, sharing one
    /// creation timestamp. The caller owns the transaction.
    fn insert_all(&self, conn: &Connection, batch: &[NewAccount]) -> StoreResult<Vec<Account>> {
        let now = Utc::now();
        let stamp = encode_timestamp(&now);
        let mut created = Vec::with_capacity(batch.len());

        for new in batch {
            validate_new(new)?;

            let account = Account {
                id: Uuid::new_v4(),
                name: new.name.clone(),
                username: new.username.clone(),
                password: new.password.clone(),
                bio: new.bio.clone(),
                is_private: new.is_private.unwrap_or(false),
                avatar_url: new.avatar_url.clone(),
                last_active: Some(now),
                email: new.email.clone(),
                created_at: now,
                updated_at: now,
            };

            conn.execute(
                &format!(
                    "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    ACCOUNT_COLUMNS
                ),
                params![
                    account.id.to_string(),
                    &account.name,
                    &account.username,
                    &account.password,
                    &account.bio,
                    account.is_private,
                    &account.avatar_url,
                    &stamp,
                    &account.email,
                    &stamp,
                    &stamp,
                ],
            )
            .map_err(|e| classify(self.db.schema(), USERS, conn, &[], e))?;

            tracing::debug!("Inserted account {} ({})", account.id, account.username);
            created.push(account);
        }

        Ok(created)
    }

    /// Create a single account
    pub fn create(&self, new: &NewAccount) -> StoreResult<Account> {
        let mut created = self.insert_batch(std::slice::from_ref(new))?;
        created
            .pop()
            .ok_or_else(|| StoreError::Schema("account insert produced no row".to_string()))
    }

    /// Insert all accounts or none of them
    pub fn insert_batch(&self, batch: &[NewAccount]) -> StoreResult<Vec<Account>> {
        let mut conn = self.db.pool.get()?;
        let tx = begin(&mut conn)?;
        let created = self.insert_all(&tx, batch)?;
        tx.commit()?;
        Ok(created)
    }

    /// Run the batch insert and roll it back, returning how many rows it
    /// would have created
    pub fn check_batch(&self, batch: &[NewAccount]) -> StoreResult<usize> {
        let mut conn = self.db.pool.get()?;
        let tx = begin(&mut conn)?;
        let created = self.insert_all(&tx, batch)?;
        tx.rollback()?;
        Ok(created.len())
    }

    /// Get account by ID
    pub fn get_by_id(&self, id: &Uuid) -> StoreResult<Option<Account>> {
        let conn = self.db.pool.get()?;
        Self::fetch(&conn, id)
    }

    /// Get account by its unique contact address
    pub fn get_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let conn = self.db.pool.get()?;
        let account = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?", ACCOUNT_COLUMNS),
                [email],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    /// Usernames are not unique, so this can return several accounts
    pub fn list_by_username(&self, username: &str) -> StoreResult<Vec<Account>> {
        let conn = self.db.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE username = ? ORDER BY created_at, id",
            ACCOUNT_COLUMNS
        ))?;
        let accounts = stmt
            .query_map([username], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    pub fn list(&self) -> StoreResult<Vec<Account>> {
        let conn = self.db.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY created_at, id",
            ACCOUNT_COLUMNS
        ))?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    pub fn count(&self) -> StoreResult<i64> {
        let conn = self.db.pool.get()?;
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Apply a partial profile edit. An empty update returns the row untouched.
    pub fn update(&self, id: &Uuid, update: &AccountUpdate) -> StoreResult<Account> {
        validate_update(update)?;

        let schema = self.db.schema();
        let entity = schema.require_entity(USERS)?;
        let mut conn = self.db.pool.get()?;
        let tx = begin(&mut conn)?;

        let current = Self::fetch(&tx, id)?.ok_or_else(|| StoreError::not_found(USERS, id))?;
        if update.is_empty() {
            return Ok(current);
        }

        let mut assignments: Vec<(&'static str, Value)> = Vec::new();
        if let Some(name) = &update.name {
            assignments.push(("name", Value::from(name.clone())));
        }
        if let Some(username) = &update.username {
            assignments.push(("username", Value::from(username.clone())));
        }
        if let Some(password) = &update.password {
            assignments.push(("password", Value::from(password.clone())));
        }
        if let Some(email) = &update.email {
            assignments.push(("email", Value::from(email.clone())));
        }
        if let Some(bio) = &update.bio {
            assignments.push(("bio", Value::from(bio.clone())));
        }
        if let Some(avatar_url) = &update.avatar_url {
            assignments.push(("avatar_url", Value::from(avatar_url.clone())));
        }
        if let Some(is_private) = update.is_private {
            assignments.push(("is_private", Value::from(is_private)));
        }

        let stamp = advance(&current.updated_at);
        update_row(&tx, entity, id, assignments, &stamp)
            .map_err(|e| classify(schema, USERS, &tx, &[], e))?;

        let updated = Self::fetch(&tx, id)?.ok_or_else(|| StoreError::not_found(USERS, id))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Record activity now; also counts as a mutation of the row
    pub fn touch_last_active(&self, id: &Uuid) -> StoreResult<Account> {
        let entity = self.db.schema().require_entity(USERS)?;
        let mut conn = self.db.pool.get()?;
        let tx = begin(&mut conn)?;

        let current = Self::fetch(&tx, id)?.ok_or_else(|| StoreError::not_found(USERS, id))?;
        let stamp = advance(&current.updated_at);
        update_row(
            &tx,
            entity,
            id,
            vec![("last_active", Value::Text(encode_timestamp(&stamp)))],
            &stamp,
        )?;

        let updated = Self::fetch(&tx, id)?.ok_or_else(|| StoreError::not_found(USERS, id))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Delete an account together with its posts and every like that
    /// references the account or one of those posts
    pub fn delete(&self, id: &Uuid) -> StoreResult<CascadeReport> {
        let mut conn = self.db.pool.get()?;
        let tx = begin(&mut conn)?;

        if Self::fetch(&tx, id)?.is_none() {
            return Err(StoreError::not_found(USERS, id));
        }
        let report = cascade_report(self.db.schema(), &tx, USERS, &id.to_string())?;
        tx.execute("DELETE FROM users WHERE id = ?", [id.to_string()])?;
        tx.commit()?;

        tracing::info!(
            "Deleted account {} with {} dependent rows",
            id,
            report.total()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ErrorKind, Schema};

    fn repo() -> AccountRepository {
        let db = Database::in_memory(Schema::social()).expect("Failed to create database");
        db.initialize().expect("Failed to initialize schema");
        AccountRepository::new(db)
    }

    fn new_account(username: &str, email: &str) -> NewAccount {
        NewAccount {
            name: format!("{} name", username),
            username: username.to_string(),
            password: "$2b$10$examplehashedpassword".to_string(),
            email: email.to_string(),
            bio: None,
            avatar_url: None,
            is_private: None,
        }
    }

    #[test]
    fn test_create_populates_generated_fields() {
        let repo = repo();
        let account = repo
            .create(&new_account("johndoe", "john@example.com"))
            .unwrap();

        assert!(!account.id.is_nil());
        assert!(!account.is_private);
        assert_eq!(account.created_at, account.updated_at);
        assert_eq!(account.last_active, Some(account.created_at));

        let stored = repo.get_by_id(&account.id).unwrap().unwrap();
        assert_eq!(stored.email, "john@example.com");
        assert_eq!(stored.created_at, account.created_at);
        assert_eq!(stored.password, account.password);
    }

    #[test]
    fn test_duplicate_email_conflicts() {
        let repo = repo();
        repo.create(&new_account("john", "john@example.com"))
            .unwrap();

        let err = repo
            .create(&new_account("other", "john@example.com"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("unique_email"));
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_username_is_allowed() {
        let repo = repo();
        repo.create(&new_account("sam", "sam1@example.com")).unwrap();
        repo.create(&new_account("sam", "sam2@example.com")).unwrap();
        assert_eq!(repo.list_by_username("sam").unwrap().len(), 2);
    }

    #[test]
    fn test_blank_required_field_is_validation_error() {
        let repo = repo();
        let mut account = new_account("john", "john@example.com");
        account.name = " ".to_string();
        let err = repo.create(&account).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let repo = repo();
        let batch = vec![
            new_account("a", "a@example.com"),
            new_account("b", "b@example.com"),
            new_account("c", "a@example.com"),
        ];
        let err = repo.insert_batch(&batch).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_check_batch_rolls_back() {
        let repo = repo();
        let batch = vec![
            new_account("a", "a@example.com"),
            new_account("b", "b@example.com"),
        ];
        assert_eq!(repo.check_batch(&batch).unwrap(), 2);
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_update_refreshes_updated_at_only() {
        let repo = repo();
        let account = repo.create(&new_account("john", "john@example.com")).unwrap();

        let update = AccountUpdate {
            bio: Some(Some("Travel blogger".to_string())),
            ..Default::default()
        };
        let updated = repo.update(&account.id, &update).unwrap();

        assert_eq!(updated.bio.as_deref(), Some("Travel blogger"));
        assert_eq!(updated.created_at, account.created_at);
        assert!(updated.updated_at > account.updated_at);
        assert_eq!(updated.name, account.name);
    }

    #[test]
    fn test_update_clears_optional_fields() {
        let repo = repo();
        let mut new = new_account("john", "john@example.com");
        new.bio = Some("Software developer".to_string());
        new.avatar_url = Some("https://example.com/avatars/john.jpg".to_string());
        let account = repo.create(&new).unwrap();

        let update = AccountUpdate {
            bio: Some(None),
            ..Default::default()
        };
        let updated = repo.update(&account.id, &update).unwrap();

        assert!(updated.bio.is_none());
        assert_eq!(updated.avatar_url, account.avatar_url);
        assert!(updated.updated_at > account.updated_at);
    }

    #[test]
    fn test_update_to_taken_email_conflicts() {
        let repo = repo();
        repo.create(&new_account("a", "a@example.com")).unwrap();
        let b = repo.create(&new_account("b", "b@example.com")).unwrap();

        let update = AccountUpdate {
            email: Some("a@example.com".to_string()),
            ..Default::default()
        };
        let err = repo.update(&b.id, &update).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let unchanged = repo.get_by_id(&b.id).unwrap().unwrap();
        assert_eq!(unchanged.email, "b@example.com");
        assert_eq!(unchanged.updated_at, b.updated_at);
    }

    #[test]
    fn test_update_missing_account() {
        let repo = repo();
        let update = AccountUpdate {
            name: Some("Nobody".to_string()),
            ..Default::default()
        };
        let err = repo.update(&Uuid::new_v4(), &update).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_touch_last_active() {
        let repo = repo();
        let account = repo.create(&new_account("john", "john@example.com")).unwrap();
        let touched = repo.touch_last_active(&account.id).unwrap();

        assert!(touched.last_active > account.last_active);
        assert_eq!(touched.last_active, Some(touched.updated_at));
        assert_eq!(touched.created_at, account.created_at);
    }

    #[test]
    fn test_delete_missing_account() {
        let repo = repo();
        let err = repo.delete(&Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

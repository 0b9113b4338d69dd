use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::schema::Schema;

/// SQLite in-memory database identifier
const MEMORY_DB_PATH: &str = ":memory:";

/// How long a writer waits for SQLite's write lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const FILE_POOL_SIZE: u32 = 8;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Applied to every pooled connection; foreign keys are off by default in SQLite
fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(BUSY_TIMEOUT)
}

/// Database wrapper with connection pooling support and the schema it was
/// opened with
#[derive(Clone)]
pub struct Database {
    pub pool: DbPool,
    schema: Arc<Schema>,
}

impl Database {
    /// Create a new database connection pool for `schema`
    pub fn new<P: AsRef<Path>>(path: P, schema: Schema) -> Result<Self> {
        let pool = Self::create_pool(path)?;
        Ok(Self {
            pool,
            schema: Arc::new(schema),
        })
    }

    /// Create a pool appropriate for the path
    ///
    /// # Arguments
    /// * `path` - Database file path or ":memory:" for in-memory database
    ///
    /// # Returns
    /// * A single-connection pool for memory storage (each SQLite memory
    ///   connection is its own database), a WAL-journaled pool otherwise
    fn create_pool<P: AsRef<Path>>(path: P) -> Result<DbPool> {
        let path_str = path.as_ref().to_string_lossy();
        let trimmed_path = path_str.trim();

        if trimmed_path.eq_ignore_ascii_case(MEMORY_DB_PATH) {
            let manager = SqliteConnectionManager::memory().with_init(configure_connection);
            // Dropping the only connection would drop the database with it
            Pool::builder()
                .max_size(1)
                .min_idle(Some(1))
                .idle_timeout(None)
                .max_lifetime(None)
                .build(manager)
                .context("Failed to create in-memory database pool")
        } else {
            let manager = SqliteConnectionManager::file(path.as_ref()).with_init(|conn| {
                configure_connection(conn)?;
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
            });
            Pool::builder()
                .max_size(FILE_POOL_SIZE)
                .build(manager)
                .context("Failed to create database connection pool")
        }
    }

    /// Create an in-memory database pool (useful for testing)
    pub fn in_memory(schema: Schema) -> Result<Self> {
        Self::new(MEMORY_DB_PATH, schema)
    }

    /// Validate the schema and create its tables and indexes
    pub fn initialize(&self) -> Result<()> {
        self.schema
            .validate()
            .context("Refusing to initialize an invalid schema")?;

        let conn = self.connection()?;
        conn.execute_batch(&self.schema.ddl())
            .context("Failed to initialize database schema")?;

        tracing::info!(
            "Initialized schema with {} entities and {} relations",
            self.schema.entities.len(),
            self.schema.relations.len()
        );
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Get a connection from the pool
    pub fn connection(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .context("Failed to get database connection from pool")
    }
}

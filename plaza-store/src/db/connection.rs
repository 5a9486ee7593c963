use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use super::schema::SCHEMA;
use crate::sink::SqliteLoader;

/// SQLite in-memory database identifier
const MEMORY_DB_PATH: &str = ":memory:";

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Database wrapper with connection pooling support
#[derive(Clone)]
pub struct Database {
    pub pool: DbPool,
}

impl Database {
    /// Create a new database connection pool
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if Self::is_memory_path(&path.as_ref().to_string_lossy()) {
            return Self::in_memory();
        }

        let manager = Self::with_foreign_keys(SqliteConnectionManager::file(path));
        let pool = Pool::new(manager).context("Failed to create database connection pool")?;
        Ok(Self { pool })
    }

    /// Whether `path` names SQLite's in-memory database
    pub fn is_memory_path(path: &str) -> bool {
        path.trim().eq_ignore_ascii_case(MEMORY_DB_PATH)
    }

    /// Create an in-memory database pool (useful for testing)
    ///
    /// Every in-memory connection is its own database, so the pool holds exactly
    /// one. Callers must drop a connection before asking for the next.
    pub fn in_memory() -> Result<Self> {
        let manager = Self::with_foreign_keys(SqliteConnectionManager::memory());
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .context("Failed to create in-memory database pool")?;
        Ok(Self { pool })
    }

    /// SQLite leaves foreign keys off per connection unless asked
    fn with_foreign_keys(manager: SqliteConnectionManager) -> SqliteConnectionManager {
        manager.with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"))
    }

    /// Initialize the database schema
    pub fn initialize(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn connection(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .context("Failed to get database connection from pool")
    }

    /// Check out one connection and wrap it in a bulk loader for a whole run
    pub fn loader(&self) -> Result<SqliteLoader> {
        SqliteLoader::new(self.connection()?)
    }
}

//! Catalog database handle.
//!
//! The catalog is one SQLite file shared by the coordinator and the per-file
//! apply workers. Schema changes ship with the binary and are applied every
//! time a handle is opened.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{ErrorKind, Result};

static SCHEMA: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Pool size for a file-backed catalog: the default worker count, the
/// coordinator, and headroom for the staging connection.
const POOL_SIZE: u32 = 8;
/// How long a writer waits for another writer's lock before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(5);
/// Session settings that connect options cannot express.
const SESSION_PRAGMAS: &str = "PRAGMA cache_size = -16384; PRAGMA temp_store = MEMORY; PRAGMA mmap_size = 67108864;";

/// Shared handle to the file catalog.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the catalog stored at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Opening catalog");
        Self::open(Self::options().filename(path).create_if_missing(true), POOL_SIZE).await
    }

    /// Open a throwaway catalog that lives in memory.
    ///
    /// Each `:memory:` connection is a separate database, so the pool holds a
    /// single connection. Public so dependent crates can test against it.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::open(Self::options().filename(":memory:"), 1).await
    }

    async fn open(options: SqliteConnectOptions, pool_size: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            // Session pragmas are per connection; set them on each one the pool opens.
            .after_connect(|conn, meta| Box::pin(async move { Self::configure_session(conn, meta).await }))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(LOCK_WAIT)
    }

    async fn configure_session(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(SESSION_PRAGMAS).execute(conn).await?;
        Ok(())
    }

    #[instrument("applying catalog schema", skip(self))]
    async fn migrate(&self) -> Result<()> {
        SCHEMA.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Let SQLite refresh its planner statistics, then close every connection
    /// once it has been returned to the pool.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('files', 'storages') ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();
        assert_eq!(tables, vec!["files", "storages"]);
    }

    #[tokio::test]
    async fn test_file_catalog_is_shared_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let db = Database::connect(&path).await.unwrap();
        let mut first = db.pool().acquire().await.unwrap();
        let mut second = db.pool().acquire().await.unwrap();
        sqlx::query("INSERT INTO storages (name, country, location, status, access) VALUES ('x', '', '', 'online', '')")
            .execute(&mut *first)
            .await
            .unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storages").fetch_one(&mut *second).await.unwrap();
        assert_eq!(count, 1);
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(&mut *second).await.unwrap();
        assert_eq!(mode, "wal");
        drop((first, second));
        db.close().await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1);
        // Set by after_connect(); 2 = MEMORY.
        let row: (i64,) = sqlx::query_as("PRAGMA temp_store").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 2);
    }
}

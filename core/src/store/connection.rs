//! Connection pooling and pragma configuration

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::errors::{HistoryError, Result};

pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Initialize a connection pool for a database file.
///
/// Every connection gets WAL journaling, `synchronous=NORMAL`, foreign key
/// enforcement and the given busy timeout.
pub fn initialize_pool(db_path: &Path, pool_size: u32, busy_timeout: Duration) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            HistoryError::Pool(format!(
                "failed to create db directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let manager = SqliteConnectionManager::file(db_path)
        .with_init(move |conn| apply_pragmas(conn, busy_timeout));

    let pool = Pool::builder()
        .max_size(pool_size.max(1))
        .build(manager)
        .map_err(|e| HistoryError::Pool(format!("failed to build pool: {e}")))?;

    tracing::debug!(path = %db_path.display(), pool_size, "SQLite pool initialized");
    Ok(pool)
}

/// Single-connection pool over a private in-memory database.
///
/// Each in-memory SQLite connection is its own database, so the pool is
/// capped at one connection.
pub fn initialize_memory_pool() -> Result<SqlitePool> {
    let manager = SqliteConnectionManager::memory().with_init(|conn| {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    });

    Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| HistoryError::Pool(format!("failed to build in-memory pool: {e}")))
}

fn apply_pragmas(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(journal_mode = %mode, "WAL mode not applied");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_pool_applies_wal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = initialize_pool(&dir.path().join("nested/db.sqlite"), 2, Duration::from_secs(1))
            .expect("pool");
        let conn = pool.get().expect("conn");
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("pragma");
        assert_eq!(mode.to_lowercase(), "wal");
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .expect("pragma");
        assert_eq!(fk, 1);
    }

    #[test]
    fn memory_pool_is_single_connection() {
        let pool = initialize_memory_pool().expect("pool");
        assert_eq!(pool.max_size(), 1);
    }
}

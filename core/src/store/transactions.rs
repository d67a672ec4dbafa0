//! Transaction helpers and the async bridge
//!
//! SQLite is synchronous; every store round trip runs on tokio's blocking
//! pool with a pooled connection.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::connection::SqlitePool;
use crate::errors::{HistoryError, Result};

/// Execute `operation` inside a transaction.
///
/// Commits when the closure returns `Ok`. On `Err` the transaction is
/// dropped, which rolls it back.
pub fn execute_in_transaction<F, T>(
    conn: &mut Connection,
    behavior: TransactionBehavior,
    operation: F,
) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(behavior)?;

    match operation(&tx) {
        Ok(result) => {
            tx.commit()?;
            Ok(result)
        }
        Err(e) => {
            tracing::debug!(error = %e, "rolling back transaction");
            Err(e)
        }
    }
}

/// Execute `operation` under a named savepoint of the current transaction.
///
/// On error only the work done since the savepoint is undone; the
/// surrounding transaction stays open.
pub fn execute_in_savepoint<F, T>(conn: &Connection, name: &str, operation: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;

    match operation() {
        Ok(result) => {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(result)
        }
        Err(e) => {
            conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
            Err(e)
        }
    }
}

/// Run a sync database operation on the blocking pool.
pub async fn with_connection<F, T>(pool: &SqlitePool, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();

    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| HistoryError::Pool(format!("failed to get connection: {e}")))?;

        f(&mut conn)
    })
    .await
    .map_err(|e| HistoryError::Transaction(format!("task join error: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE test_data (id INTEGER PRIMARY KEY, value INTEGER NOT NULL)",
            [],
        )
        .expect("create");
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM test_data", [], |row| row.get(0))
            .expect("count")
    }

    #[test]
    fn transaction_commit() {
        let mut conn = setup_test_db();
        execute_in_transaction(&mut conn, TransactionBehavior::Immediate, |tx| {
            tx.execute("INSERT INTO test_data (value) VALUES (?1)", [42])?;
            Ok(())
        })
        .expect("commit");
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn transaction_rollback() {
        let mut conn = setup_test_db();
        let result: Result<()> =
            execute_in_transaction(&mut conn, TransactionBehavior::Immediate, |tx| {
                tx.execute("INSERT INTO test_data (value) VALUES (?1)", [99])?;
                Err(HistoryError::Transaction("intentional".to_string()))
            });
        assert!(result.is_err());
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn savepoint_rollback_keeps_outer_work() {
        let mut conn = setup_test_db();
        execute_in_transaction(&mut conn, TransactionBehavior::Immediate, |tx| {
            tx.execute("INSERT INTO test_data (value) VALUES (1)", [])?;
            let inner: Result<()> = execute_in_savepoint(tx, "sp_test", || {
                tx.execute("INSERT INTO test_data (value) VALUES (2)", [])?;
                Err(HistoryError::Transaction("inner failure".to_string()))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .expect("outer commit");
        assert_eq!(count(&conn), 1);
    }

    #[tokio::test]
    async fn with_connection_propagates_errors() {
        let pool = super::super::connection::initialize_memory_pool().expect("pool");
        let result: Result<()> = with_connection(&pool, |conn| {
            conn.execute("INSERT INTO missing_table VALUES (1)", [])?;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(HistoryError::Sqlite(_))));
    }
}

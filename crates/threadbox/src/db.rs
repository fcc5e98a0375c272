//! SQLite persistence adapter.
//!
//! A [`Database`] owns one `rusqlite::Connection` behind an async mutex.
//! Callers hand it closures; the adapter runs them on a blocking thread with
//! the connection lock held, so transactions from the same engine instance
//! are serialised and never block the async executor. Write closures run
//! inside an IMMEDIATE transaction that is rolled back if the closure or the
//! commit fails.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use tokio::sync::Mutex;

use crate::error::StorageError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS nodes (
        id TEXT PRIMARY KEY,
        session TEXT NOT NULL,
        path TEXT NOT NULL,
        name TEXT NOT NULL,
        parent_path TEXT,
        kind TEXT NOT NULL CHECK (kind IN ('file', 'directory')),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        latest_version INTEGER
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_session_path
        ON nodes(session, path);
    CREATE INDEX IF NOT EXISTS idx_nodes_session_parent
        ON nodes(session, parent_path);

    CREATE TABLE IF NOT EXISTS file_versions (
        id TEXT PRIMARY KEY,
        node_id TEXT NOT NULL REFERENCES nodes(id),
        version INTEGER NOT NULL,
        content BLOB NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_versions_node_version
        ON file_versions(node_id, version);
";

/// Transactional key/row store over a single SQLite database file.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (creating if necessary) the database at `path`.
    ///
    /// Parent directories are created. The connection uses WAL journaling
    /// and enforces foreign keys.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Intended for tests.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Run `f` inside an IMMEDIATE write transaction on a blocking thread.
    ///
    /// The transaction commits iff `f` returns `Ok`; any error rolls it back
    /// and is surfaced to the caller.
    pub async fn write_transaction<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = Arc::clone(&self.conn).lock_owned().await;
        run_blocking(move || {
            let conn = guard.as_mut().ok_or(StorageError::Closed)?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
    }

    /// Run a read-only closure on a blocking thread.
    ///
    /// Reads observe committed state only; no transaction is opened.
    pub async fn read<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.conn).lock_owned().await;
        run_blocking(move || {
            let conn = guard.as_ref().ok_or(StorageError::Closed)?;
            f(conn)
        })
        .await
    }

    /// Release the connection. Subsequent operations fail with
    /// [`StorageError::Closed`].
    pub async fn close(&self) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StorageError::Backend(e))?;
        }
        Ok(())
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
}

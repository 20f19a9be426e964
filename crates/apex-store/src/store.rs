// store.rs — Store: the shared durable layer every kernel component uses.
//
// One SQLite connection guarded by a mutex. Writers go through `write()`,
// which opens an IMMEDIATE transaction: SQLite takes the write lock up
// front, so a read-check-update sequence inside the closure cannot
// interleave with another writer, in this process or any other process
// sharing the file. Readers go through `read()` and see committed data only.
//
// Nothing above this layer caches rows across calls; every component
// re-reads what it needs, so correctness reduces to this transaction
// discipline.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::schema;

/// Tuning knobs for the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How long a writer waits on another process's lock before the
    /// operation fails with a store error.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5_000),
        }
    }
}

/// Durable, transactional storage for all kernel collections.
///
/// `Store` is `Send + Sync`; share it between threads with `Arc<Store>`.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) a file-backed store and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::DirectoryFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&path).map_err(|source| StoreError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        // WAL lets readers in other processes proceed while a writer holds the lock.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::prepare(conn, config, Some(path))
    }

    /// Open a private in-memory store. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::prepare(conn, &StoreConfig::default(), None)
    }

    fn prepare(
        conn: Connection,
        config: &StoreConfig,
        path: Option<PathBuf>,
    ) -> Result<Self, StoreError> {
        conn.busy_timeout(config.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::migrate(&conn)?;
        tracing::debug!(
            path = %path.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| ":memory:".into()),
            "store opened"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Run `op` inside a single write transaction.
    ///
    /// Commits when `op` returns `Ok`; rolls back (by dropping the
    /// transaction) when it returns `Err`, so a domain denial raised
    /// half-way leaves no partial writes behind.
    pub fn write<T, E>(&self, op: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = op(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Run `op` against committed data.
    pub fn read<T, E>(&self, op: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.lock()?;
        op(&conn)
    }

    /// Path to the database file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

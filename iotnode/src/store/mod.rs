//! Persisted resource and event tables.
//!
//! Both stores are SQLite databases accessed through a single
//! `Mutex<Connection>` each. Every call holds the lock for one short
//! statement batch, so callers on the async runtime may use them directly.
//!
//! ## Files
//!
//! - `resources.db` - table `resources(filename PK, url, rtype)`
//! - `events.db` - one table `events_<id>(eid PK, etype, resource, start_time, duration)`
//!   per event store

mod events;
mod resources;

pub use events::{Event, EventKind, EventStore};
pub use resources::{filename_from_url, Resource, ResourceKind, ResourceStore};

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, info};

/// How long a statement waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by the resource and event stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// A single SQLite connection guarded by a mutex.
pub(crate) struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database file, creating its directory if needed.
    pub(crate) fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!(path = %path.display(), "Opening SQLite database");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub(crate) fn open_in_memory() -> Result<Self, StoreError> {
        debug!("Opening in-memory SQLite database");
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Run a closure against the connection.
    pub(crate) fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&conn)?)
    }
}

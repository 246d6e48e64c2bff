pub mod attachments;
pub mod cache;
pub mod capabilities;
pub mod error;
pub mod filter;
mod models;
pub mod queries;
pub mod reactions;
pub mod time;
pub mod typedstream;

pub use cache::ChatCache;
pub use capabilities::Capabilities;
pub use error::{Result, StoreError};
pub use filter::MessageFilter;

use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// How long a statement waits on a lock held by the owning app.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only handle on the Messages store.
///
/// The connection is owned exclusively and every operation goes through
/// `with_conn`, so concurrent callers are serialized one statement batch at
/// a time. Schema capabilities are probed once at open.
pub struct Database {
    conn: Mutex<Connection>,
    path: String,
    capabilities: Capabilities,
}

impl Database {
    pub fn default_path() -> String {
        shellexpand::tilde("~/Library/Messages/chat.db").into_owned()
    }

    pub fn open(path: &str) -> Result<Self> {
        let path = shellexpand::tilde(path).into_owned();

        if let Err(e) = std::fs::metadata(&path) {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(StoreError::NotFound(path));
            }
        }

        let conn = Connection::open_with_flags(
            Path::new(&path),
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|e| StoreError::enhance(e, &path))?;

        let db = Self::from_connection(conn, path.clone()).map_err(|e| match e {
            StoreError::Sqlite(inner) => StoreError::enhance(inner, &path),
            other => other,
        })?;

        info!("Messages store opened read-only at {}", db.path);
        Ok(db)
    }

    /// Wraps an existing connection, probing its schema.
    pub fn from_connection(conn: Connection, path: impl Into<String>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let capabilities = Capabilities::probe(&conn)?;
        debug!(?capabilities, "Probed message store schema");
        Ok(Self::with_capabilities(conn, path, capabilities))
    }

    /// Wraps an existing connection with capabilities decided by the caller.
    pub fn with_capabilities(
        conn: Connection,
        path: impl Into<String>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            conn: Mutex::new(conn),
            path: path.into(),
            capabilities,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        f(&conn)
    }
}

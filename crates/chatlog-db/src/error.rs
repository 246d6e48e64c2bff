use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(
        "{source}\n\n\
         Permission error: cannot read the Messages database at {path}.\n\
         The database is protected and requires Full Disk Access.\n\
         To fix:\n  \
         1. Open System Settings > Privacy & Security > Full Disk Access\n  \
         2. Add the terminal application running this program\n  \
         3. Restart the terminal and try again"
    )]
    PermissionDenied {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Messages database not found at {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid ISO8601 date: {0}")]
    InvalidIsoDate(String),

    #[error("Connection lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Blocking task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Busy/locked stores (the owning app is writing) and I/O hiccups are
    /// transient. Permission, schema and input errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::SystemIoFailure
            ),
            Self::Task(_) => true,
            _ => false,
        }
    }

    /// Rewrites open-time failures that mean "not allowed to read this file"
    /// into `PermissionDenied`.
    pub(crate) fn enhance(err: rusqlite::Error, path: &str) -> Self {
        if is_access_failure(&err) {
            return Self::PermissionDenied {
                path: path.to_string(),
                source: err,
            };
        }
        Self::Sqlite(err)
    }
}

fn is_access_failure(err: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(inner, _) = err {
        if matches!(
            inner.code,
            ErrorCode::CannotOpen
                | ErrorCode::PermissionDenied
                | ErrorCode::AuthorizationForStatementDenied
        ) {
            return true;
        }
    }
    let message = err.to_string().to_lowercase();
    message.contains("authorization denied")
        || message.contains("unable to open database")
        || message.contains("out of memory (14)")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn busy_and_locked_are_transient() {
        assert!(StoreError::Sqlite(failure(rusqlite::ffi::SQLITE_BUSY)).is_transient());
        assert!(StoreError::Sqlite(failure(rusqlite::ffi::SQLITE_LOCKED)).is_transient());
        assert!(StoreError::Task("join".into()).is_transient());
    }

    #[test]
    fn input_and_access_errors_are_fatal() {
        assert!(!StoreError::InvalidIsoDate("x".into()).is_transient());
        assert!(!StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows).is_transient());
        let denied = StoreError::enhance(failure(rusqlite::ffi::SQLITE_CANTOPEN), "/tmp/chat.db");
        assert!(matches!(denied, StoreError::PermissionDenied { .. }));
        assert!(!denied.is_transient());
    }

    #[test]
    fn permission_message_names_path_and_fix() {
        let denied = StoreError::enhance(failure(rusqlite::ffi::SQLITE_AUTH), "/tmp/chat.db");
        let text = denied.to_string();
        assert!(text.contains("/tmp/chat.db"));
        assert!(text.contains("Full Disk Access"));
    }

    #[test]
    fn other_failures_stay_sqlite_errors() {
        let err = StoreError::enhance(rusqlite::Error::InvalidQuery, "/tmp/chat.db");
        assert!(matches!(err, StoreError::Sqlite(_)));
    }
}

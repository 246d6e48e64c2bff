use chatlog_db::{Database, Result};
use chatlog_types::Message;

/// Read side a watcher polls.
///
/// Calls are blocking; the stream runs them on the blocking pool.
pub trait MessageSource: Send + Sync + 'static {
    /// Highest row id currently in the store, or 0 when empty.
    fn max_row_id(&self) -> Result<i64>;

    /// Ascending rows after `after`, reaction event rows excluded.
    fn messages_after(
        &self,
        after: i64,
        chat_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// Ascending rows after `after`, reaction event rows included.
    fn events_after(&self, after: i64, chat_id: Option<i64>, limit: usize) -> Result<Vec<Message>>;
}

impl MessageSource for Database {
    fn max_row_id(&self) -> Result<i64> {
        Database::max_row_id(self)
    }

    fn messages_after(
        &self,
        after: i64,
        chat_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        Database::messages_after(self, after, chat_id, limit)
    }

    fn events_after(&self, after: i64, chat_id: Option<i64>, limit: usize) -> Result<Vec<Message>> {
        Database::events_after(self, after, chat_id, limit)
    }
}

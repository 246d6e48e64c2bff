use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chatlog_types::ChatInfo;

use crate::{Database, Result, StoreError};

struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

/// Short-lived per-chat lookups shared across output formatting.
///
/// Chat metadata and participant lists change rarely but are read for every
/// message written, so both are kept for `ttl` before hitting the store again.
pub struct ChatCache {
    ttl: Duration,
    infos: Mutex<HashMap<i64, Entry<Option<ChatInfo>>>>,
    participants: Mutex<HashMap<i64, Entry<Vec<String>>>>,
}

impl ChatCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            infos: Mutex::new(HashMap::new()),
            participants: Mutex::new(HashMap::new()),
        }
    }

    pub fn info(&self, db: &Database, chat_id: i64) -> Result<Option<ChatInfo>> {
        cached(&self.infos, self.ttl, chat_id, || db.chat_info(chat_id))
    }

    pub fn participants(&self, db: &Database, chat_id: i64) -> Result<Vec<String>> {
        cached(&self.participants, self.ttl, chat_id, || db.participants(chat_id))
    }

    pub fn clear(&self) {
        if let Ok(mut infos) = self.infos.lock() {
            infos.clear();
        }
        if let Ok(mut participants) = self.participants.lock() {
            participants.clear();
        }
    }
}

fn cached<T, F>(map: &Mutex<HashMap<i64, Entry<T>>>, ttl: Duration, key: i64, load: F) -> Result<T>
where
    T: Clone,
    F: FnOnce() -> Result<T>,
{
    {
        let entries = map.lock().map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        if let Some(entry) = entries.get(&key) {
            if entry.fetched_at.elapsed() < ttl {
                return Ok(entry.value.clone());
            }
        }
    }

    // Loaded outside the lock; a racing load for the same key just overwrites.
    let value = load()?;
    let mut entries = map.lock().map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
    entries.insert(
        key,
        Entry {
            value: value.clone(),
            fetched_at: Instant::now(),
        },
    );
    Ok(value)
}

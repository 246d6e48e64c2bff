use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Items yielded by a change-feed subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WatchEvent {
    /// A newly visible user-content message
    Message(Message),

    /// A reaction add/remove row, only emitted when the subscription asked
    /// for reactions
    Reaction(Message),

    /// A poll tick failed. Non-fatal errors are retried on the next tick
    /// over the same window; a fatal error is the last item of the stream.
    Error { message: String, fatal: bool },
}

impl WatchEvent {
    /// Row id of the underlying message, if this event carries one.
    pub fn row_id(&self) -> Option<i64> {
        match self {
            Self::Message(message) | Self::Reaction(message) => Some(message.row_id),
            Self::Error { .. } => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Error { fatal: true, .. })
    }
}

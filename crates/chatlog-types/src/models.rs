use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation as listed from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub identifier: String,
    pub display_name: Option<String>,
    pub service: String,
    pub last_message_at: DateTime<Utc>,
}

impl Chat {
    /// Display name when set, otherwise the chat identifier.
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.identifier)
    }
}

/// Identity details of a single chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: i64,
    pub identifier: String,
    pub guid: String,
    pub name: String,
    pub service: String,
}

/// A decoded message row.
///
/// `row_id` is assigned by the store and only ever grows, but it is not
/// gapless: filtered rows (reaction events, other chats) leave holes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub row_id: i64,
    pub chat_id: i64,
    pub sender: String,
    pub text: String,
    pub date: DateTime<Utc>,
    pub is_from_me: bool,
    pub service: String,
    pub handle_id: Option<i64>,
    pub attachments_count: u32,
    pub guid: String,
    pub reply_to_guid: Option<String>,
    pub thread_originator_guid: Option<String>,
    pub destination_caller_id: Option<String>,

    // Populated only when the row is itself a reaction event.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_reaction: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_type: Option<ReactionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_reaction_add: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reacted_to_guid: Option<String>,
}

/// Tapback kind. Custom reactions carry their single emoji grapheme, so two
/// custom reactions with different emoji are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    Love,
    Like,
    Dislike,
    Laugh,
    Emphasis,
    Question,
    Custom(String),
}

impl ReactionType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Love => "love",
            Self::Like => "like",
            Self::Dislike => "dislike",
            Self::Laugh => "laugh",
            Self::Emphasis => "emphasis",
            Self::Question => "question",
            Self::Custom(_) => "custom",
        }
    }

    pub fn emoji(&self) -> &str {
        match self {
            Self::Love => "❤️",
            Self::Like => "👍",
            Self::Dislike => "👎",
            Self::Laugh => "😂",
            Self::Emphasis => "‼️",
            Self::Question => "❓",
            Self::Custom(emoji) => emoji,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

/// Current reaction on a message, produced by replaying its event rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Row id of the event that produced this reaction.
    pub row_id: i64,
    pub reaction_type: ReactionType,
    pub sender: String,
    pub is_from_me: bool,
    pub date: DateTime<Utc>,
    /// Row id of the message being reacted to.
    pub associated_message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub transfer_name: String,
    pub uti: String,
    pub mime_type: String,
    pub total_bytes: i64,
    pub is_sticker: bool,
    /// Absolute path after home-directory expansion.
    pub original_path: String,
    /// True when `original_path` is not an existing regular file.
    pub missing: bool,
}

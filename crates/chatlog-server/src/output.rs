//! JSON-lines payloads written to stdout.

use chatlog_db::attachments::display_name;
use chatlog_db::{ChatCache, Database};
use chatlog_types::{AttachmentMeta, Chat, Message, Reaction, WatchEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ChatOutput {
    pub id: i64,
    pub name: String,
    pub identifier: String,
    pub guid: String,
    pub service: String,
    pub last_message_at: DateTime<Utc>,
    pub participants: Vec<String>,
}

impl ChatOutput {
    pub fn load(db: &Database, cache: &ChatCache, chat: Chat) -> chatlog_db::Result<Self> {
        let guid = cache.info(db, chat.id)?.map(|info| info.guid).unwrap_or_default();
        let participants = cache.participants(db, chat.id)?;
        Ok(Self {
            id: chat.id,
            name: chat.name().to_string(),
            identifier: chat.identifier,
            guid,
            service: chat.service,
            last_message_at: chat.last_message_at,
            participants,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AttachmentOutput {
    pub name: String,
    #[serde(flatten)]
    pub meta: AttachmentMeta,
}

#[derive(Debug, Serialize)]
pub struct ReactionOutput {
    pub kind: &'static str,
    pub emoji: String,
    #[serde(flatten)]
    pub reaction: Reaction,
}

#[derive(Debug, Serialize)]
pub struct MessageOutput {
    #[serde(flatten)]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentOutput>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<ReactionOutput>>,
}

impl MessageOutput {
    pub fn plain(message: Message) -> Self {
        Self {
            message,
            attachments: None,
            reactions: None,
        }
    }

    /// Adds attachment metadata and current reactions. Reaction event rows
    /// have neither.
    pub fn detailed(db: &Database, message: Message) -> chatlog_db::Result<Self> {
        if message.is_reaction {
            return Ok(Self::plain(message));
        }

        let attachments = if message.attachments_count > 0 {
            db.attachments(message.row_id)?
        } else {
            Vec::new()
        };
        let reactions = db.reactions(message.row_id)?;

        Ok(Self {
            attachments: Some(attachments.into_iter().map(AttachmentOutput::from).collect()),
            reactions: Some(reactions.into_iter().map(ReactionOutput::from).collect()),
            message,
        })
    }
}

impl From<AttachmentMeta> for AttachmentOutput {
    fn from(meta: AttachmentMeta) -> Self {
        Self {
            name: display_name(&meta.filename, &meta.transfer_name).to_string(),
            meta,
        }
    }
}

impl From<Reaction> for ReactionOutput {
    fn from(reaction: Reaction) -> Self {
        Self {
            kind: reaction.reaction_type.name(),
            emoji: reaction.reaction_type.emoji().to_string(),
            reaction,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventOutput {
    Message(MessageOutput),
    Reaction(MessageOutput),
    Error { message: String, fatal: bool },
}

impl EventOutput {
    pub fn plain(event: WatchEvent) -> Self {
        match event {
            WatchEvent::Message(message) => Self::Message(MessageOutput::plain(message)),
            WatchEvent::Reaction(message) => Self::Reaction(MessageOutput::plain(message)),
            WatchEvent::Error { message, fatal } => Self::Error { message, fatal },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlog_types::ReactionType;

    fn message() -> Message {
        Message {
            row_id: 42,
            chat_id: 1,
            sender: "+15550001".into(),
            text: "hello".into(),
            date: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            is_from_me: false,
            service: "iMessage".into(),
            handle_id: Some(1),
            attachments_count: 1,
            guid: "G42".into(),
            reply_to_guid: None,
            thread_originator_guid: None,
            destination_caller_id: None,
            is_reaction: false,
            reaction_type: None,
            is_reaction_add: None,
            reacted_to_guid: None,
        }
    }

    #[test]
    fn plain_message_is_flat_without_detail_keys() {
        let value = serde_json::to_value(MessageOutput::plain(message())).unwrap();
        assert_eq!(value["row_id"], 42);
        assert_eq!(value["text"], "hello");
        assert!(value.get("attachments").is_none());
        assert!(value.get("reactions").is_none());
        assert!(value.get("is_reaction").is_none());
    }

    #[test]
    fn detail_entries_carry_presentation_fields() {
        let attachment = AttachmentOutput::from(AttachmentMeta {
            filename: "/tmp/IMG_0001.HEIC".into(),
            transfer_name: String::new(),
            uti: "public.heic".into(),
            mime_type: "image/heic".into(),
            total_bytes: 10,
            is_sticker: false,
            original_path: "/tmp/IMG_0001.HEIC".into(),
            missing: true,
        });
        let reaction = ReactionOutput::from(Reaction {
            row_id: 43,
            reaction_type: ReactionType::Custom("🎉".into()),
            sender: "+15550002".into(),
            is_from_me: false,
            date: DateTime::from_timestamp(1_700_000_001, 0).unwrap(),
            associated_message_id: 42,
        });

        let output = MessageOutput {
            attachments: Some(vec![attachment]),
            reactions: Some(vec![reaction]),
            ..MessageOutput::plain(message())
        };
        let value = serde_json::to_value(output).unwrap();

        assert_eq!(value["attachments"][0]["name"], "/tmp/IMG_0001.HEIC");
        assert_eq!(value["attachments"][0]["missing"], true);
        assert_eq!(value["reactions"][0]["kind"], "custom");
        assert_eq!(value["reactions"][0]["emoji"], "🎉");
        assert_eq!(value["reactions"][0]["associated_message_id"], 42);
    }

    #[test]
    fn events_are_tagged() {
        let event = EventOutput::plain(WatchEvent::Message(message()));
        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["data"]["guid"], "G42");

        let error = EventOutput::plain(WatchEvent::Error {
            message: "database is locked".into(),
            fatal: false,
        });
        let value = serde_json::to_value(error).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"]["fatal"], false);
    }
}

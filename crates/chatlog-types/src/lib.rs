pub mod events;
pub mod models;

pub use events::WatchEvent;
pub use models::{AttachmentMeta, Chat, ChatInfo, Message, Reaction, ReactionType};

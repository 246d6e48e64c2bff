use rusqlite::Connection;
use std::collections::HashSet;

/// Optional columns detected on the store at open time.
///
/// The Messages schema drifts between OS releases, so every column that is
/// not present in all known versions is probed here once and the result is
/// threaded through query building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `message.attributedBody`, the serialized rich-text body.
    pub attributed_body: bool,
    /// `message.guid`, `associated_message_guid` and `associated_message_type`.
    pub reaction_columns: bool,
    pub message_guid: bool,
    pub reply_to_guid: bool,
    pub thread_originator_guid: bool,
    pub destination_caller_id: bool,
    pub chat_guid: bool,
}

impl Capabilities {
    pub fn probe(conn: &Connection) -> rusqlite::Result<Self> {
        let message = table_columns(conn, "message")?;
        let chat = table_columns(conn, "chat")?;

        let message_guid = message.contains("guid");
        Ok(Self {
            attributed_body: message.contains("attributedbody"),
            reaction_columns: message_guid
                && message.contains("associated_message_guid")
                && message.contains("associated_message_type"),
            message_guid,
            reply_to_guid: message.contains("reply_to_guid"),
            thread_originator_guid: message.contains("thread_originator_guid"),
            destination_caller_id: message.contains("destination_caller_id"),
            chat_guid: chat.contains("guid"),
        })
    }
}

/// Lower-cased column names. A missing table yields an empty set.
fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .map(|name| name.map(|n| n.to_lowercase()))
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(names)
}

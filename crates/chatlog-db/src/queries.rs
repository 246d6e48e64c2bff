use std::collections::HashSet;

use chatlog_types::{AttachmentMeta, Chat, ChatInfo, Message};
use rusqlite::types::ToSql;
use tracing::debug;

use crate::attachments;
use crate::capabilities::Capabilities;
use crate::filter::MessageFilter;
use crate::models::{MessageRow, bool_at, int_at, opt_text_at, text_at};
use crate::reactions::{EventCode, EventKind, event_code_predicate, strip_part_prefix};
use crate::time::{from_apple, to_apple};
use crate::typedstream::decode_attributed_body;
use crate::{Database, Result};

impl Database {
    // -- Chats --

    /// Chats ordered by their most recent message, newest first.
    pub fn list_chats(&self, limit: usize) -> Result<Vec<Chat>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.ROWID, c.chat_identifier, c.display_name, c.service_name,
                     MAX(m.date) AS last_date
                 FROM chat c
                 JOIN chat_message_join cmj ON c.ROWID = cmj.chat_id
                 JOIN message m ON m.ROWID = cmj.message_id
                 GROUP BY c.ROWID
                 ORDER BY last_date DESC
                 LIMIT ?1",
            )?;

            let chats = stmt
                .query_map([sql_limit(limit)], |row| {
                    Ok(Chat {
                        id: int_at(row, 0)?.unwrap_or(0),
                        identifier: text_at(row, 1)?,
                        display_name: opt_text_at(row, 2)?,
                        service: text_at(row, 3)?,
                        last_message_at: from_apple(int_at(row, 4)?),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(chats)
        })
    }

    pub fn chat_info(&self, chat_id: i64) -> Result<Option<ChatInfo>> {
        let guid = if self.capabilities().chat_guid { "c.guid" } else { "NULL" };
        let sql = format!(
            "SELECT c.chat_identifier, {guid}, c.display_name, c.service_name
             FROM chat c
             WHERE c.ROWID = ?1"
        );

        self.with_conn(|conn| {
            conn.query_row(&sql, [chat_id], |row| {
                Ok(ChatInfo {
                    id: chat_id,
                    identifier: text_at(row, 0)?,
                    guid: text_at(row, 1)?,
                    name: text_at(row, 2)?,
                    service: text_at(row, 3)?,
                })
            })
            .optional()
        })
    }

    /// Distinct handle identifiers in a chat, in handle order.
    pub fn participants(&self, chat_id: i64) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT h.id
                 FROM chat_handle_join chj
                 JOIN handle h ON h.ROWID = chj.handle_id
                 WHERE chj.chat_id = ?1
                 ORDER BY h.ROWID ASC",
            )?;

            let ids = stmt
                .query_map([chat_id], |row| text_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut seen = HashSet::new();
            Ok(ids
                .into_iter()
                .filter(|id| !id.is_empty() && seen.insert(id.clone()))
                .collect())
        })
    }

    // -- Messages --

    /// Newest-first history of a chat, without reaction event rows.
    ///
    /// The filter's time window is applied in SQL; its participant list is
    /// applied to the decoded rows, so fewer than `limit` may come back.
    pub fn messages(
        &self,
        chat_id: i64,
        limit: usize,
        filter: &MessageFilter,
    ) -> Result<Vec<Message>> {
        let caps = self.capabilities();
        let mut sql = format!(
            "SELECT {}
             FROM message m
             JOIN chat_message_join cmj ON m.ROWID = cmj.message_id
             LEFT JOIN handle h ON m.handle_id = h.ROWID
             WHERE cmj.chat_id = :chat_id{}",
            message_columns(&caps),
            exclude_reaction_events(&caps),
        );

        let start = filter.start_bound().map(to_apple);
        let end = filter.end_bound().map(to_apple);
        let limit = sql_limit(limit);
        let mut params: Vec<(&str, &dyn ToSql)> = vec![
            (":chat_id", &chat_id as &dyn ToSql),
            (":limit", &limit as &dyn ToSql),
        ];
        if let Some(start) = &start {
            sql.push_str(" AND m.date >= :start");
            params.push((":start", start as &dyn ToSql));
        }
        if let Some(end) = &end {
            sql.push_str(" AND m.date < :end");
            params.push((":end", end as &dyn ToSql));
        }
        sql.push_str(" ORDER BY m.date DESC, m.ROWID DESC LIMIT :limit");

        let rows = self.query_messages(&sql, &params)?;
        Ok(rows
            .into_iter()
            .map(|row| resolve_message(row, Some(chat_id)))
            .filter(|message| filter.allows(message))
            .collect())
    }

    /// Messages with row id greater than `after_row_id`, ascending, without
    /// reaction event rows.
    ///
    /// Each row comes back once. Without `chat_id`, a message joined to
    /// several chats reports one of them.
    pub fn messages_after(
        &self,
        after_row_id: i64,
        chat_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        self.rows_after(after_row_id, chat_id, limit, false)
    }

    /// Like `messages_after`, but reaction add/remove rows are included and
    /// carry their reaction metadata.
    pub fn events_after(
        &self,
        after_row_id: i64,
        chat_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        self.rows_after(after_row_id, chat_id, limit, true)
    }

    fn rows_after(
        &self,
        after_row_id: i64,
        chat_id: Option<i64>,
        limit: usize,
        include_reactions: bool,
    ) -> Result<Vec<Message>> {
        let caps = self.capabilities();
        let mut sql = format!(
            "SELECT {}
             FROM message m
             LEFT JOIN chat_message_join cmj ON m.ROWID = cmj.message_id
             LEFT JOIN handle h ON m.handle_id = h.ROWID
             WHERE m.ROWID > :after",
            message_columns(&caps),
        );
        if !include_reactions {
            sql.push_str(&exclude_reaction_events(&caps));
        }

        let limit = sql_limit(limit);
        let mut params: Vec<(&str, &dyn ToSql)> = vec![
            (":after", &after_row_id as &dyn ToSql),
            (":limit", &limit as &dyn ToSql),
        ];
        match &chat_id {
            Some(chat_id) => {
                sql.push_str(" AND cmj.chat_id = :chat_id");
                params.push((":chat_id", chat_id as &dyn ToSql));
            }
            None => sql.push_str(" GROUP BY m.ROWID"),
        }
        sql.push_str(" ORDER BY m.ROWID ASC LIMIT :limit");

        let rows = self.query_messages(&sql, &params)?;
        debug!(after_row_id, count = rows.len(), "Fetched rows after watermark");
        Ok(rows.into_iter().map(|row| resolve_message(row, chat_id)).collect())
    }

    fn query_messages(
        &self,
        sql: &str,
        params: &[(&str, &dyn ToSql)],
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Attachments --

    pub fn attachments(&self, message_id: i64) -> Result<Vec<AttachmentMeta>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.filename, a.transfer_name, a.uti, a.mime_type, a.total_bytes, a.is_sticker
                 FROM message_attachment_join maj
                 JOIN attachment a ON a.ROWID = maj.attachment_id
                 WHERE maj.message_id = ?1",
            )?;

            let metas = stmt
                .query_map([message_id], |row| {
                    let filename = text_at(row, 0)?;
                    let resolved = attachments::resolve(&filename);
                    Ok(AttachmentMeta {
                        filename,
                        transfer_name: text_at(row, 1)?,
                        uti: text_at(row, 2)?,
                        mime_type: text_at(row, 3)?,
                        total_bytes: int_at(row, 4)?.unwrap_or(0),
                        is_sticker: bool_at(row, 5)?,
                        original_path: resolved.path,
                        missing: resolved.missing,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(metas)
        })
    }

    // -- Watermark --

    /// Highest message row id, or 0 on an empty store.
    pub fn max_row_id(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let value =
                conn.query_row("SELECT MAX(ROWID) FROM message", [], |row| int_at(row, 0))?;
            Ok(value.unwrap_or(0))
        })
    }
}

/// Select list read by `MessageRow::from_row`. Missing optional columns are
/// selected as NULL so the column positions never move.
fn message_columns(caps: &Capabilities) -> String {
    let column = |present: bool, name: &'static str| if present { name } else { "NULL" };
    format!(
        "m.ROWID, cmj.chat_id, m.handle_id, h.id, IFNULL(m.text, ''), m.date,
             m.is_from_me, m.service,
         (SELECT COUNT(*) FROM message_attachment_join maj WHERE maj.message_id = m.ROWID),
         {}, {}, {}, {}, {}, {}, {}",
        column(caps.attributed_body, "m.attributedBody"),
        column(caps.message_guid, "m.guid"),
        column(caps.reply_to_guid, "m.reply_to_guid"),
        column(caps.thread_originator_guid, "m.thread_originator_guid"),
        column(caps.destination_caller_id, "m.destination_caller_id"),
        column(caps.reaction_columns, "m.associated_message_type"),
        column(caps.reaction_columns, "m.associated_message_guid"),
    )
}

fn exclude_reaction_events(caps: &Capabilities) -> String {
    if !caps.reaction_columns {
        return String::new();
    }
    format!(
        " AND (m.associated_message_type IS NULL OR NOT {})",
        event_code_predicate("m.associated_message_type")
    )
}

fn resolve_message(row: MessageRow, chat_id: Option<i64>) -> Message {
    let text = if row.text.is_empty() {
        decode_attributed_body(&row.body)
    } else {
        row.text
    };

    // Self-sent rows often have no handle; the caller id is the best name.
    let sender = if row.handle.is_empty() {
        row.destination_caller_id.clone().unwrap_or_default()
    } else {
        row.handle
    };

    let event = row.associated_type.and_then(EventCode::classify);

    Message {
        row_id: row.row_id,
        chat_id: row.chat_id.or(chat_id).unwrap_or(0),
        sender,
        date: from_apple(row.date),
        is_from_me: row.is_from_me,
        service: row.service,
        handle_id: row.handle_id,
        attachments_count: u32::try_from(row.attachments).unwrap_or(0),
        guid: row.guid,
        reply_to_guid: row.reply_to_guid,
        thread_originator_guid: row.thread_originator_guid,
        destination_caller_id: row.destination_caller_id,
        is_reaction: event.is_some(),
        reaction_type: event.and_then(|code| code.reaction_type(&text)),
        is_reaction_add: event.map(|code| code.kind == EventKind::Add),
        reacted_to_guid: event
            .map(|_| strip_part_prefix(&row.associated_guid).to_string())
            .filter(|guid| !guid.is_empty()),
        text,
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

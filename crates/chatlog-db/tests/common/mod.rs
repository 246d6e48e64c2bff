//! On-disk Messages store fixture.
//!
//! Writes go through a separate writable connection; the code under test
//! opens the same file read-only, the way it would open the real store.

#![allow(dead_code)]

use std::path::PathBuf;

use chatlog_db::Database;
use rusqlite::{Connection, params};
use tempfile::TempDir;

const SCHEMA: &str = "
    CREATE TABLE handle (
        ROWID       INTEGER PRIMARY KEY,
        id          TEXT NOT NULL,
        service     TEXT
    );

    CREATE TABLE chat (
        ROWID           INTEGER PRIMARY KEY,
        guid            TEXT,
        chat_identifier TEXT,
        display_name    TEXT,
        service_name    TEXT
    );

    CREATE TABLE message (
        ROWID                   INTEGER PRIMARY KEY AUTOINCREMENT,
        guid                    TEXT,
        text                    TEXT,
        attributedBody          BLOB,
        handle_id               INTEGER DEFAULT 0,
        date                    INTEGER,
        is_from_me              INTEGER DEFAULT 0,
        service                 TEXT,
        associated_message_guid TEXT,
        associated_message_type INTEGER DEFAULT 0,
        reply_to_guid           TEXT,
        thread_originator_guid  TEXT,
        destination_caller_id   TEXT
    );

    CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
    CREATE TABLE chat_handle_join (chat_id INTEGER, handle_id INTEGER);

    CREATE TABLE attachment (
        ROWID           INTEGER PRIMARY KEY,
        filename        TEXT,
        transfer_name   TEXT,
        uti             TEXT,
        mime_type       TEXT,
        total_bytes     INTEGER,
        is_sticker      INTEGER DEFAULT 0
    );

    CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);
";

/// Older stores: no rich-text body, no guids, no reaction columns.
const LEGACY_SCHEMA: &str = "
    CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT NOT NULL, service TEXT);
    CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, chat_identifier TEXT,
        display_name TEXT, service_name TEXT);
    CREATE TABLE message (
        ROWID       INTEGER PRIMARY KEY AUTOINCREMENT,
        text        TEXT,
        handle_id   INTEGER DEFAULT 0,
        date        INTEGER,
        is_from_me  INTEGER DEFAULT 0,
        service     TEXT
    );
    CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
    CREATE TABLE chat_handle_join (chat_id INTEGER, handle_id INTEGER);
    CREATE TABLE attachment (
        ROWID INTEGER PRIMARY KEY, filename TEXT, transfer_name TEXT, uti TEXT,
        mime_type TEXT, total_bytes INTEGER, is_sticker INTEGER DEFAULT 0
    );
    CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);
";

const NANOS: i64 = 1_000_000_000;

/// A message to insert. `date_secs` counts seconds since the store epoch.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub chat_id: Option<i64>,
    pub guid: String,
    pub text: Option<String>,
    pub body: Option<Vec<u8>>,
    pub handle_id: i64,
    pub date_secs: i64,
    pub is_from_me: bool,
    pub associated_type: i64,
    pub associated_guid: Option<String>,
    pub reply_to_guid: Option<String>,
    pub destination_caller_id: Option<String>,
}

impl NewMessage {
    pub fn text(chat_id: i64, handle_id: i64, date_secs: i64, text: &str) -> Self {
        Self {
            chat_id: Some(chat_id),
            handle_id,
            date_secs,
            text: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn reaction(chat_id: i64, handle_id: i64, date_secs: i64, code: i64, target: &str) -> Self {
        Self {
            chat_id: Some(chat_id),
            handle_id,
            date_secs,
            associated_type: code,
            associated_guid: Some(target.to_string()),
            ..Self::default()
        }
    }

    pub fn guid(mut self, guid: &str) -> Self {
        self.guid = guid.to_string();
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.text = None;
        self.body = Some(body);
        self
    }

    pub fn from_me(mut self, caller_id: &str) -> Self {
        self.is_from_me = true;
        self.handle_id = 0;
        self.destination_caller_id = Some(caller_id.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }
}

pub struct Store {
    _dir: TempDir,
    path: PathBuf,
    writer: Connection,
    legacy: bool,
}

impl Store {
    pub fn new() -> Self {
        Self::with_schema(SCHEMA, false)
    }

    pub fn legacy() -> Self {
        Self::with_schema(LEGACY_SCHEMA, true)
    }

    fn with_schema(schema: &str, legacy: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let writer = Connection::open(&path).unwrap();
        writer.execute_batch(schema).unwrap();
        Self {
            _dir: dir,
            path,
            writer,
            legacy,
        }
    }

    pub fn path(&self) -> &str {
        self.path.to_str().unwrap()
    }

    pub fn dir(&self) -> &std::path::Path {
        self._dir.path()
    }

    pub fn open(&self) -> Database {
        Database::open(self.path()).unwrap()
    }

    pub fn chat(&self, id: i64, identifier: &str, display_name: Option<&str>) {
        if self.legacy {
            self.writer
                .execute(
                    "INSERT INTO chat (ROWID, chat_identifier, display_name,
                         service_name) VALUES (?1, ?2, ?3, 'iMessage')",
                    params![id, identifier, display_name],
                )
                .unwrap();
        } else {
            self.writer
                .execute(
                    "INSERT INTO chat (ROWID, guid, chat_identifier, display_name, service_name)
                     VALUES (?1, ?2, ?3, ?4, 'iMessage')",
                    params![id, format!("iMessage;-;{identifier}"), identifier, display_name],
                )
                .unwrap();
        }
    }

    pub fn handle(&self, id: i64, identifier: &str) {
        self.writer
            .execute(
                "INSERT INTO handle (ROWID, id, service) VALUES (?1, ?2, 'iMessage')",
                params![id, identifier],
            )
            .unwrap();
    }

    pub fn member(&self, chat_id: i64, handle_id: i64) {
        self.writer
            .execute(
                "INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (?1, ?2)",
                params![chat_id, handle_id],
            )
            .unwrap();
    }

    /// Inserts a message and returns its row id.
    pub fn message(&self, message: NewMessage) -> i64 {
        let date = message.date_secs * NANOS;
        if self.legacy {
            self.writer
                .execute(
                    "INSERT INTO message (text, handle_id, date, is_from_me,
                         service) VALUES (?1, ?2, ?3, ?4, 'iMessage')",
                    params![message.text, message.handle_id, date, message.is_from_me],
                )
                .unwrap();
        } else {
            self.writer
                .execute(
                    "INSERT INTO message (
                        guid, text, attributedBody, handle_id, date, is_from_me, service,
                        associated_message_guid, associated_message_type, reply_to_guid,
                            destination_caller_id
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'iMessage', ?7, ?8, ?9, ?10)",
                    params![
                        message.guid,
                        message.text,
                        message.body,
                        message.handle_id,
                        date,
                        message.is_from_me,
                        message.associated_guid,
                        message.associated_type,
                        message.reply_to_guid,
                        message.destination_caller_id,
                    ],
                )
                .unwrap();
        }

        let row_id = self.writer.last_insert_rowid();
        if let Some(chat_id) = message.chat_id {
            self.writer
                .execute(
                    "INSERT INTO chat_message_join (chat_id, message_id) VALUES (?1, ?2)",
                    params![chat_id, row_id],
                )
                .unwrap();
        }
        row_id
    }

    pub fn attachment(
        &self,
        message_id: i64,
        attachment_id: i64,
        filename: &str,
        transfer_name: &str,
    ) {
        self.writer
            .execute(
                "INSERT INTO attachment (ROWID, filename, transfer_name, uti, mime_type,
                     total_bytes, is_sticker)
                 VALUES (?1, ?2, ?3, 'public.jpeg', 'image/jpeg', 2048, 0)",
                params![attachment_id, filename, transfer_name],
            )
            .unwrap();
        self.writer
            .execute(
                "INSERT INTO message_attachment_join (message_id, attachment_id) VALUES (?1, ?2)",
                params![message_id, attachment_id],
            )
            .unwrap();
    }

    pub fn execute(&self, sql: &str) {
        self.writer.execute_batch(sql).unwrap();
    }
}

/// A realistic `streamtyped` attributed-string blob carrying `text`.
pub fn typed_stream(text: &str) -> Vec<u8> {
    let mut blob = b"\x04\x0bstreamtyped\x81\xe8\x03\x84\x01@\x84\x84\x84".to_vec();
    blob.extend_from_slice(b"\x12NSAttributedString\x00\x84\x84\x08NSObject\x00\x85\x92");
    blob.extend_from_slice(b"\x84\x84\x84\x08NSString\x01\x94\x84\x01\x2b");

    let bytes = text.as_bytes();
    if bytes.len() < 0x80 {
        blob.push(bytes.len() as u8);
    } else {
        blob.push(0x81);
        blob.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    }
    blob.extend_from_slice(bytes);

    blob.extend_from_slice(b"\x86\x84\x02iI\x01\x05\x92\x84\x84\x84\x0cNSDictionary\x00");
    blob.extend_from_slice(b"\x94\x84\x01i\x01\x92\x84\x96\x96\x1d__kIMMessagePartAttributeName");
    blob.extend_from_slice(b"\x86\x92\x84\x84\x84\x08NSNumber\x00\x84\x84\x07NSValue\x00");
    blob.extend_from_slice(b"\x94\x84\x01*\x84\x99\x99\x00\x86\x86\x86");
    blob
}

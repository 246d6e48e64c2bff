//! Raw row types and column normalization.
//!
//! Store columns are loosely typed: dates may come back as integers or
//! reals, flags as integers, text columns as NULL. These helpers read a
//! column by position and normalize whatever storage class it has.

use rusqlite::Row;
use rusqlite::types::ValueRef;

pub(crate) struct MessageRow {
    pub row_id: i64,
    pub chat_id: Option<i64>,
    pub handle_id: Option<i64>,
    pub handle: String,
    pub text: String,
    pub date: Option<i64>,
    pub is_from_me: bool,
    pub service: String,
    pub attachments: i64,
    pub body: Vec<u8>,
    pub guid: String,
    pub reply_to_guid: Option<String>,
    pub thread_originator_guid: Option<String>,
    pub destination_caller_id: Option<String>,
    pub associated_type: Option<i64>,
    pub associated_guid: String,
}

impl MessageRow {
    /// Column order must match `queries::message_columns`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            row_id: int_at(row, 0)?.unwrap_or(0),
            chat_id: int_at(row, 1)?,
            handle_id: int_at(row, 2)?,
            handle: text_at(row, 3)?,
            text: text_at(row, 4)?,
            date: int_at(row, 5)?,
            is_from_me: bool_at(row, 6)?,
            service: text_at(row, 7)?,
            attachments: int_at(row, 8)?.unwrap_or(0),
            body: blob_at(row, 9)?,
            guid: text_at(row, 10)?,
            reply_to_guid: opt_text_at(row, 11)?,
            thread_originator_guid: opt_text_at(row, 12)?,
            destination_caller_id: opt_text_at(row, 13)?,
            associated_type: int_at(row, 14)?,
            associated_guid: text_at(row, 15)?,
        })
    }
}

pub(crate) struct ReactionRow {
    pub row_id: i64,
    pub associated_type: i64,
    pub associated_guid: String,
    pub target_guid: String,
    pub sender: String,
    pub is_from_me: bool,
    pub date: Option<i64>,
    pub text: String,
    pub body: Vec<u8>,
}

pub(crate) fn int_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(value) => Some(value),
        ValueRef::Real(value) => Some(value as i64),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse().ok()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    })
}

/// NULL reads as the empty string.
pub(crate) fn text_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Integer(value) => value.to_string(),
        ValueRef::Real(value) => value.to_string(),
        ValueRef::Null | ValueRef::Blob(_) => String::new(),
    })
}

/// NULL and empty both read as `None`.
pub(crate) fn opt_text_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    let value = text_at(row, idx)?;
    Ok((!value.is_empty()).then_some(value))
}

pub(crate) fn bool_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    Ok(int_at(row, idx)?.is_some_and(|value| value != 0))
}

pub(crate) fn blob_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<u8>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Blob(bytes) => bytes.to_vec(),
        _ => Vec::new(),
    })
}

//! Tapback reconciliation.
//!
//! Reactions are not stored as state. Each add or remove is its own message
//! row whose `associated_message_type` encodes the kind and whose
//! `associated_message_guid` points at the target (`p:<part>/<guid>`).
//! Current state is a fold over those rows in timestamp order.

use chatlog_types::{Reaction, ReactionType};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use tracing::debug;

use crate::models::{ReactionRow, blob_at, bool_at, int_at, text_at};
use crate::time::from_apple;
use crate::typedstream::decode_attributed_body;
use crate::{Database, Result};

/// love, like, dislike, laugh, emphasis, question, custom emoji.
pub const ADD_CODES: RangeInclusive<i64> = 2000..=2006;
/// A remove code is its add code plus this offset.
pub const REMOVE_OFFSET: i64 = 1000;
pub const CUSTOM_ADD_CODE: i64 = 2006;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Add,
    Remove,
}

/// A classified `associated_message_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCode {
    pub kind: EventKind,
    add_code: i64,
}

impl EventCode {
    pub fn classify(code: i64) -> Option<Self> {
        if ADD_CODES.contains(&code) {
            return Some(Self {
                kind: EventKind::Add,
                add_code: code,
            });
        }
        let add_code = code - REMOVE_OFFSET;
        ADD_CODES.contains(&add_code).then_some(Self {
            kind: EventKind::Remove,
            add_code,
        })
    }

    pub fn is_custom(&self) -> bool {
        self.add_code == CUSTOM_ADD_CODE
    }

    /// Resolves the reaction type. Custom reactions read their emoji out of
    /// the event text and resolve to `None` when none can be found.
    pub fn reaction_type(&self, text: &str) -> Option<ReactionType> {
        match self.add_code {
            2000 => Some(ReactionType::Love),
            2001 => Some(ReactionType::Like),
            2002 => Some(ReactionType::Dislike),
            2003 => Some(ReactionType::Laugh),
            2004 => Some(ReactionType::Emphasis),
            2005 => Some(ReactionType::Question),
            CUSTOM_ADD_CODE => extract_custom_emoji(text).map(ReactionType::Custom),
            _ => None,
        }
    }
}

/// SQL predicate matching every reaction event row.
pub(crate) fn event_code_predicate(column: &str) -> String {
    let (add_lo, add_hi) = (*ADD_CODES.start(), *ADD_CODES.end());
    format!(
        "({column} BETWEEN {add_lo} AND {add_hi} OR {column} BETWEEN {} AND {})",
        add_lo + REMOVE_OFFSET,
        add_hi + REMOVE_OFFSET,
    )
}

/// Removes a leading `p:<n>/` part marker from an associated guid.
pub fn strip_part_prefix(reference: &str) -> &str {
    if let Some(rest) = reference.strip_prefix("p:") {
        if let Some((part, guid)) = rest.split_once('/') {
            if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
                return guid;
            }
        }
    }
    reference
}

/// Whether an event's associated reference points at `guid`, with or
/// without the part marker.
pub fn targets(reference: &str, guid: &str) -> bool {
    !guid.is_empty() && (reference == guid || strip_part_prefix(reference) == guid)
}

/// One reaction add/remove row.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub row_id: i64,
    pub code: EventCode,
    pub sender: String,
    pub is_from_me: bool,
    pub date: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReactionKey {
    sender: String,
    is_from_me: bool,
    reaction_type: ReactionType,
}

impl ReactionKey {
    fn of(reaction: &Reaction) -> Self {
        Self {
            sender: reaction.sender.clone(),
            is_from_me: reaction.is_from_me,
            reaction_type: reaction.reaction_type.clone(),
        }
    }
}

/// Current reactions of one message, in first-add order.
#[derive(Debug, Clone)]
pub struct ReactionSet {
    target: i64,
    reactions: Vec<Reaction>,
    index: HashMap<ReactionKey, usize>,
}

impl ReactionSet {
    pub fn new(target_message_id: i64) -> Self {
        Self {
            target: target_message_id,
            reactions: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn apply(&mut self, event: ReactionEvent) {
        match event.code.kind {
            EventKind::Add => self.add(event),
            EventKind::Remove => self.remove(event),
        }
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn into_reactions(self) -> Vec<Reaction> {
        self.reactions
    }

    fn add(&mut self, event: ReactionEvent) {
        let Some(reaction_type) = event.code.reaction_type(&event.text) else {
            debug!(row_id = event.row_id, "Skipping custom reaction without an emoji");
            return;
        };

        let reaction = Reaction {
            row_id: event.row_id,
            reaction_type,
            sender: event.sender,
            is_from_me: event.is_from_me,
            date: event.date,
            associated_message_id: self.target,
        };
        let key = ReactionKey::of(&reaction);

        match self.index.get(&key) {
            Some(&position) => self.reactions[position] = reaction,
            None => {
                self.index.insert(key, self.reactions.len());
                self.reactions.push(reaction);
            }
        }
    }

    fn remove(&mut self, event: ReactionEvent) {
        let position = match event.code.reaction_type(&event.text) {
            Some(reaction_type) => self
                .index
                .get(&ReactionKey {
                    sender: event.sender,
                    is_from_me: event.is_from_me,
                    reaction_type,
                })
                .copied(),
            // Custom removes often omit the emoji. Best effort: drop the
            // sender's first custom reaction.
            None if event.code.is_custom() => self.reactions.iter().position(|r| {
                r.sender == event.sender
                    && r.is_from_me == event.is_from_me
                    && r.reaction_type.is_custom()
            }),
            None => None,
        };

        if let Some(position) = position {
            self.reactions.remove(position);
            self.reindex();
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .reactions
            .iter()
            .enumerate()
            .map(|(position, reaction)| (ReactionKey::of(reaction), position))
            .collect();
    }
}

/// Replays events (already in ascending time order) into current reactions.
pub fn reconcile<I>(target_message_id: i64, events: I) -> Vec<Reaction>
where
    I: IntoIterator<Item = ReactionEvent>,
{
    events
        .into_iter()
        .fold(ReactionSet::new(target_message_id), |mut set, event| {
            set.apply(event);
            set
        })
        .into_reactions()
}

/// Custom reaction text reads `Reacted 🎉 to "..."`. Falls back to the first
/// emoji anywhere in the text.
pub fn extract_custom_emoji(text: &str) -> Option<String> {
    const PREFIX: &str = "Reacted ";

    if let Some(start) = text.find(PREFIX) {
        let after = &text[start + PREFIX.len()..];
        if let Some(end) = after.find(" to ") {
            let emoji = after[..end].trim();
            if !emoji.is_empty() {
                return Some(emoji.to_string());
            }
        }
    }

    first_emoji(text)
}

const ZERO_WIDTH_JOINER: char = '\u{200D}';

/// First emoji in `text`, keeping its modifiers, ZWJ sequence or flag pair
/// together as one grapheme.
fn first_emoji(text: &str) -> Option<String> {
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if !is_emoji(c) {
            continue;
        }

        let mut end = start + c.len_utf8();
        let mut after_joiner = false;
        let mut open_flag = is_regional_indicator(c);

        while let Some(&(idx, next)) = chars.peek() {
            let take = if after_joiner {
                after_joiner = false;
                is_emoji(next)
            } else if next == ZERO_WIDTH_JOINER {
                after_joiner = true;
                true
            } else if open_flag && is_regional_indicator(next) {
                open_flag = false;
                true
            } else {
                is_emoji_modifier(next)
            };
            if !take {
                break;
            }
            end = idx + next.len_utf8();
            chars.next();
        }

        return Some(text[start..end].trim_end_matches(ZERO_WIDTH_JOINER).to_string());
    }

    None
}

fn is_emoji(c: char) -> bool {
    matches!(
        u32::from(c),
        0x00A9
            | 0x00AE
            | 0x203C
            | 0x2049
            | 0x2122
            | 0x2139
            | 0x2194..=0x2199
            | 0x21A9..=0x21AA
            | 0x231A..=0x231B
            | 0x2328
            | 0x23CF
            | 0x23E9..=0x23F3
            | 0x23F8..=0x23FA
            | 0x24C2
            | 0x25AA..=0x25AB
            | 0x25B6
            | 0x25C0
            | 0x25FB..=0x25FE
            | 0x2600..=0x27BF
            | 0x2934..=0x2935
            | 0x2B05..=0x2B07
            | 0x2B1B..=0x2B1C
            | 0x2B50
            | 0x2B55
            | 0x3030
            | 0x303D
            | 0x3297
            | 0x3299
            | 0x1F000..=0x1FAFF
    )
}

fn is_regional_indicator(c: char) -> bool {
    matches!(u32::from(c), 0x1F1E6..=0x1F1FF)
}

/// Variation selectors, skin tones, keycap and tag characters.
fn is_emoji_modifier(c: char) -> bool {
    matches!(
        u32::from(c),
        0xFE0E | 0xFE0F | 0x1F3FB..=0x1F3FF | 0x20E3 | 0xE0020..=0xE007F
    )
}

impl Database {
    /// Current reactions on a message. Empty when the store has no reaction
    /// columns.
    pub fn reactions(&self, message_id: i64) -> Result<Vec<Reaction>> {
        let caps = self.capabilities();
        if !caps.reaction_columns {
            return Ok(Vec::new());
        }

        let body = if caps.attributed_body { "r.attributedBody" } else { "NULL" };
        let sender = if caps.destination_caller_id {
            "COALESCE(NULLIF(h.id, ''), r.destination_caller_id, '')"
        } else {
            "IFNULL(h.id, '')"
        };
        let sql = format!(
            "SELECT r.ROWID, r.associated_message_type,
                    IFNULL(r.associated_message_guid, ''), m.guid,
                    {sender}, r.is_from_me, r.date, IFNULL(r.text, ''), {body}
             FROM message m
             JOIN message r
               ON r.associated_message_guid = m.guid
               OR r.associated_message_guid LIKE 'p:%/' || m.guid
             LEFT JOIN handle h ON r.handle_id = h.ROWID
             WHERE m.ROWID = ?1
               AND {}
             ORDER BY r.date ASC, r.ROWID ASC",
            event_code_predicate("r.associated_message_type"),
        );

        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(ReactionRow {
                        row_id: int_at(row, 0)?.unwrap_or(0),
                        associated_type: int_at(row, 1)?.unwrap_or(0),
                        associated_guid: text_at(row, 2)?,
                        target_guid: text_at(row, 3)?,
                        sender: text_at(row, 4)?,
                        is_from_me: bool_at(row, 5)?,
                        date: int_at(row, 6)?,
                        text: text_at(row, 7)?,
                        body: blob_at(row, 8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let events = rows.into_iter().filter_map(|row| {
            if !targets(&row.associated_guid, &row.target_guid) {
                return None;
            }
            let code = EventCode::classify(row.associated_type)?;
            let text = if row.text.is_empty() {
                decode_attributed_body(&row.body)
            } else {
                row.text
            };
            Some(ReactionEvent {
                row_id: row.row_id,
                code,
                sender: row.sender,
                is_from_me: row.is_from_me,
                date: from_apple(row.date),
                text,
            })
        });

        Ok(reconcile(message_id, events))
    }
}

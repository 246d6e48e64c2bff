use chatlog_types::Message;
use chrono::{DateTime, Utc};

use crate::{Result, StoreError};

/// Participant and time-window constraints on messages.
///
/// Participants match the resolved sender case-insensitively. The window is
/// half open: `start <= date < end`. Absent constraints always pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    participants: Vec<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.participants = participants
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Builds a filter from ISO-8601 strings. Empty strings mean "no bound";
    /// anything else that does not parse is rejected.
    pub fn from_iso<S: AsRef<str>>(
        participants: &[S],
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Self> {
        let mut filter = Self::new().with_participants(participants);
        filter.start = start.map(parse_iso).transpose()?.flatten();
        filter.end = end.map(parse_iso).transpose()?.flatten();
        Ok(filter)
    }

    pub fn start_bound(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end_bound(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.start.is_none() && self.end.is_none()
    }

    pub fn allows(&self, message: &Message) -> bool {
        if !self.participants.is_empty() {
            let sender = message.sender.to_lowercase();
            if !self.participants.iter().any(|p| *p == sender) {
                return false;
            }
        }
        if self.start.is_some_and(|start| message.date < start) {
            return false;
        }
        if self.end.is_some_and(|end| message.date >= end) {
            return false;
        }
        true
    }
}

fn parse_iso(value: &str) -> Result<Option<DateTime<Utc>>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|date| Some(date.with_timezone(&Utc)))
        .map_err(|_| StoreError::InvalidIsoDate(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn message(sender: &str, date: DateTime<Utc>) -> Message {
        Message {
            row_id: 1,
            chat_id: 1,
            sender: sender.to_string(),
            text: "hi".into(),
            date,
            is_from_me: false,
            service: "iMessage".into(),
            handle_id: None,
            attachments_count: 0,
            guid: String::new(),
            reply_to_guid: None,
            thread_originator_guid: None,
            destination_caller_id: None,
            is_reaction: false,
            reaction_type: None,
            is_reaction_add: None,
            reacted_to_guid: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_000, 0).unwrap()
    }

    #[test]
    fn empty_filter_allows_everything() {
        let filter = MessageFilter::new();
        assert!(filter.is_empty());
        assert!(filter.allows(&message("anyone", now())));
    }

    #[test]
    fn participants_match_case_insensitively() {
        let filter = MessageFilter::new().with_participants(["alice", " BOB@example.com "]);
        assert!(filter.allows(&message("Alice", now())));
        assert!(filter.allows(&message("bob@Example.com", now())));
        assert!(!filter.allows(&message("carol", now())));
    }

    #[test]
    fn window_is_half_open() {
        let start = now();
        let end = now() + Duration::seconds(10);
        let filter = MessageFilter::new().with_start(start).with_end(end);

        assert!(filter.allows(&message("a", start)));
        assert!(filter.allows(&message("a", end - Duration::nanoseconds(1))));
        assert!(!filter.allows(&message("a", start - Duration::nanoseconds(1))));
        assert!(!filter.allows(&message("a", end)));
    }

    #[test]
    fn honors_participants_and_dates_together() {
        let filter = MessageFilter::new()
            .with_participants(["alice"])
            .with_start(now() - Duration::seconds(10))
            .with_end(now() + Duration::seconds(10));
        assert!(filter.allows(&message("Alice", now())));

        let later = MessageFilter::new().with_start(now() + Duration::seconds(5));
        assert!(!later.allows(&message("Alice", now())));
    }

    #[test]
    fn parses_iso_bounds() {
        let filter = MessageFilter::from_iso(
            &["alice"],
            Some("2024-01-02T03:04:05.678Z"),
            Some("2024-01-03T00:00:00+02:00"),
        )
        .unwrap();
        assert_eq!(
            filter.start_bound(),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() + Duration::milliseconds(678))
        );
        assert_eq!(filter.end_bound(), Some(Utc.with_ymd_and_hms(2024, 1, 2, 22, 0, 0).unwrap()));
    }

    #[test]
    fn empty_iso_strings_are_absent() {
        let filter = MessageFilter::from_iso::<&str>(&[], Some(""), None).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn rejects_malformed_iso() {
        match MessageFilter::from_iso::<&str>(&[], Some("bad-date"), None) {
            Err(StoreError::InvalidIsoDate(value)) => assert_eq!(value, "bad-date"),
            other => panic!("expected InvalidIsoDate, got {other:?}"),
        }
        assert!(MessageFilter::from_iso::<&str>(&[], None, Some("2024-99-99")).is_err());
    }
}

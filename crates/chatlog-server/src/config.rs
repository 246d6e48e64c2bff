use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chatlog_db::{Database, MessageFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print recent chats and exit.
    Chats,
    /// Print one chat's history and exit.
    History,
    /// Follow new messages until interrupted.
    Watch,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "chats" => Ok(Self::Chats),
            "history" => Ok(Self::History),
            "watch" => Ok(Self::Watch),
            other => bail!("CHATLOG_MODE must be one of chats, history, watch (got {other:?})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: String,
    pub mode: Mode,
    pub chat_id: Option<i64>,
    pub limit: usize,
    pub since_row_id: Option<i64>,
    pub poll_interval: Duration,
    pub batch_limit: usize,
    pub include_reactions: bool,
    /// Attach attachment metadata and current reactions to each message.
    pub details: bool,
    pub filter: MessageFilter,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let db_path = get("CHATLOG_DB_PATH")
            .map(|path| shellexpand::tilde(&path).into_owned())
            .unwrap_or_else(Database::default_path);

        let mode = match get("CHATLOG_MODE") {
            Some(value) => value.parse()?,
            None => Mode::Watch,
        };

        let chat_id = parse::<i64>(&get, "CHATLOG_CHAT_ID")?;
        if let Some(id) = chat_id {
            if id <= 0 {
                bail!("CHATLOG_CHAT_ID must be a positive chat id (got {id})");
            }
        }
        if mode == Mode::History && chat_id.is_none() {
            bail!("CHATLOG_CHAT_ID is required in history mode");
        }

        let default_limit = if mode == Mode::Chats { 20 } else { 50 };
        let limit = positive(&get, "CHATLOG_LIMIT")?.unwrap_or(default_limit);

        let since_row_id = parse::<i64>(&get, "CHATLOG_SINCE_ROWID")?;
        if since_row_id.is_some_and(|row_id| row_id < 0) {
            bail!("CHATLOG_SINCE_ROWID must not be negative");
        }

        let poll_ms = positive(&get, "CHATLOG_POLL_MS")?.unwrap_or(250);
        let batch_limit = positive(&get, "CHATLOG_BATCH_LIMIT")?.unwrap_or(100);

        let participants: Vec<String> = get("CHATLOG_PARTICIPANTS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let start = get("CHATLOG_START");
        let end = get("CHATLOG_END");
        let filter =
            MessageFilter::from_iso(participants.as_slice(), start.as_deref(), end.as_deref())
                .context("CHATLOG_START and CHATLOG_END must be ISO-8601 timestamps")?;

        Ok(Self {
            db_path,
            mode,
            chat_id,
            limit,
            since_row_id,
            poll_interval: Duration::from_millis(poll_ms as u64),
            batch_limit,
            include_reactions: flag(&get, "CHATLOG_INCLUDE_REACTIONS")?,
            details: flag(&get, "CHATLOG_ATTACHMENTS")?,
            filter,
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("{key} is not a valid number: {value:?}"))
        })
        .transpose()
}

fn positive(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<usize>> {
    match parse::<usize>(get, key)? {
        Some(0) => bail!("{key} must be greater than zero"),
        other => Ok(other),
    }
}

fn flag(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    let Some(value) = get(key) else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key} must be a boolean (got {value:?})"),
    }
}

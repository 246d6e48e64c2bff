mod config;
mod output;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use chatlog_db::{ChatCache, Database};
use chatlog_types::WatchEvent;
use chatlog_watch::{WatchConfig, Watcher};
use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::{Config, Mode};
use output::{ChatOutput, EventOutput, MessageOutput};

/// How long chat metadata is reused before it is read again.
const CHAT_CACHE_TTL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries JSON lines only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatlog=info,chatlog_db=info,chatlog_watch=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let path = config.db_path.clone();
    let db = Arc::new(tokio::task::spawn_blocking(move || Database::open(&path)).await??);

    match config.mode {
        Mode::Chats => print_chats(db, &config).await,
        Mode::History => print_history(db, &config).await,
        Mode::Watch => watch(db, &config).await,
    }
}

/// Runs a store operation on the blocking pool.
async fn blocking<T, F>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> chatlog_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    let value = tokio::task::spawn_blocking(move || f(&db)).await??;
    Ok(value)
}

async fn print_chats(db: Arc<Database>, config: &Config) -> anyhow::Result<()> {
    let limit = config.limit;
    let cache = ChatCache::new(CHAT_CACHE_TTL);
    let chats = blocking(&db, move |db| {
        db.list_chats(limit)?
            .into_iter()
            .map(|chat| ChatOutput::load(db, &cache, chat))
            .collect::<chatlog_db::Result<Vec<_>>>()
    })
    .await?;

    for chat in &chats {
        emit(chat)?;
    }
    info!("Listed {} chats", chats.len());
    Ok(())
}

async fn print_history(db: Arc<Database>, config: &Config) -> anyhow::Result<()> {
    let Some(chat_id) = config.chat_id else {
        bail!("CHATLOG_CHAT_ID is required in history mode");
    };
    let (limit, details, filter) = (config.limit, config.details, config.filter.clone());

    let messages = blocking(&db, move |db| {
        if db.chat_info(chat_id)?.is_none() {
            return Ok(None);
        }
        db.messages(chat_id, limit, &filter)?
            .into_iter()
            .map(|message| {
                if details {
                    MessageOutput::detailed(db, message)
                } else {
                    Ok(MessageOutput::plain(message))
                }
            })
            .collect::<chatlog_db::Result<Vec<_>>>()
            .map(Some)
    })
    .await?;

    let Some(messages) = messages else {
        bail!("No chat with id {chat_id}");
    };
    for message in &messages {
        emit(message)?;
    }
    info!("Printed {} messages from chat {}", messages.len(), chat_id);
    Ok(())
}

async fn watch(db: Arc<Database>, config: &Config) -> anyhow::Result<()> {
    let watch_config = WatchConfig {
        debounce: config.poll_interval,
        batch_limit: config.batch_limit,
        include_reactions: config.include_reactions,
    };

    let mut watcher = Watcher::new(Arc::clone(&db), watch_config).filter(config.filter.clone());
    if let Some(chat_id) = config.chat_id {
        watcher = watcher.chat(chat_id);
    }
    if let Some(row_id) = config.since_row_id {
        watcher = watcher.since(row_id);
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    info!(
        chat_id = ?config.chat_id,
        since = ?config.since_row_id,
        poll_ms = config.poll_interval.as_millis() as u64,
        "Watching for new messages"
    );

    let stream = watcher.into_stream(cancel);
    tokio::pin!(stream);

    while let Some(event) = stream.next().await {
        let fatal = event.is_fatal();
        let output = match event {
            WatchEvent::Message(message) if config.details => {
                let row_id = message.row_id;
                let fallback = message.clone();
                match blocking(&db, move |db| MessageOutput::detailed(db, message)).await {
                    Ok(detailed) => EventOutput::Message(detailed),
                    Err(e) => {
                        warn!(row_id, error = %e, "Could not load message details");
                        EventOutput::Message(MessageOutput::plain(fallback))
                    }
                }
            }
            other => EventOutput::plain(other),
        };
        emit(&output)?;

        if fatal {
            bail!("Watch stopped after a fatal store error");
        }
    }

    info!("Watch stopped");
    Ok(())
}

/// Writes one JSON line to stdout.
fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

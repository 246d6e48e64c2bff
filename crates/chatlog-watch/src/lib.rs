pub mod source;

pub use source::MessageSource;

use std::sync::Arc;
use std::time::Duration;

use chatlog_db::{MessageFilter, Result, StoreError};
use chatlog_types::{Message, WatchEvent};
use futures_util::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    /// Pause between poll ticks.
    pub debounce: Duration,
    /// Most rows read per tick.
    pub batch_limit: usize,
    /// Surface reaction add/remove rows as `WatchEvent::Reaction`.
    pub include_reactions: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            batch_limit: 100,
            include_reactions: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Polling,
    Cancelled,
}

/// One change-feed subscription.
///
/// Holds its own watermark, filter and config; only the source is shared.
/// Rows at or below the watermark are never emitted and every emitted row
/// raises it, so emitted row ids are strictly increasing.
pub struct Watcher<S> {
    source: Arc<S>,
    config: WatchConfig,
    chat_id: Option<i64>,
    filter: MessageFilter,
    watermark: Option<i64>,
    state: WatchState,
}

/// What a single tick reads, detached from the watcher so it can run on the
/// blocking pool.
#[derive(Debug, Clone, Copy)]
struct Request {
    watermark: Option<i64>,
    chat_id: Option<i64>,
    limit: usize,
    include_reactions: bool,
}

/// Outcome of one read. `base` is known as soon as the start point has been
/// read, even when the rows after it could not be.
struct Tick {
    base: Option<i64>,
    rows: Result<Vec<Message>>,
}

impl Request {
    fn read<S: MessageSource>(self, source: &S) -> Tick {
        let base = match self.watermark {
            Some(watermark) => watermark,
            None => match source.max_row_id() {
                Ok(row_id) => row_id,
                Err(e) => {
                    return Tick {
                        base: None,
                        rows: Err(e),
                    };
                }
            },
        };
        let rows = if self.include_reactions {
            source.events_after(base, self.chat_id, self.limit)
        } else {
            source.messages_after(base, self.chat_id, self.limit)
        };
        Tick {
            base: Some(base),
            rows,
        }
    }
}

impl<S: MessageSource> Watcher<S> {
    pub fn new(source: Arc<S>, config: WatchConfig) -> Self {
        Self {
            source,
            config,
            chat_id: None,
            filter: MessageFilter::default(),
            watermark: None,
            state: WatchState::Idle,
        }
    }

    /// Only watch one chat.
    pub fn chat(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    /// Start after `row_id` instead of after the current latest row.
    pub fn since(mut self, row_id: i64) -> Self {
        self.watermark = Some(row_id);
        self
    }

    pub fn filter(mut self, filter: MessageFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn watermark(&self) -> Option<i64> {
        self.watermark
    }

    pub fn cancel(&mut self) {
        self.state = WatchState::Cancelled;
    }

    /// Runs one tick on the calling thread.
    ///
    /// Without a watermark the first tick that reads the store's latest row
    /// fixes it there, even if reading the rows after it then fails. A
    /// failed tick leaves the watermark where it was so the next one reads
    /// the same window.
    pub fn poll_once(&mut self) -> Result<Vec<WatchEvent>> {
        if self.state == WatchState::Cancelled {
            return Ok(Vec::new());
        }

        self.state = WatchState::Polling;
        let tick = self.request().read(self.source.as_ref());
        self.state = WatchState::Idle;

        self.settle(tick)
    }

    /// Same as `poll_once`, with the read on the blocking pool.
    async fn tick(&mut self) -> Result<Vec<WatchEvent>> {
        if self.state == WatchState::Cancelled {
            return Ok(Vec::new());
        }

        self.state = WatchState::Polling;
        let source = Arc::clone(&self.source);
        let request = self.request();
        let tick = tokio::task::spawn_blocking(move || request.read(source.as_ref()))
            .await
            .unwrap_or_else(|e| Tick {
                base: None,
                rows: Err(StoreError::Task(e.to_string())),
            });
        self.state = WatchState::Idle;

        self.settle(tick)
    }

    fn request(&self) -> Request {
        Request {
            watermark: self.watermark,
            chat_id: self.chat_id,
            limit: self.config.batch_limit,
            include_reactions: self.config.include_reactions,
        }
    }

    fn settle(&mut self, tick: Tick) -> Result<Vec<WatchEvent>> {
        if self.watermark.is_none() {
            self.watermark = tick.base;
        }
        let rows = tick.rows?;
        let base = self.watermark.unwrap_or_default();
        Ok(self.absorb(base, rows))
    }

    fn absorb(&mut self, base: i64, rows: Vec<Message>) -> Vec<WatchEvent> {
        let mut watermark = base;
        let mut events = Vec::with_capacity(rows.len());

        for message in rows {
            // Never step back, even if the source repeats a row.
            if message.row_id <= watermark {
                continue;
            }
            watermark = message.row_id;

            if !self.filter.allows(&message) {
                continue;
            }
            if !message.is_reaction {
                events.push(WatchEvent::Message(message));
            } else if self.config.include_reactions {
                events.push(WatchEvent::Reaction(message));
            }
        }

        debug!(watermark, count = events.len(), "Watch tick");
        self.watermark = Some(watermark);
        events
    }

    /// Turns the watcher into an endless stream of events.
    ///
    /// Transient read failures are yielded as non-fatal `Error` events and
    /// retried after the debounce. A fatal failure is yielded once and ends
    /// the stream. Once `cancel` fires nothing more is yielded.
    pub fn into_stream(
        mut self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = WatchEvent> + Send + 'static {
        async_stream::stream! {
            'watch: loop {
                if cancel.is_cancelled() {
                    break;
                }

                match self.tick().await {
                    Ok(events) => {
                        for event in events {
                            if cancel.is_cancelled() {
                                break 'watch;
                            }
                            yield event;
                        }
                    }
                    Err(e) if e.is_transient() => {
                        warn!(
                            error = %e,
                            watermark = ?self.watermark,
                            "Watch tick failed, retrying"
                        );
                        if cancel.is_cancelled() {
                            break;
                        }
                        yield WatchEvent::Error { message: e.to_string(), fatal: false };
                    }
                    Err(e) => {
                        error!(error = %e, "Watch stopped");
                        if !cancel.is_cancelled() {
                            yield WatchEvent::Error { message: e.to_string(), fatal: true };
                        }
                        break;
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.debounce) => {}
                }
            }

            self.cancel();
            debug!(watermark = ?self.watermark, "Watch stream closed");
        }
    }
}

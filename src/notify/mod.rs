// src/notify/mod.rs
pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::alerts::SubscriberId;
use crate::error::PipelineError;
use crate::ingest::types::EnrichedItem;

pub use telegram::TelegramTransport;

/// Physical delivery of one rendered alert to one subscriber.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, subscriber: &str, text: &str) -> Result<()>;
    fn name(&self) -> &str;
}

/// Writes alerts to the log instead of delivering them.
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, subscriber: &str, text: &str) -> Result<()> {
        tracing::info!(target: "dispatch", %subscriber, "alert (log transport)\n{text}");
        Ok(())
    }
    fn name(&self) -> &str {
        "log"
    }
}

fn or_dash(s: &str) -> &str {
    if s.trim().is_empty() {
        "-"
    } else {
        s
    }
}

/// Render an enriched item for Telegram-style HTML delivery. Field values are escaped.
pub fn render_alert(e: &EnrichedItem) -> String {
    let it = &e.item;
    let esc = |s: &str| html_escape::encode_text(or_dash(s)).to_string();
    let tags = it.tags.join(", ");
    format!(
        "News Alert\n\n<b>{}</b>\n\nCategory: {}\nTags: {}\nSentiment: {}\nConfidence: {:.1}%\n\nSummary: {}\n\nRead more: {}\n\nSource: {}",
        esc(&it.title),
        esc(&it.category),
        esc(&tags),
        esc(&it.sentiment),
        e.confidence * 100.0,
        esc(&it.summary),
        esc(&it.url),
        esc(&it.source),
    )
}

/// Hands matched alerts to the transport on a supervised task group.
///
/// Deliveries run concurrently but never more than `max_in_flight` at once.
/// Callers do not wait for delivery; a failed send is logged and does not
/// affect the other subscribers of the same item.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, max_in_flight: usize) -> Self {
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Queue one delivery per subscriber. Returns the number queued.
    pub fn dispatch(&self, item: &EnrichedItem, subscribers: &[SubscriberId]) -> usize {
        if subscribers.is_empty() {
            return 0;
        }
        let text: Arc<str> = render_alert(item).into();

        let mut tasks = self.tasks.lock();
        // Reap finished deliveries so the set only holds live work.
        while let Some(res) = tasks.try_join_next() {
            log_join_error(res);
        }

        for sub in subscribers {
            let transport = Arc::clone(&self.transport);
            let permits = Arc::clone(&self.permits);
            let text = Arc::clone(&text);
            let sub = sub.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                match transport.send(&sub, &text).await {
                    Ok(()) => {
                        counter!("dispatch_sent_total").increment(1);
                        tracing::debug!(target: "dispatch", subscriber = %sub, "alert sent");
                    }
                    Err(e) => {
                        let err = PipelineError::dispatch(&sub, &e);
                        counter!("dispatch_errors_total").increment(1);
                        tracing::warn!(target: "dispatch", subscriber = %sub, error = %err, "delivery failed");
                    }
                }
            });
        }
        subscribers.len()
    }

    /// Deliveries queued or running.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.tasks.lock();
        while let Some(res) = tasks.try_join_next() {
            log_join_error(res);
        }
        tasks.len()
    }

    /// Wait until everything queued so far has finished.
    pub async fn flush(&self) {
        let mut set = std::mem::take(&mut *self.tasks.lock());
        while let Some(res) = set.join_next().await {
            log_join_error(res);
        }
    }

    /// Give outstanding deliveries `grace` to finish, then abort the rest.
    /// Returns how many were aborted; those alerts are lost.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let mut set = std::mem::take(&mut *self.tasks.lock());
        let drained = tokio::time::timeout(grace, async {
            while let Some(res) = set.join_next().await {
                log_join_error(res);
            }
        })
        .await;
        if drained.is_ok() {
            return 0;
        }

        let aborted = set.len();
        set.abort_all();
        while set.join_next().await.is_some() {}
        tracing::warn!(target: "dispatch", aborted, "undelivered alerts dropped at shutdown");
        aborted
    }
}

fn log_join_error(res: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            tracing::error!(target: "dispatch", error = %e, "delivery task panicked");
        }
    }
}

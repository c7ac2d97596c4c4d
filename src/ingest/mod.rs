// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::cache::DedupCache;
use crate::error::PipelineError;
use crate::ingest::types::{FeedSource, Item};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Items returned by feed sources.");
        describe_counter!(
            "ingest_provider_errors_total",
            "Feed source fetch errors and timeouts."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Items dropped because their fingerprint was already seen."
        );
        describe_counter!("cycles_total", "Pipeline cycles started.");
        describe_counter!("classify_items_total", "Items returned by the classifier.");
        describe_counter!("classify_errors_total", "Whole-batch classification failures.");
        describe_counter!("dispatch_sent_total", "Alerts handed to the transport.");
        describe_counter!("dispatch_errors_total", "Alert deliveries that failed.");
        describe_counter!("cache_evicted_total", "Cache entries removed by the sweep.");
        describe_gauge!("cache_entries", "Entries currently held by the dedup cache.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the pipeline last ran."
        );
        describe_histogram!("cycle_duration_ms", "Wall time of one pipeline cycle.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Normalize text: decode entities, strip tags, fold quotes, collapse whitespace,
/// drop trailing sentence punctuation.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    let out = RE_TAGS.replace_all(&out, "");

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    let out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    let mut out = RE_WS.replace_all(&out, " ").trim().to_string();

    // 5) Strip trailing sentence punctuation (keep quotes)
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    out
}

/// Content fingerprint: lowercase hex SHA-256 over normalized, lowercased title and body.
pub fn fingerprint(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(title).to_lowercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_text(body).to_lowercase().as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Fans one fetch out to every registered source and merges the survivors.
pub struct FetchCoordinator {
    sources: Vec<Arc<dyn FeedSource>>,
    timeout: Duration,
}

impl FetchCoordinator {
    pub fn new(sources: Vec<Arc<dyn FeedSource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Fetch up to `limit` items from every source concurrently.
    ///
    /// A source that errors, panics or exceeds the timeout contributes nothing;
    /// the others are unaffected. The merged batch carries no ordering guarantee.
    pub async fn fetch_all(&self, limit: usize) -> Vec<Item> {
        ensure_metrics_described();

        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let timeout = self.timeout;
                let name = source.name().to_string();
                (name, tokio::spawn(fetch_one(source, limit, timeout)))
            })
            .collect();

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        let mut batch = Vec::new();
        for (name, res) in names.into_iter().zip(results) {
            match res {
                Ok(mut items) => batch.append(&mut items),
                Err(e) => {
                    tracing::error!(target: "ingest", source = %name, error = %e, "source task panicked");
                    counter!("ingest_provider_errors_total").increment(1);
                }
            }
        }
        batch
    }
}

async fn fetch_one(source: Arc<dyn FeedSource>, limit: usize, timeout: Duration) -> Vec<Item> {
    let name = source.name().to_string();
    let err = match tokio::time::timeout(timeout, source.fetch(limit)).await {
        Ok(Ok(mut items)) => {
            items.truncate(limit);
            counter!("ingest_events_total").increment(items.len() as u64);
            tracing::debug!(target: "ingest", source = %name, count = items.len(), "source fetched");
            return items;
        }
        Ok(Err(e)) => PipelineError::source_fetch(&name, &e),
        Err(_) => PipelineError::SourceTimeout {
            source_name: name.clone(),
            timeout,
        },
    };
    tracing::warn!(target: "ingest", source = %name, kind = err.kind(), error = %err, "provider error");
    counter!("ingest_provider_errors_total").increment(1);
    Vec::new()
}

/// Keep only items whose fingerprint is neither cached nor repeated earlier in
/// the same batch. Returns (candidates, dropped_count).
pub fn filter_new(batch: Vec<Item>, cache: &DedupCache) -> (Vec<Item>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(batch.len());
    let mut keep = Vec::with_capacity(batch.len());
    let mut dropped = 0usize;

    for item in batch {
        if cache.has(&item.fingerprint) || !seen.insert(item.fingerprint.clone()) {
            dropped += 1;
            continue;
        }
        keep.push(item);
    }

    counter!("ingest_dedup_total").increment(dropped as u64);
    (keep, dropped)
}

// tests/common/mod.rs
// Shared collaborator doubles for the pipeline integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use news_alert_aggregator::classify::MockClassifier;
use news_alert_aggregator::{AlertRule, Classifier, EnrichedItem, FeedSource, Item, RuleStore, Transport};

pub fn item(id: &str, title: &str, body: &str, source: &str) -> Item {
    Item::new(id, title, body, format!("https://news.test/{id}"), source, Utc::now())
}

/// Returns a fixed list (or an error) after an optional delay.
pub struct StaticSource {
    pub name: String,
    pub items: Vec<Item>,
    pub delay: Duration,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StaticSource {
    pub fn ok(name: &str, items: Vec<Item>) -> Self {
        Self {
            name: name.to_string(),
            items,
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::ok(name, Vec::new())
        }
    }

    pub fn delayed(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for StaticSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<Item>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(anyhow!("upstream 503"));
        }
        Ok(self.items.iter().take(limit).cloned().collect())
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// Emits one never-seen-before item per call.
pub struct FreshSource {
    pub counter: AtomicUsize,
}

#[async_trait]
impl FeedSource for FreshSource {
    async fn fetch(&self, _limit: usize) -> Result<Vec<Item>> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![item(&format!("f{n}"), &format!("Story number {n}"), "", "fresh")])
    }
    fn name(&self) -> &str {
        "fresh"
    }
}

/// Wraps the mock classifier, recording batch sizes and optionally failing
/// the first `fail_first` calls.
pub struct RecordingClassifier {
    inner: MockClassifier,
    pub batches: Mutex<Vec<usize>>,
    fail_first: usize,
    pub delay: Duration,
    pub current: AtomicUsize,
    pub max_concurrent: AtomicUsize,
}

impl RecordingClassifier {
    pub fn new(category: &str) -> Self {
        Self {
            inner: MockClassifier::fixed(category, 0.9),
            batches: Mutex::new(Vec::new()),
            fail_first: 0,
            delay: Duration::ZERO,
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn slow(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for RecordingClassifier {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<EnrichedItem>> {
        let call_no = {
            let mut b = self.batches.lock().unwrap();
            b.push(batch.len());
            b.len()
        };
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        if call_no <= self.fail_first {
            return Err(anyhow!("model overloaded"));
        }
        self.inner.classify(batch).await
    }
    fn name(&self) -> &str {
        "recording"
    }
}

/// Records every delivery; subscribers listed in `reject` fail.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, String)>>,
    pub reject: Vec<String>,
    pub delay: Duration,
    pub current: AtomicUsize,
    pub max_concurrent: AtomicUsize,
}

impl RecordingTransport {
    pub fn sent_to(&self) -> Vec<String> {
        let mut v: Vec<String> = self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect();
        v.sort();
        v
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, subscriber: &str, text: &str) -> Result<()> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.reject.iter().any(|r| r == subscriber) {
            return Err(anyhow!("chat not found"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscriber.to_string(), text.to_string()));
        Ok(())
    }
    fn name(&self) -> &str {
        "recording"
    }
}

/// Rule store that errors for its first `fail_first` reads.
pub struct FlakyRuleStore {
    pub rules: Vec<AlertRule>,
    pub fail_first: usize,
    pub reads: AtomicUsize,
}

#[async_trait]
impl RuleStore for FlakyRuleStore {
    async fn list_rules(&self) -> Result<Vec<AlertRule>> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.fail_first {
            return Err(anyhow!("rules backend offline"));
        }
        Ok(self.rules.clone())
    }
}

/// Answers every item twice, as a misbehaving model might.
pub struct EchoTwiceClassifier;

#[async_trait]
impl Classifier for EchoTwiceClassifier {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<EnrichedItem>> {
        let once = MockClassifier::fixed("finance", 0.9).classify(batch).await?;
        Ok(once.iter().chain(once.iter()).cloned().collect())
    }
    fn name(&self) -> &str {
        "echo-twice"
    }
}

pub fn arc<T>(t: T) -> Arc<T> {
    Arc::new(t)
}

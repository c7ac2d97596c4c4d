//! Classification collaborator: batch in, enriched subset out.
//!
//! The pipeline treats any `Err` as a failure of the whole batch. Items the
//! classifier leaves out of its answer are simply not enriched this cycle.

pub mod openai;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::config::AppConfig;
use crate::ingest::types::{EnrichedItem, Item};

pub use openai::OpenAiClassifier;

/// Categories the classifier is asked to choose from.
pub const CATEGORIES: &[&str] = &[
    "politics",
    "technology",
    "cryptocurrency",
    "finance",
    "sports",
    "entertainment",
    "health",
    "science",
    "world",
    "business",
];

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<EnrichedItem>>;
    /// Provider name for diagnostics.
    fn name(&self) -> &str;
}

pub type DynClassifier = Arc<dyn Classifier>;

/// Factory: build a classifier according to config and environment.
///
/// * `CLASSIFIER_TEST_MODE=mock` → deterministic mock.
/// * an OpenAI key is configured → OpenAI batch classifier.
/// * otherwise → disabled (every batch fails, so nothing is cached or dropped).
pub fn build_classifier_from_config(cfg: &AppConfig) -> DynClassifier {
    if std::env::var("CLASSIFIER_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockClassifier::fixed("world", 0.9));
    }

    match cfg.openai_api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => Arc::new(OpenAiClassifier::new(
            key.trim().to_string(),
            cfg.openai_model.clone(),
        )),
        _ => {
            tracing::warn!(target: "classify", "no OPENAI_API_KEY configured; classifier disabled");
            Arc::new(DisabledClassifier)
        }
    }
}

/// Always fails; used when no provider is configured.
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    async fn classify(&self, _batch: &[Item]) -> Result<Vec<EnrichedItem>> {
        bail!("classifier disabled")
    }
    fn name(&self) -> &str {
        "disabled"
    }
}

/// Deterministic classifier for tests/local runs: tags every item with one
/// category, neutral sentiment, and its own title as summary.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    pub category: String,
    pub confidence: f64,
}

impl MockClassifier {
    pub fn fixed(category: &str, confidence: f64) -> Self {
        Self {
            category: category.to_string(),
            confidence,
        }
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, batch: &[Item]) -> Result<Vec<EnrichedItem>> {
        let now = Utc::now();
        Ok(batch
            .iter()
            .map(|it| {
                let mut item = it.clone();
                item.category = self.category.clone();
                item.sentiment = "neutral".to_string();
                item.summary = it.title.clone();
                EnrichedItem {
                    item,
                    confidence: self.confidence,
                    enriched_at: now,
                }
            })
            .collect())
    }
    fn name(&self) -> &str {
        "mock"
    }
}

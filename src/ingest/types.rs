// src/ingest/types.rs
use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of ingested content.
///
/// Identity fields are fixed at construction; `fingerprint` is derived from the
/// normalized title and body and is the dedup key (not `id`, which is only
/// unique per origin). Enrichment fields stay empty until a classifier fills them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub fingerprint: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub summary: String,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        let body = body.into();
        let fingerprint = crate::ingest::fingerprint(&title, &body);
        Self {
            id: id.into(),
            title,
            body,
            url: url.into(),
            source: source.into(),
            published_at,
            fingerprint,
            metadata: HashMap::new(),
            category: String::new(),
            tags: Vec::new(),
            sentiment: String::new(),
            summary: String::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Lowercased `title + " " + body`, the haystack for keyword rules.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.body).to_lowercase()
    }
}

/// An item after classification. Never mutated once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedItem {
    #[serde(flatten)]
    pub item: Item,
    pub confidence: f64, // 0.0 .. 1.0
    pub enriched_at: DateTime<Utc>,
}

impl EnrichedItem {
    pub fn fingerprint(&self) -> &str {
        &self.item.fingerprint
    }
}

/// An upstream feed. Implementations own their wire format and retry policy.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch at most `limit` recent items.
    async fn fetch(&self, limit: usize) -> Result<Vec<Item>>;
    fn name(&self) -> &str;
}

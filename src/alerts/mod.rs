// src/alerts/mod.rs
pub mod command;
pub mod matcher;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub use matcher::match_rules;

/// Opaque recipient id; for Telegram this is the chat id.
pub type SubscriberId = String;

/// A subscriber's interest rule. Categories, keywords and tags are OR-ed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    #[serde(rename = "id")]
    pub subscriber_id: SubscriberId,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    pub fn new(subscriber_id: impl Into<SubscriberId>) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            categories: BTreeSet::new(),
            keywords: BTreeSet::new(),
            tags: BTreeSet::new(),
            enabled: true,
        }
    }

    pub fn with_categories<I, S>(mut self, it: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.categories.extend(clean(it));
        self
    }

    pub fn with_keywords<I, S>(mut self, it: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords.extend(clean(it));
        self
    }

    pub fn with_tags<I, S>(mut self, it: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags.extend(clean(it));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.keywords.is_empty() && self.tags.is_empty()
    }

    /// Drop blank entries that may have come in through deserialization.
    fn sanitized(mut self) -> Self {
        for set in [&mut self.categories, &mut self.keywords, &mut self.tags] {
            *set = clean(set.iter()).collect();
        }
        self
    }
}

fn clean<I, S>(it: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    it.into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Read side consumed by the pipeline. Rule mutation belongs to whoever talks
/// to subscribers.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_rules(&self) -> Result<Vec<AlertRule>>;
}

/// Process-lifetime rule store, one rule per subscriber.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<BTreeMap<SubscriberId, AlertRule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: impl IntoIterator<Item = AlertRule>) -> Self {
        let store = Self::new();
        for r in rules {
            store.upsert(r);
        }
        store
    }

    /// Create or wholesale replace the subscriber's rule.
    pub fn upsert(&self, rule: AlertRule) {
        let rule = rule.sanitized();
        tracing::info!(
            target: "alerts",
            subscriber = %rule.subscriber_id,
            categories = rule.categories.len(),
            keywords = rule.keywords.len(),
            tags = rule.tags.len(),
            "alert rule stored"
        );
        self.rules.write().insert(rule.subscriber_id.clone(), rule);
    }

    pub fn remove(&self, subscriber: &str) -> Option<AlertRule> {
        self.rules.write().remove(subscriber)
    }

    /// Returns false when the subscriber has no rule.
    pub fn set_enabled(&self, subscriber: &str, enabled: bool) -> bool {
        match self.rules.write().get_mut(subscriber) {
            Some(r) => {
                r.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, subscriber: &str) -> Option<AlertRule> {
        self.rules.read().get(subscriber).cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<AlertRule> {
        self.rules.read().values().cloned().collect()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self.snapshot())
    }
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default, rename = "subscriber")]
    subscribers: Vec<AlertRule>,
}

/// Parse a TOML document of `[[subscriber]]` tables.
pub fn parse_rules_toml(s: &str) -> Result<Vec<AlertRule>> {
    let f: RulesFile = toml::from_str(s).context("parsing rules toml")?;
    Ok(f.subscribers.into_iter().map(AlertRule::sanitized).collect())
}

pub fn load_rules_from(path: &Path) -> Result<Vec<AlertRule>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading rules from {}", path.display()))?;
    parse_rules_toml(&content)
}

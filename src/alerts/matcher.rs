// src/alerts/matcher.rs
//! Stateless rule evaluation. A rule matches on the first satisfied clause:
//! category equality, keyword substring of title+body, or tag equality.
//! All comparisons are case-insensitive.

use super::{AlertRule, SubscriberId};
use crate::ingest::types::{EnrichedItem, Item};

impl AlertRule {
    pub fn matches(&self, item: &Item) -> bool {
        if !self.enabled {
            return false;
        }

        if !item.category.is_empty()
            && self
                .categories
                .iter()
                .any(|c| eq_fold(c, &item.category))
        {
            return true;
        }

        if !self.keywords.is_empty() {
            let haystack = item.searchable_text();
            if self
                .keywords
                .iter()
                .filter(|k| !k.is_empty())
                .any(|k| haystack.contains(&k.to_lowercase()))
            {
                return true;
            }
        }

        self.tags
            .iter()
            .any(|t| item.tags.iter().any(|it| eq_fold(it, t)))
    }
}

fn eq_fold(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

/// Subscribers whose enabled rule matches `item`, in rule order.
pub fn match_rules(item: &EnrichedItem, rules: &[AlertRule]) -> Vec<SubscriberId> {
    rules
        .iter()
        .filter(|r| r.matches(&item.item))
        .map(|r| r.subscriber_id.clone())
        .collect()
}

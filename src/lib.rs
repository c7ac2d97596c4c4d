// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod alerts;
pub mod api;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod shutdown;

// ---- Re-exports for stable public API ----
pub use crate::alerts::{AlertRule, InMemoryRuleStore, RuleStore, SubscriberId};
pub use crate::cache::{CacheStats, DedupCache};
pub use crate::classify::{Classifier, DynClassifier};
pub use crate::error::PipelineError;
pub use crate::ingest::scheduler::{spawn_scheduler, CycleReport, CycleState, Pipeline};
pub use crate::ingest::types::{EnrichedItem, FeedSource, Item};
pub use crate::ingest::FetchCoordinator;
pub use crate::notify::{Dispatcher, Transport};

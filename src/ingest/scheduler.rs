// src/ingest/scheduler.rs
//! One pipeline pass per tick: fetch → filter → classify → cache → match/dispatch.
//!
//! Cycles never overlap: the loop awaits each cycle before taking the next
//! tick, and ticks missed while a cycle overran are skipped rather than
//! replayed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::alerts::{match_rules, RuleStore};
use crate::cache::DedupCache;
use crate::classify::DynClassifier;
use crate::error::PipelineError;
use crate::ingest::{ensure_metrics_described, filter_new, FetchCoordinator};
use crate::notify::Dispatcher;
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Fetching,
    Filtering,
    Classifying,
    UpdatingCache,
    MatchingAndDispatching,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub deduplicated: usize,
    pub candidates: usize,
    pub enriched: usize,
    pub dispatched: usize,
}

pub struct Pipeline {
    fetcher: FetchCoordinator,
    cache: Arc<DedupCache>,
    classifier: DynClassifier,
    rules: Arc<dyn RuleStore>,
    dispatcher: Arc<Dispatcher>,
    batch_size: usize,
    state: Mutex<CycleState>,
    running: AtomicBool,
}

impl Pipeline {
    pub fn new(
        fetcher: FetchCoordinator,
        cache: Arc<DedupCache>,
        classifier: DynClassifier,
        rules: Arc<dyn RuleStore>,
        dispatcher: Arc<Dispatcher>,
        batch_size: usize,
    ) -> Self {
        Self {
            fetcher,
            cache,
            classifier,
            rules,
            dispatcher,
            batch_size,
            state: Mutex::new(CycleState::Idle),
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock()
    }

    fn enter(&self, s: CycleState) {
        *self.state.lock() = s;
        tracing::trace!(target: "scheduler", state = ?s, "cycle state");
    }

    /// True while the scheduler loop is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn cache(&self) -> &Arc<DedupCache> {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Run one full pass.
    ///
    /// A rule store or classifier failure aborts the cycle before any cache
    /// write, so the same items come back as candidates next time. Dispatch is
    /// queued, not awaited.
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        ensure_metrics_described();
        counter!("cycles_total").increment(1);
        let t0 = Instant::now();
        let res = self.cycle_inner().await;
        self.enter(CycleState::Idle);

        histogram!("cycle_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        res
    }

    async fn cycle_inner(&self) -> Result<CycleReport, PipelineError> {
        let mut report = CycleReport::default();

        self.enter(CycleState::Fetching);
        let batch = self.fetcher.fetch_all(self.batch_size).await;
        report.fetched = batch.len();

        self.enter(CycleState::Filtering);
        let (candidates, dropped) = filter_new(batch, &self.cache);
        report.deduplicated = dropped;
        report.candidates = candidates.len();
        if candidates.is_empty() {
            tracing::debug!(target: "scheduler", fetched = report.fetched, "no new items");
            return Ok(report);
        }

        // Read rules up front: nothing awaits between the cache write and dispatch.
        let rules = match self.rules.list_rules().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    target: "alerts",
                    error = %format!("{e:#}"),
                    candidates = report.candidates,
                    "rule store unavailable; cycle skipped, items stay unprocessed"
                );
                return Ok(report);
            }
        };

        self.enter(CycleState::Classifying);
        let mut enriched = match self.classifier.classify(&candidates).await {
            Ok(v) => v,
            Err(e) => {
                let err = PipelineError::classification(candidates.len(), &e);
                counter!("classify_errors_total").increment(1);
                tracing::error!(
                    target: "classify",
                    classifier = self.classifier.name(),
                    error = %err,
                    "batch classification failed; items stay unprocessed"
                );
                return Err(err);
            }
        };
        // One enrichment per fingerprint, whatever the classifier returned.
        let mut seen = HashSet::with_capacity(enriched.len());
        enriched.retain(|e| seen.insert(e.fingerprint().to_string()));
        report.enriched = enriched.len();
        counter!("classify_items_total").increment(enriched.len() as u64);

        self.enter(CycleState::UpdatingCache);
        for e in &enriched {
            self.cache.add(e.item.clone());
            self.cache.mark_processed(e.fingerprint());
        }

        self.enter(CycleState::MatchingAndDispatching);
        for e in &enriched {
            let subscribers = match_rules(e, &rules);
            report.dispatched += self.dispatcher.dispatch(e, &subscribers);
        }

        tracing::info!(
            target: "scheduler",
            fetched = report.fetched,
            dedup = report.deduplicated,
            candidates = report.candidates,
            enriched = report.enriched,
            dispatched = report.dispatched,
            "cycle complete"
        );
        Ok(report)
    }
}

/// Drive `pipeline` every `interval` until shutdown. The first cycle runs immediately.
///
/// A cycle still in flight when shutdown arrives is dropped at its current
/// await point; alerts already queued are left to the dispatcher's grace period.
pub fn spawn_scheduler(pipeline: Arc<Pipeline>, interval: Duration, mut shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        pipeline.running.store(true, Ordering::Relaxed);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(target: "scheduler", interval_secs = interval.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.wait() => {
                    tracing::warn!(target: "scheduler", state = ?pipeline.state(), "cycle interrupted by shutdown");
                    break;
                }
                // Errors were logged where they happened.
                _ = pipeline.run_cycle() => {}
            }
        }

        pipeline.enter(CycleState::Idle);
        pipeline.running.store(false, Ordering::Relaxed);
        tracing::info!(target: "scheduler", "scheduler stopped");
    })
}

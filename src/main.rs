//! News alert aggregator binary.
//! Wires feeds, cache, classifier, rule store and transport into the cycle
//! scheduler, serves the stats surface, and shuts down on Ctrl-C/SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_alert_aggregator::alerts::{load_rules_from, InMemoryRuleStore};
use news_alert_aggregator::api::{self, AppState};
use news_alert_aggregator::cache::{spawn_sweeper, DedupCache};
use news_alert_aggregator::classify::build_classifier_from_config;
use news_alert_aggregator::config::AppConfig;
use news_alert_aggregator::ingest::providers::RssFeedSource;
use news_alert_aggregator::ingest::scheduler::{spawn_scheduler, Pipeline};
use news_alert_aggregator::ingest::types::FeedSource;
use news_alert_aggregator::ingest::FetchCoordinator;
use news_alert_aggregator::metrics::Metrics;
use news_alert_aggregator::notify::{Dispatcher, LogTransport, TelegramTransport, Transport};
use news_alert_aggregator::shutdown;

/// `RUST_LOG` controls the filter (default `info`); `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler: {e:#}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler: {e:#}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    info!(
        interval_secs = cfg.processing_interval_secs,
        batch_size = cfg.batch_size,
        retention_secs = cfg.cache_retention_secs,
        feeds = cfg.feeds.len(),
        "config loaded"
    );

    let metrics = match Metrics::init(cfg.cache_retention_secs) {
        Ok(m) => Some(m.handle),
        Err(e) => {
            warn!("metrics disabled: {e:#}");
            None
        }
    };

    // --- Feed sources ---
    let mut sources: Vec<Arc<dyn FeedSource>> = Vec::with_capacity(cfg.feeds.len());
    for f in &cfg.feeds {
        match RssFeedSource::from_url(f.name.clone(), f.url.clone()) {
            Ok(s) => sources.push(Arc::new(s)),
            Err(e) => warn!(feed = %f.name, "skipping feed: {e:#}"),
        }
    }
    if sources.is_empty() {
        warn!("no feeds configured; cycles will be empty");
    }
    let fetcher = FetchCoordinator::new(sources, cfg.source_timeout());

    // --- Cache, classifier, rules, transport ---
    let cache = Arc::new(DedupCache::new(cfg.cache_retention()));
    let classifier = build_classifier_from_config(&cfg);

    let rules = Arc::new(InMemoryRuleStore::new());
    if let Some(path) = &cfg.rules_path {
        let loaded = load_rules_from(path).context("loading subscriber rules")?;
        info!(count = loaded.len(), path = %path.display(), "rules loaded");
        for r in loaded {
            rules.upsert(r);
        }
    }

    let transport: Arc<dyn Transport> = match &cfg.telegram_bot_token {
        Some(token) => Arc::new(TelegramTransport::new(token)),
        None => {
            warn!("TELEGRAM_BOT_TOKEN not set; alerts go to the log");
            Arc::new(LogTransport)
        }
    };
    let dispatcher = Arc::new(Dispatcher::new(transport, cfg.dispatch_concurrency));

    let pipeline = Arc::new(Pipeline::new(
        fetcher,
        Arc::clone(&cache),
        classifier,
        rules,
        Arc::clone(&dispatcher),
        cfg.batch_size,
    ));

    // --- Background loops ---
    let (trigger, sd) = shutdown::channel();
    let sweeper = spawn_sweeper(Arc::clone(&cache), cfg.sweep_interval(), sd.clone());
    let scheduler = spawn_scheduler(Arc::clone(&pipeline), cfg.processing_interval(), sd.clone());

    // --- HTTP ---
    let app = api::router(AppState {
        pipeline: Arc::clone(&pipeline),
        metrics,
    });
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "http listening");
    let mut http_sd = sd.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_sd.wait().await })
            .await
    });

    wait_for_signal().await;
    info!("shutdown requested");
    trigger.trigger();

    let grace = cfg.shutdown_grace();
    if tokio::time::timeout(grace, async {
        let _ = scheduler.await;
        let _ = sweeper.await;
    })
    .await
    .is_err()
    {
        warn!("background loops did not stop within grace period");
    }
    let aborted = dispatcher.shutdown(grace).await;

    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Err(e))) => warn!("http server: {e:#}"),
        Ok(Err(e)) => warn!("http task: {e:#}"),
        Err(_) => warn!("http server did not stop within grace period"),
        Ok(Ok(Ok(()))) => {}
    }

    info!(aborted_alerts = aborted, "stopped");
    Ok(())
}

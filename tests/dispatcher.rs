// tests/dispatcher.rs
mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use news_alert_aggregator::{Dispatcher, EnrichedItem, SubscriberId};

use common::{item, RecordingTransport};

fn enriched() -> EnrichedItem {
    let mut it = item("1", "Election results", "Polls closed", "wire");
    it.category = "politics".into();
    EnrichedItem {
        item: it,
        confidence: 0.8,
        enriched_at: Utc::now(),
    }
}

fn subs(names: &[&str]) -> Vec<SubscriberId> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_capped() {
    let transport = Arc::new(RecordingTransport {
        delay: Duration::from_secs(1),
        ..Default::default()
    });
    let d = Dispatcher::new(transport.clone(), 2);

    let queued = d.dispatch(&enriched(), &subs(&["a", "b", "c", "d", "e", "f"]));
    assert_eq!(queued, 6);
    d.flush().await;

    assert_eq!(transport.sent_to().len(), 6);
    assert_eq!(transport.max_concurrent.load(Ordering::SeqCst), 2);
    assert_eq!(d.in_flight(), 0);
}

#[tokio::test]
async fn rendered_alert_reaches_transport() {
    let transport = Arc::new(RecordingTransport::default());
    let d = Dispatcher::new(transport.clone(), 4);
    d.dispatch(&enriched(), &subs(&["42"]));
    d.flush().await;

    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "42");
    assert!(sent[0].1.contains("<b>Election results</b>"));
    assert!(sent[0].1.contains("Category: politics"));
    assert!(sent[0].1.contains("Confidence: 80.0%"));
}

#[tokio::test(start_paused = true)]
async fn shutdown_aborts_what_misses_the_grace_period() {
    let transport = Arc::new(RecordingTransport {
        delay: Duration::from_secs(3600),
        ..Default::default()
    });
    let d = Dispatcher::new(transport.clone(), 8);
    d.dispatch(&enriched(), &subs(&["a", "b", "c"]));

    let aborted = d.shutdown(Duration::from_secs(2)).await;
    assert_eq!(aborted, 3);
    assert!(transport.sent_to().is_empty());
    assert_eq!(d.in_flight(), 0);
}

#[tokio::test]
async fn shutdown_with_nothing_pending_aborts_nothing() {
    let d = Dispatcher::new(Arc::new(RecordingTransport::default()), 1);
    assert_eq!(d.shutdown(Duration::from_millis(10)).await, 0);
}

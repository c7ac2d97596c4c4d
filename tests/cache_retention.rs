// tests/cache_retention.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use news_alert_aggregator::cache::spawn_sweeper;
use news_alert_aggregator::{shutdown, DedupCache, Item};

fn item(id: &str, title: &str) -> Item {
    Item::new(id, title, "", format!("https://n.test/{id}"), "wire", Utc::now())
}

#[test]
fn entries_survive_until_retention_then_go() {
    let cache = DedupCache::new(Duration::from_secs(24 * 3600));
    let now = Utc::now();

    let fresh = item("1", "Fresh");
    let edge = item("2", "Right at the edge");
    let stale = item("3", "Stale");
    cache.add_at(fresh.clone(), now - chrono::Duration::hours(1));
    cache.add_at(edge.clone(), now - chrono::Duration::hours(24) + chrono::Duration::seconds(1));
    cache.add_at(stale.clone(), now - chrono::Duration::hours(24) - chrono::Duration::seconds(1));

    assert_eq!(cache.sweep_expired(now), 1);
    assert!(cache.has(&fresh.fingerprint));
    assert!(cache.has(&edge.fingerprint));
    assert!(!cache.has(&stale.fingerprint));
    assert_eq!(cache.stats().total_cached_items, 2);
}

#[test]
fn re_adding_keeps_a_single_entry() {
    let cache = DedupCache::default();
    let a = item("1", "Same story");
    cache.add(a.clone());
    cache.add(a.clone());
    cache.mark_processed(&a.fingerprint);
    cache.mark_processed(&a.fingerprint);

    let st = cache.stats();
    assert_eq!(st.total_cached_items, 1);
    assert_eq!(st.processed_count, 1);
    assert_eq!(st.retention, Duration::from_secs(86_400));
}

#[test]
fn mark_processed_on_unknown_fingerprint_is_a_noop() {
    let cache = DedupCache::default();
    cache.mark_processed("deadbeef");
    assert!(cache.is_empty());
}

#[tokio::test]
async fn concurrent_writers_and_readers() {
    let cache = Arc::new(DedupCache::default());
    let mut handles = Vec::new();
    for w in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for n in 0..50 {
                let it = item(&format!("{w}-{n}"), &format!("Story {w} {n}"));
                cache.add(it.clone());
                assert!(cache.has(&it.fingerprint));
                let _ = cache.stats();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(cache.len(), 400);
}

#[tokio::test(start_paused = true)]
async fn sweeper_evicts_on_tick_and_stops_on_shutdown() {
    let cache = Arc::new(DedupCache::new(Duration::from_secs(60)));
    let old = item("1", "Old");
    let new = item("2", "New");
    cache.add_at(old.clone(), Utc::now() - chrono::Duration::minutes(5));
    cache.add(new.clone());

    let (trigger, sd) = shutdown::channel();
    let handle = spawn_sweeper(Arc::clone(&cache), Duration::from_secs(10), sd);

    // No sweep before the first interval elapses.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(cache.has(&old.fingerprint));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!cache.has(&old.fingerprint));
    assert!(cache.has(&new.fingerprint));

    trigger.trigger();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper stops")
        .unwrap();
}

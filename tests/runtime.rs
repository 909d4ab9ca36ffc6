mod common;

use adwatch::config::Config;
use adwatch::engine::Navigation;
use adwatch::runtime::WatchRuntime;
use adwatch::sync::SyncEvent;
use adwatch::time::SystemClock;
use common::{ad, FakeBackend};
use std::time::Duration;

fn config() -> Config {
    let mut config = Config::with_backend("http://rewards.test");
    config.session.shuffle = false;
    config
}

#[tokio::test(start_paused = true)]
async fn watching_to_the_end_credits_and_reports_completion() {
    let backend = FakeBackend::with_ads(100, vec![ad("a", 125)]);
    let mut runtime = WatchRuntime::new(config(), backend.clone(), SystemClock, None).unwrap();
    assert_eq!(runtime.load_catalog().await.unwrap(), 1);
    let mut events = runtime.subscribe();
    let handle = runtime.handle();
    assert!(handle.navigate(Navigation::Open(0)));

    let task = tokio::spawn(runtime.run());
    tokio::time::sleep(Duration::from_secs(130)).await;
    handle.shutdown();
    let balance = task.await.unwrap().unwrap();

    assert_eq!(backend.balance(), 102);
    assert_eq!(balance.displayed, 102);
    assert_eq!(backend.watch_call_count(), 2);
    assert_eq!(backend.completions.lock().len(), 1);
    assert!(*backend.heartbeats.lock() >= 4);
    assert_eq!(backend.presence.lock().clone(), vec!["shown:a", "left:a"]);

    let mut confirmed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::Confirmed { .. }) {
            confirmed += 1;
        }
    }
    assert_eq!(confirmed, 2);
}

#[tokio::test(start_paused = true)]
async fn navigating_away_abandons_without_completion() {
    let backend = FakeBackend::with_ads(0, vec![ad("a", 300), ad("b", 300)]);
    let mut runtime = WatchRuntime::new(config(), backend.clone(), SystemClock, None).unwrap();
    runtime.load_catalog().await.unwrap();
    let handle = runtime.handle();
    handle.navigate(Navigation::Open(0));

    let task = tokio::spawn(runtime.run());
    tokio::time::sleep(Duration::from_millis(59_500)).await;
    handle.navigate(Navigation::Next);
    tokio::time::sleep(Duration::from_millis(61_500)).await;
    handle.shutdown();
    let balance = task.await.unwrap().unwrap();

    // 59s on "a" pays nothing; 61s on "b" pays one interval.
    assert_eq!(backend.watch_call_count(), 1);
    assert_eq!(backend.watch_calls.lock()[0].ad_id, "b");
    assert_eq!(balance.displayed, 1);
    assert!(backend.completions.lock().is_empty());
    let mut presence = backend.presence.lock().clone();
    presence.sort();
    assert_eq!(presence, vec!["left:a", "left:b", "shown:a", "shown:b"]);
}

#[tokio::test(start_paused = true)]
async fn ignored_navigation_does_not_starve_the_playing_ad() {
    let backend = FakeBackend::with_ads(0, vec![ad("a", 300)]);
    let mut runtime = WatchRuntime::new(config(), backend.clone(), SystemClock, None).unwrap();
    runtime.load_catalog().await.unwrap();
    let handle = runtime.handle();
    handle.navigate(Navigation::Open(0));

    let task = tokio::spawn(runtime.run());
    // "next" at the last ad is a no-op; sent twice a second it must not hold ticks back.
    for _ in 0..250 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.navigate(Navigation::Next);
    }
    handle.shutdown();
    let balance = task.await.unwrap().unwrap();

    assert_eq!(backend.watch_call_count(), 2);
    assert_eq!(balance.displayed, 2);
    assert_eq!(backend.presence.lock().clone(), vec!["shown:a", "left:a"]);
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_stops_the_runtime() {
    let backend = FakeBackend::with_ads(7, vec![ad("a", 60)]);
    let runtime = WatchRuntime::new(config(), backend, SystemClock, None).unwrap();
    let balance = runtime.run().await.unwrap();
    assert_eq!(balance.displayed, 7);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mut config = config();
    config.policy.seconds_per_point = 0;
    let backend = FakeBackend::new(0);
    assert!(WatchRuntime::new(config, backend, SystemClock, None).is_err());
}

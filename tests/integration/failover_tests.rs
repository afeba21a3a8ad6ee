//! Integration tests for PersistenceService failover against the real
//! SQLite fallback store.

use std::sync::Arc;
use std::time::Duration;

use crate::mock_hw::{FixedClock, FlakyStore, reading_at};

use mycobox::app::ports::{Clock, ReadingStore};
use mycobox::error::StoreError;
use mycobox::persistence::health::HealthMonitor;
use mycobox::persistence::local::LocalStore;
use mycobox::persistence::{
    Backend, DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_WINDOW, PersistenceService, ReadingId,
};

fn service(primary: &FlakyStore, clock: &FixedClock) -> Arc<PersistenceService> {
    Arc::new(PersistenceService::new(
        "chamber-test",
        Some(Box::new(primary.clone())),
        Box::new(LocalStore::open_in_memory().unwrap()),
        Arc::new(clock.clone()),
    ))
}

fn service_over(primary: &FlakyStore, fallback: &FlakyStore, clock: &FixedClock) -> PersistenceService {
    PersistenceService::new(
        "chamber-test",
        Some(Box::new(primary.clone())),
        Box::new(fallback.clone()),
        Arc::new(clock.clone()),
    )
}

/// Put a row straight into `store`, bypassing the service.
fn seed(store: &FlakyStore, clock: &FixedClock, humidity: f32) {
    let mut r = reading_at(clock, humidity);
    r.server_timestamp = Some(clock.now());
    store.insert(&r).unwrap();
}

#[test]
fn starts_on_fallback_when_primary_unreachable() {
    let primary = FlakyStore::new("mongodb");
    primary.set_up(false);
    let svc = service(&primary, &FixedClock::new());

    assert_eq!(svc.current_backend(), Backend::Fallback);
    let status = svc.status();
    assert_eq!(status.store, "sqlite");
    assert!(status.primary_configured);
    assert_eq!(status.device_id, "chamber-test");
}

#[test]
fn save_fails_over_and_queries_follow() {
    let clock = FixedClock::new();
    let primary = FlakyStore::new("mongodb");
    let svc = service(&primary, &clock);
    assert_eq!(svc.current_backend(), Backend::Primary);

    let mut first = reading_at(&clock, 70.0);
    assert!(matches!(svc.save(&mut first), Ok(ReadingId::Local(1))));
    assert_eq!(primary.rows().len(), 1);

    primary.set_up(false);
    clock.advance(10);
    let mut second = reading_at(&clock, 72.0);
    assert!(matches!(svc.save(&mut second), Ok(ReadingId::Local(_))));
    assert_eq!(svc.current_backend(), Backend::Fallback);
    assert_eq!(primary.rows().len(), 1, "primary saw only the first reading");

    // Queries now come from the fallback, which only has the second one.
    let latest = svc.latest(10);
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].humidity, 72.0);
}

#[test]
fn failed_latest_on_primary_fails_over_and_answers_from_fallback() {
    let clock = FixedClock::new();
    let primary = FlakyStore::new("mongodb");
    let fallback = FlakyStore::new("sqlite");
    let svc = service_over(&primary, &fallback, &clock);
    svc.save(&mut reading_at(&clock, 70.0)).unwrap();
    seed(&fallback, &clock, 66.0);

    primary.set_reads_up(false);
    let latest = svc.latest(10);
    assert_eq!(svc.current_backend(), Backend::Fallback);
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].humidity, 66.0);

    // Writes now skip the primary even though it would accept them.
    clock.advance(10);
    svc.save(&mut reading_at(&clock, 71.0)).unwrap();
    assert_eq!(primary.rows().len(), 1);
    assert_eq!(fallback.rows().len(), 2);
}

#[test]
fn failed_history_on_primary_fails_over_and_answers_from_fallback() {
    let clock = FixedClock::new();
    let primary = FlakyStore::new("mongodb");
    let fallback = FlakyStore::new("sqlite");
    let svc = service_over(&primary, &fallback, &clock);
    svc.save(&mut reading_at(&clock, 70.0)).unwrap();
    seed(&fallback, &clock, 64.0);
    seed(&fallback, &clock, 65.0);

    primary.set_reads_up(false);
    let history = svc.history(DEFAULT_HISTORY_WINDOW, DEFAULT_HISTORY_LIMIT);
    assert_eq!(svc.current_backend(), Backend::Fallback);
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.humidity < 70.0));

    // Still on the fallback for the next query, no retry of the primary.
    primary.set_reads_up(true);
    assert_eq!(svc.latest(10).len(), 2);
    assert_eq!(svc.current_backend(), Backend::Fallback);
}

#[test]
fn stays_on_fallback_after_primary_returns_until_probed() {
    let clock = FixedClock::new();
    let primary = FlakyStore::new("mongodb");
    let svc = service(&primary, &clock);

    primary.set_up(false);
    svc.save(&mut reading_at(&clock, 70.0)).unwrap();
    assert_eq!(svc.current_backend(), Backend::Fallback);

    primary.set_up(true);
    clock.advance(10);
    svc.save(&mut reading_at(&clock, 71.0)).unwrap();
    assert_eq!(svc.current_backend(), Backend::Fallback);
    assert!(primary.rows().is_empty());

    let monitor = HealthMonitor::new(Arc::clone(&svc), Duration::from_secs(30));
    assert!(monitor.probe());
    assert!(!monitor.probe(), "already on primary, nothing to restore");
    assert_eq!(svc.current_backend(), Backend::Primary);

    clock.advance(10);
    svc.save(&mut reading_at(&clock, 72.0)).unwrap();
    assert_eq!(primary.rows().len(), 1);
}

#[test]
fn probe_failure_is_silent_and_keeps_fallback() {
    let primary = FlakyStore::new("mongodb");
    primary.set_up(false);
    let svc = service(&primary, &FixedClock::new());
    let monitor = HealthMonitor::new(Arc::clone(&svc), Duration::from_secs(30));

    for _ in 0..3 {
        assert!(!monitor.probe());
    }
    assert_eq!(svc.current_backend(), Backend::Fallback);
}

#[test]
fn both_down_save_errors_and_queries_are_empty() {
    let clock = FixedClock::new();
    let primary = FlakyStore::new("mongodb");
    let fallback = FlakyStore::new("sqlite");
    let svc = PersistenceService::new(
        "chamber-test",
        Some(Box::new(primary.clone())),
        Box::new(fallback.clone()),
        Arc::new(clock.clone()),
    );
    svc.save(&mut reading_at(&clock, 70.0)).unwrap();

    primary.set_up(false);
    fallback.set_up(false);

    let err = svc.save(&mut reading_at(&clock, 70.0)).unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert!(svc.latest(10).is_empty());
    assert!(svc.history(DEFAULT_HISTORY_WINDOW, DEFAULT_HISTORY_LIMIT).is_empty());
}

#[test]
fn save_clamps_and_stamps_monotonic_server_time() {
    let clock = FixedClock::new();
    let primary = FlakyStore::new("mongodb");
    let svc = service(&primary, &clock);

    let mut r = reading_at(&clock, 130.0);
    r.water_level = Some(-4.0);
    svc.save(&mut r).unwrap();
    assert_eq!(r.humidity, 100.0);
    assert_eq!(r.water_level, Some(0.0));

    let first_ts = r.server_timestamp.unwrap();
    clock.advance(-60);
    let mut later = reading_at(&clock, 70.0);
    svc.save(&mut later).unwrap();
    assert!(later.server_timestamp.unwrap() >= first_ts);
}

#[test]
fn history_window_excludes_old_readings() {
    let clock = FixedClock::new();
    let primary = FlakyStore::new("mongodb");
    primary.set_up(false);
    let svc = service(&primary, &clock);

    svc.save(&mut reading_at(&clock, 70.0)).unwrap();
    clock.advance(2 * 3600);
    svc.save(&mut reading_at(&clock, 71.0)).unwrap();

    let recent = svc.history(Duration::from_secs(3600), DEFAULT_HISTORY_LIMIT);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].humidity, 71.0);
    assert_eq!(svc.history(DEFAULT_HISTORY_WINDOW, 500).len(), 2);
}

#[test]
fn local_store_is_a_reading_store() {
    let store = LocalStore::open_in_memory().unwrap();
    assert_eq!(store.name(), "sqlite");
    assert!(store.ping().is_ok());
    assert!(store.latest("nobody", 10).unwrap().is_empty());
}

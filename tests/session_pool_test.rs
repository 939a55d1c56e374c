//! Integration tests for the per-account session pool.

mod support;

use std::sync::Arc;
use std::time::Duration;

use prometheus_fleet::core::{LaunchMode, ResourceKind, SessionMode};
use support::Harness;

#[tokio::test]
async fn test_get_context_creates_once_and_reuses() {
    let h = Harness::new();
    let pool = h.pool(SessionMode::Persistent);

    let first_id = pool.get_context("acct-1").await.unwrap().id;
    let second_id = pool.get_context("acct-1").await.unwrap().id;

    assert_eq!(first_id, second_id);
    assert_eq!(h.driver.launch_count(), 1);
    assert!(pool.contains("acct-1"));
    assert_eq!(pool.resident_count(), 1);
}

#[tokio::test]
async fn test_create_context_provisions_profile_identity_and_filters() {
    let h = Harness::new();
    let pool = h.pool(SessionMode::Persistent);

    let handle = pool.create_context("acct/../1").await.unwrap();
    assert!(handle.profile_dir.starts_with(h.dir.path()));
    assert!(handle.profile_dir.is_dir());

    let spec = h.driver.specs().pop().unwrap();
    assert_eq!(spec.mode, LaunchMode::Automated);
    assert_eq!(
        spec.blocked_resources,
        vec![ResourceKind::Image, ResourceKind::Media, ResourceKind::Font]
    );
    assert!(spec.init_script.contains("webdriver"));
    assert!(spec.init_script.contains("WebSocket.prototype.send"));

    // The identity is generated once and then stays stable for the account.
    let stored = h.store.fingerprint("acct/../1").unwrap();
    assert_eq!(stored, spec.identity);
    pool.create_context("acct/../1").await.unwrap();
    assert_eq!(h.driver.specs().pop().unwrap().identity, stored);
}

#[tokio::test]
async fn test_unhealthy_session_is_replaced_transparently() {
    let h = Harness::new();
    let pool = h.pool(SessionMode::Persistent);

    let original = pool.get_context("acct-1").await.unwrap().id;
    let session = h.driver.automated_for("acct-1").pop().unwrap();
    session.close_page();

    let replacement = pool.get_context("acct-1").await.unwrap();
    assert_ne!(replacement.id, original);
    assert_eq!(h.driver.automated_for("acct-1").len(), 2);
    assert!(session.close_count() >= 1);
    assert!(replacement.is_healthy().await);
}

#[tokio::test]
async fn test_disconnected_session_fails_health_check() {
    let h = Harness::new();
    let pool = h.pool(SessionMode::Persistent);
    let lease = pool.get_context("acct-1").await.unwrap();
    assert!(lease.is_healthy().await);

    h.driver.automated_for("acct-1")[0].disconnect_silently();
    assert!(!lease.is_healthy().await);
}

#[tokio::test]
async fn test_release_context_is_idempotent_in_persistent_mode() {
    let h = Harness::new();
    let pool = h.pool(SessionMode::Persistent);
    let id = pool.get_context("acct-1").await.unwrap().id;

    pool.release_context("acct-1").await;
    pool.release_context("acct-1").await;

    assert!(pool.contains("acct-1"));
    assert_eq!(h.driver.automated_for("acct-1")[0].close_count(), 0);
    assert_eq!(pool.get_context("acct-1").await.unwrap().id, id);
    assert_eq!(h.driver.launch_count(), 1);
}

#[tokio::test]
async fn test_manual_mode_closes_on_release() {
    let h = Harness::new();
    let pool = h.pool(SessionMode::Manual);

    let lease = pool.get_context("acct-1").await.unwrap();
    drop(lease);
    pool.release_context("acct-1").await;
    pool.release_context("acct-1").await;

    assert!(!pool.contains("acct-1"));
    assert_eq!(h.driver.automated_for("acct-1")[0].close_count(), 1);

    pool.get_context("acct-1").await.unwrap();
    assert_eq!(h.driver.launch_count(), 2);
}

#[tokio::test]
async fn test_close_all_then_get_context_creates_fresh_session() {
    let h = Harness::new();
    let pool = h.pool(SessionMode::Persistent);
    let before_a = pool.get_context("a").await.unwrap().id;
    pool.get_context("b").await.unwrap();

    assert_eq!(pool.close_all().await, 2);
    assert_eq!(pool.resident_count(), 0);
    for session in h.driver.launches() {
        assert_eq!(session.close_count(), 1);
        assert_eq!(session.save_count(), 1);
    }

    let after_a = pool.get_context("a").await.unwrap().id;
    assert_ne!(before_a, after_a);
    assert_eq!(h.driver.launch_count(), 3);
}

#[tokio::test]
async fn test_lease_is_exclusive_per_account() {
    let h = Harness::new();
    let pool = h.pool(SessionMode::Persistent);
    let lease = pool.get_context("acct-1").await.unwrap();

    let contender = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.get_context("acct-1").await.map(|l| l.id) })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!contender.is_finished());

    // Other accounts are not blocked.
    pool.get_context("acct-2").await.unwrap();

    let id = lease.id;
    drop(lease);
    assert_eq!(contender.await.unwrap().unwrap(), id);
}

#[tokio::test]
async fn test_evict_waits_for_lease_then_closes() {
    let h = Harness::new();
    let pool = h.pool(SessionMode::Persistent);
    let lease = pool.get_context("acct-1").await.unwrap();

    let evict = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.evict("acct-1").await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!evict.is_finished());
    assert!(pool.contains("acct-1"));

    drop(lease);
    assert!(evict.await.unwrap());
    assert!(!pool.contains("acct-1"));
    assert_eq!(h.driver.automated_for("acct-1")[0].close_count(), 1);
    assert!(!pool.evict("acct-1").await);
}

#[tokio::test]
async fn test_launch_failure_propagates() {
    let h = Harness::new();
    let pool = h.pool(SessionMode::Persistent);
    h.driver.set_fail_automated(true);

    assert!(pool.get_context("acct-1").await.is_err());
    assert!(!pool.contains("acct-1"));

    h.driver.set_fail_automated(false);
    assert!(pool.get_context("acct-1").await.is_ok());
}

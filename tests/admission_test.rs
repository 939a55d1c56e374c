//! Integration tests for the interactive window admission queue.

mod support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus_fleet::core::{
    AdmissionEntry, AdmissionQueue, AdmissionReason, AuditSink, BrowserSession,
    BrowserWindowLauncher, FleetError, InMemoryAuditSink, LaunchMode, SharedAuditSink,
    SharedMemoryAuditSink, WindowLauncher, WindowObserver,
};
use support::{wait_until, Harness};

const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct RecordingObserver {
    closed: Mutex<Vec<(String, AdmissionReason)>>,
}

impl RecordingObserver {
    fn accounts(&self) -> Vec<String> {
        self.closed.lock().iter().map(|(a, _)| a.clone()).collect()
    }
}

#[async_trait]
impl WindowObserver for RecordingObserver {
    async fn on_window_closed(&self, account_id: &str, reason: &AdmissionReason) {
        self.closed
            .lock()
            .push((account_id.to_string(), reason.clone()));
    }
}

/// Opens windows through the real launcher after a fixed delay.
struct SlowLauncher {
    inner: BrowserWindowLauncher,
    delay: Duration,
}

#[async_trait]
impl WindowLauncher for SlowLauncher {
    async fn open(&self, entry: &AdmissionEntry) -> Result<Arc<dyn BrowserSession>, FleetError> {
        tokio::time::sleep(self.delay).await;
        self.inner.open(entry).await
    }
}

fn observed(queue: &AdmissionQueue) -> Arc<RecordingObserver> {
    let observer = Arc::new(RecordingObserver::default());
    queue.set_observer(observer.clone());
    observer
}

#[tokio::test]
async fn test_second_account_opens_automatically_when_first_closes() {
    let h = Harness::new();
    let queue = h.admission(1);
    let observer = observed(&queue);

    assert_eq!(queue.enqueue("a", AdmissionReason::LoginFailed, true), Some(1));
    assert!(wait_until(WAIT, || queue.is_active("a")).await);

    queue.enqueue("b", AdmissionReason::ChallengeDetected, true);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!queue.is_active("b"));
    assert_eq!(queue.queued_len(), 1);
    assert!(queue.is_tracked("b"));

    // The human closes A's window; nothing else triggers the drain.
    h.driver.interactive_for("a")[0].kill();

    assert!(wait_until(WAIT, || queue.is_active("b")).await);
    assert!(!queue.is_tracked("a"));
    assert_eq!(queue.queued_len(), 0);
    assert!(wait_until(WAIT, || observer.accounts() == vec!["a".to_string()]).await);
}

#[tokio::test]
async fn test_enqueue_is_idempotent_per_account() {
    let h = Harness::new();
    let queue = h.admission(1);

    assert_eq!(queue.enqueue("a", AdmissionReason::LoginFailed, true), Some(1));
    assert!(wait_until(WAIT, || queue.is_active("a")).await);
    assert_eq!(queue.enqueue("a", AdmissionReason::LoginFailed, true), None);

    assert_eq!(queue.enqueue("b", AdmissionReason::LoginFailed, true), Some(1));
    assert_eq!(queue.enqueue("b", AdmissionReason::ChallengeDetected, false), None);
    assert_eq!(queue.queued_len(), 1);
    assert_eq!(h.driver.interactive_for("a").len(), 1);
}

#[tokio::test]
async fn test_active_windows_never_exceed_cap() {
    let h = Harness::new();
    let queue = h.admission(2);

    for account in ["a", "b", "c", "d", "e"] {
        queue.enqueue(account, AdmissionReason::LoginFailed, true);
    }
    assert!(wait_until(WAIT, || queue.active_len() == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(queue.active_len(), 2);
    assert_eq!(queue.queued_len(), 3);

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.max_windows, 2);
    assert_eq!(snapshot.active, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(snapshot.queued, vec!["c", "d", "e"]);

    // Close windows one at a time; each close admits exactly the next in line.
    for (closing, next) in [("a", "c"), ("b", "d"), ("c", "e")] {
        assert!(queue.close_window(closing).await);
        assert!(wait_until(WAIT, || queue.is_active(next)).await);
        assert!(queue.active_len() <= 2);
    }
}

#[tokio::test]
async fn test_interactive_launch_carries_reason_and_auto_close() {
    let h = Harness::new();
    let queue = h.admission(1);
    queue.enqueue("a", AdmissionReason::ChallengeDetected, true);
    assert!(wait_until(WAIT, || queue.is_active("a")).await);

    let spec = h.driver.specs().pop().unwrap();
    assert_eq!(
        spec.mode,
        LaunchMode::Interactive {
            reason: "challenge detected".into(),
            auto_close: true,
        }
    );
}

#[tokio::test]
async fn test_failed_open_releases_slot_and_notifies() {
    let h = Harness::new();
    let queue = h.admission(1);
    let observer = observed(&queue);
    h.driver.fail_interactive_for("broken");

    queue.enqueue("broken", AdmissionReason::LoginFailed, true);
    queue.enqueue("ok", AdmissionReason::LoginFailed, true);

    assert!(wait_until(WAIT, || queue.is_active("ok")).await);
    assert!(!queue.is_tracked("broken"));
    assert!(wait_until(WAIT, || observer.accounts() == vec!["broken".to_string()]).await);
}

#[tokio::test]
async fn test_heal_finalizes_silently_disconnected_windows() {
    let h = Harness::new();
    let queue = h.admission(1);
    let observer = observed(&queue);

    queue.enqueue("a", AdmissionReason::LoginFailed, true);
    assert!(wait_until(WAIT, || queue.is_active("a")).await);
    queue.enqueue("b", AdmissionReason::LoginFailed, true);

    h.driver.interactive_for("a")[0].disconnect_silently();
    assert_eq!(queue.heal().await, 1);
    assert!(!queue.is_active("a"));
    assert_eq!(observer.accounts(), vec!["a".to_string()]);
    assert!(wait_until(WAIT, || queue.is_active("b")).await);
    assert_eq!(queue.heal().await, 0);
}

#[tokio::test]
async fn test_close_all_empties_queue_without_notifying() {
    let h = Harness::new();
    let queue = h.admission(1);
    let observer = observed(&queue);

    queue.enqueue("a", AdmissionReason::LoginFailed, true);
    assert!(wait_until(WAIT, || queue.is_active("a")).await);
    queue.enqueue("b", AdmissionReason::LoginFailed, true);
    queue.enqueue("c", AdmissionReason::Manual("operator".into()), false);

    assert_eq!(queue.close_all().await, (1, 2));
    assert_eq!(queue.active_len(), 0);
    assert_eq!(queue.queued_len(), 0);
    let window = &h.driver.interactive_for("a")[0];
    assert_eq!(window.close_count(), 1);
    assert_eq!(window.save_count(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(observer.accounts().is_empty());
    assert!(h.driver.interactive_for("b").is_empty());
}

#[tokio::test]
async fn test_audit_trail_records_window_lifecycle() {
    let h = Harness::new();
    let trail = Arc::new(Mutex::new(InMemoryAuditSink::new(16)));
    let sink: SharedAuditSink = Arc::new(Mutex::new(
        Box::new(SharedMemoryAuditSink(trail.clone())) as Box<dyn AuditSink>,
    ));
    let queue = h.admission(1).with_audit(sink);

    queue.enqueue("a", AdmissionReason::LoginFailed, true);
    assert!(wait_until(WAIT, || queue.is_active("a")).await);
    assert!(queue.close_window("a").await);

    let actions: Vec<String> = trail.lock().events().into_iter().map(|e| e.action).collect();
    assert_eq!(actions, vec!["enqueue", "window_open", "window_close"]);
}

#[tokio::test]
async fn test_close_all_closes_window_still_being_opened() {
    let h = Harness::new();
    let launcher = SlowLauncher {
        inner: BrowserWindowLauncher::new(h.driver.clone(), h.provisioner.clone()),
        delay: Duration::from_millis(100),
    };
    let queue = AdmissionQueue::new(1, Arc::new(launcher));
    let observer = observed(&queue);

    queue.enqueue("a", AdmissionReason::LoginFailed, true);
    assert!(wait_until(WAIT, || queue.snapshot().opening == vec!["a".to_string()]).await);

    assert_eq!(queue.close_all().await, (0, 1));
    assert!(queue.is_closed());
    assert!(!queue.is_tracked("a"));

    // The launch completes after teardown and is closed straight away.
    assert!(wait_until(WAIT, || h.driver.interactive_for("a").len() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.driver.interactive_for("a")[0].close_count(), 1);
    assert_eq!(queue.active_len(), 0);
    assert!(!queue.is_tracked("a"));
    assert!(observer.accounts().is_empty());

    // A closed queue admits nothing new.
    assert_eq!(queue.enqueue("b", AdmissionReason::LoginFailed, true), None);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(h.driver.interactive_for("b").is_empty());
}

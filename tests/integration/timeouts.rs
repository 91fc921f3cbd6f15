//! Timeout and late-outcome semantics, under a paused tokio clock.
//!
//! The backend here accepts every request, counts the calls, and delivers
//! nothing; the test injects late outcomes by hand through the event
//! channel the pump consumes. Covers the rollback-to-Unauthenticated
//! fail-safe, the corrective logout for a late login success, and the
//! compensating leave for a late join confirmation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sigchat::console::{ConsoleDriver, ScriptedConsole};
use sigchat::session::{SessionConfig, SessionController, SessionState};
use sigchat_signal::{ChannelId, SessionId, SignalBackend, SignalError, SignalEvent};

/// Backend that acknowledges every request and never answers.
#[derive(Clone, Default)]
struct SilentBackend {
    logins: Arc<AtomicUsize>,
    logouts: Arc<AtomicUsize>,
    joins: Arc<AtomicUsize>,
    leaves: Arc<AtomicUsize>,
}

impl SignalBackend for SilentBackend {
    async fn login(&self, _account: &str, _token: &str) -> Result<(), SignalError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self, _session: SessionId) -> Result<(), SignalError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_peer_message(
        &self,
        _session: SessionId,
        _peer: &str,
        _text: &str,
    ) -> Result<(), SignalError> {
        Ok(())
    }

    async fn join_channel(&self, _session: SessionId, _name: &str) -> Result<(), SignalError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn leave_channel(
        &self,
        _session: SessionId,
        _channel: ChannelId,
    ) -> Result<(), SignalError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_channel_message(
        &self,
        _session: SessionId,
        _channel: ChannelId,
        _text: &str,
    ) -> Result<(), SignalError> {
        Ok(())
    }
}

type Controller = SessionController<SilentBackend, ScriptedConsole>;

/// Start a controller over a silent backend. Returns the event sender the
/// test uses to inject outcomes.
fn start_silent() -> (
    Arc<Controller>,
    SilentBackend,
    ConsoleDriver,
    mpsc::Sender<SignalEvent>,
    JoinHandle<()>,
) {
    let backend = SilentBackend::default();
    let (event_tx, event_rx) = mpsc::channel(64);
    let (console, driver) = ScriptedConsole::pair();
    let controller = Arc::new(SessionController::new(
        backend.clone(),
        Arc::new(console),
        SessionConfig::default(),
    ));
    let _pump = controller.spawn_event_pump(event_rx);
    let runner = {
        let c = Arc::clone(&controller);
        tokio::spawn(async move { c.run().await })
    };
    (controller, backend, driver, event_tx, runner)
}

/// Poll a condition; bounded by iterations so it terminates under a
/// paused clock.
async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..1000 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(start_paused = true)]
async fn login_timeout_forces_unauthenticated() {
    let (controller, backend, driver, _event_tx, runner) = start_silent();

    driver.send_line("alice");
    assert!(driver.wait_for("login timed out").await);

    assert_eq!(controller.state(), SessionState::Unauthenticated);
    assert_eq!(controller.current_account(), None);
    // No session ever materialized, so nothing to correct yet.
    assert_eq!(backend.logouts.load(Ordering::SeqCst), 0);

    driver.close();
    runner.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn late_login_success_triggers_exactly_one_corrective_logout() {
    let (controller, backend, driver, event_tx, runner) = start_silent();

    driver.send_line("alice");
    assert!(driver.wait_for("login timed out").await);

    // The backend finally answers, long after the controller gave up.
    let session = SessionId::new();
    event_tx
        .send(SignalEvent::LoginSucceeded {
            account: "alice".to_string(),
            session,
            uid: 1,
        })
        .await
        .unwrap();

    assert!(wait_until(|| backend.logouts.load(Ordering::SeqCst) == 1).await);
    // The stale success must not resurrect the session.
    assert_eq!(controller.state(), SessionState::Unauthenticated);
    assert_eq!(controller.current_account(), None);

    // And it is corrected exactly once.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.logouts.load(Ordering::SeqCst), 1);

    driver.close();
    runner.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn logout_timeout_rolls_back_and_reissues_logout() {
    let (controller, backend, driver, event_tx, runner) = start_silent();

    driver.send_line("alice");
    assert!(wait_until(|| backend.logins.load(Ordering::SeqCst) == 1).await);
    let session = SessionId::new();
    event_tx
        .send(SignalEvent::LoginSucceeded {
            account: "alice".to_string(),
            session,
            uid: 1,
        })
        .await
        .unwrap();
    assert!(driver.wait_for("logged in as alice").await);

    driver.send_line("logout");
    assert!(driver.wait_for("logout timed out").await);

    assert_eq!(controller.state(), SessionState::Unauthenticated);
    assert_eq!(controller.current_account(), None);
    // One logout for the request itself, one reissued by the rollback.
    assert!(wait_until(|| backend.logouts.load(Ordering::SeqCst) == 2).await);

    driver.close();
    runner.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn join_timeout_drops_to_unauthenticated_and_logs_out() {
    let (controller, backend, driver, event_tx, runner) = start_silent();

    driver.send_line("alice");
    assert!(wait_until(|| backend.logins.load(Ordering::SeqCst) == 1).await);
    event_tx
        .send(SignalEvent::LoginSucceeded {
            account: "alice".to_string(),
            session: SessionId::new(),
            uid: 1,
        })
        .await
        .unwrap();
    assert!(driver.wait_for("logged in as alice").await);

    driver.send_line("2");
    driver.send_line("lobby");
    assert!(driver.wait_for("channel join timed out").await);

    // Network uncertainty resolves to the most restrictive state, and the
    // live session is logged out rather than orphaned.
    assert_eq!(controller.state(), SessionState::Unauthenticated);
    assert_eq!(controller.current_account(), None);
    assert!(wait_until(|| backend.logouts.load(Ordering::SeqCst) == 1).await);

    driver.close();
    runner.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn late_join_confirmation_triggers_compensating_leave() {
    let (controller, backend, driver, event_tx, runner) = start_silent();

    driver.send_line("alice");
    assert!(wait_until(|| backend.logins.load(Ordering::SeqCst) == 1).await);
    event_tx
        .send(SignalEvent::LoginSucceeded {
            account: "alice".to_string(),
            session: SessionId::new(),
            uid: 1,
        })
        .await
        .unwrap();
    assert!(driver.wait_for("logged in as alice").await);

    driver.send_line("2");
    driver.send_line("lobby");
    assert!(driver.wait_for("channel join timed out").await);

    // The join finally lands; the membership it created is abandoned, so
    // the pump leaves the channel on our behalf.
    event_tx
        .send(SignalEvent::ChannelJoined {
            channel: ChannelId::new(),
            name: "lobby".to_string(),
        })
        .await
        .unwrap();

    assert!(wait_until(|| backend.leaves.load(Ordering::SeqCst) == 1).await);
    assert_eq!(controller.state(), SessionState::Unauthenticated);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.leaves.load(Ordering::SeqCst), 1);

    driver.close();
    runner.await.unwrap();
}

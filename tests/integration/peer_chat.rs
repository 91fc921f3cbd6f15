//! Integration tests for peer-to-peer conversations.
//!
//! One side runs the full controller + event pump; the peer is a raw hub
//! client driven directly by the test. Covers self-record appending on
//! delivery confirmation, history replay on re-entry, history wipe on
//! logout, incoming message recording, and the offline-peer failure path.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sigchat::console::{ConsoleDriver, ScriptedConsole};
use sigchat::history::ConversationKey;
use sigchat::session::{SessionConfig, SessionController, SessionState};
use sigchat_signal::hub::{HubClient, LocalSignalHub};
use sigchat_signal::{SessionId, SignalBackend, SignalEvent};

type Controller = SessionController<HubClient, ScriptedConsole>;

fn start_client(hub: &LocalSignalHub) -> (Arc<Controller>, ConsoleDriver, JoinHandle<()>) {
    let (backend, events) = hub.attach(64);
    let (console, driver) = ScriptedConsole::pair();
    let controller = Arc::new(SessionController::new(
        backend,
        Arc::new(console),
        SessionConfig::default(),
    ));
    let _pump = controller.spawn_event_pump(events);
    let runner = {
        let c = Arc::clone(&controller);
        tokio::spawn(async move { c.run().await })
    };
    (controller, driver, runner)
}

/// Log a raw (non-controller) client in and return its session handle.
async fn raw_login(
    client: &HubClient,
    rx: &mut mpsc::Receiver<SignalEvent>,
    account: &str,
) -> SessionId {
    client.login(account, "_no_need_token").await.unwrap();
    loop {
        if let SignalEvent::LoginSucceeded { session, .. } = rx.recv().await.unwrap() {
            return session;
        }
    }
}

/// Drive the controller through login and into a conversation with `peer`.
async fn into_peer_chat(driver: &ConsoleDriver, account: &str, peer: &str) {
    driver.send_line(account);
    assert!(driver.wait_for(&format!("logged in as {account}")).await);
    driver.send_line("1");
    driver.send_line(peer);
    assert!(driver.wait_for("message(s) of history").await);
}

#[tokio::test]
async fn delivered_send_appends_exactly_one_self_record() {
    let hub = LocalSignalHub::new();
    let (bob_client, mut bob_rx) = hub.attach(64);
    raw_login(&bob_client, &mut bob_rx, "bob").await;

    let (controller, driver, runner) = start_client(&hub);
    into_peer_chat(&driver, "alice", "bob").await;

    driver.send_line("hi");
    assert!(driver.wait_for("alice: hi").await);

    driver.send_line("leave");
    driver.close();
    runner.await.unwrap();

    let records = controller.history(&ConversationKey::Peer("bob".to_string()));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sender, "alice");
    assert_eq!(records[0].text, "hi");

    // The peer actually received it.
    loop {
        match bob_rx.recv().await.unwrap() {
            SignalEvent::PeerMessage { from, text, .. } => {
                assert_eq!(from, "alice");
                assert_eq!(text, "hi");
                break;
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn re_entering_a_conversation_replays_history_in_order() {
    let hub = LocalSignalHub::new();
    let (bob_client, mut bob_rx) = hub.attach(64);
    raw_login(&bob_client, &mut bob_rx, "bob").await;

    let (controller, driver, runner) = start_client(&hub);
    into_peer_chat(&driver, "alice", "bob").await;

    driver.send_line("first");
    assert!(driver.wait_for("alice: first").await);
    driver.send_line("second");
    assert!(driver.wait_for("alice: second").await);
    driver.send_line("leave");

    // Re-enter: the stored history is replayed, same order.
    driver.send_line("1");
    driver.send_line("bob");
    assert!(driver.wait_for("2 message(s) of history").await);
    assert!(driver.wait_for_count("alice: first", 2).await);
    assert!(driver.wait_for_count("alice: second", 2).await);

    driver.send_line("leave");
    driver.close();
    runner.await.unwrap();

    let records = controller.history(&ConversationKey::Peer("bob".to_string()));
    let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[tokio::test]
async fn logout_wipes_every_conversation() {
    let hub = LocalSignalHub::new();
    let (bob_client, mut bob_rx) = hub.attach(64);
    raw_login(&bob_client, &mut bob_rx, "bob").await;

    let (controller, driver, runner) = start_client(&hub);
    into_peer_chat(&driver, "alice", "bob").await;

    driver.send_line("hi");
    assert!(driver.wait_for("alice: hi").await);
    driver.send_line("leave");

    driver.send_line("logout");
    assert!(driver.wait_for("logged out").await);
    assert!(controller
        .history(&ConversationKey::Peer("bob".to_string()))
        .is_empty());

    // A fresh login sees an empty history for the same peer key.
    driver.send_line("alice");
    assert!(driver.wait_for_count("logged in as alice", 2).await);
    driver.send_line("1");
    driver.send_line("bob");
    assert!(driver.wait_for("0 message(s) of history").await);

    driver.close();
    runner.await.unwrap();
    assert_eq!(controller.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn incoming_message_is_printed_and_recorded() {
    let hub = LocalSignalHub::new();
    let (bob_client, mut bob_rx) = hub.attach(64);
    let bob_session = raw_login(&bob_client, &mut bob_rx, "bob").await;

    let (controller, driver, runner) = start_client(&hub);
    into_peer_chat(&driver, "alice", "bob").await;

    bob_client
        .send_peer_message(bob_session, "alice", "hello there")
        .await
        .unwrap();
    assert!(driver.wait_for("bob: hello there").await);

    driver.send_line("leave");
    driver.close();
    runner.await.unwrap();

    let records = controller.history(&ConversationKey::Peer("bob".to_string()));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sender, "bob");
}

#[tokio::test]
async fn send_to_offline_peer_reports_failure_and_records_nothing() {
    let hub = LocalSignalHub::new();
    let (controller, driver, runner) = start_client(&hub);
    into_peer_chat(&driver, "alice", "ghost").await;

    driver.send_line("anyone home?");
    assert!(driver.wait_for("message to ghost failed").await);

    driver.send_line("leave");
    driver.close();
    runner.await.unwrap();

    assert!(controller
        .history(&ConversationKey::Peer("ghost".to_string()))
        .is_empty());
}

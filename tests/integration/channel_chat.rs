//! Integration tests for channel conversations.
//!
//! The controller side joins and chats through the scripted console; other
//! members are raw hub clients driven directly by the test.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sigchat::console::{ConsoleDriver, ScriptedConsole};
use sigchat::history::ConversationKey;
use sigchat::session::{SessionConfig, SessionController, SessionState};
use sigchat_signal::hub::{HubClient, LocalSignalHub};
use sigchat_signal::{ChannelId, SessionId, SignalBackend, SignalEvent};

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

async fn raw_join(
    client: &HubClient,
    rx: &mut mpsc::Receiver<SignalEvent>,
    session: SessionId,
    name: &str,
) -> ChannelId {
    client.join_channel(session, name).await.unwrap();
    loop {
        if let SignalEvent::ChannelJoined { channel, .. } = rx.recv().await.unwrap() {
            return channel;
        }
    }
}

/// Drive the controller through login and into the named channel.
async fn into_channel(driver: &ConsoleDriver, account: &str, channel: &str) {
    driver.send_line(account);
    assert!(driver.wait_for(&format!("logged in as {account}")).await);
    driver.send_line("2");
    driver.send_line(channel);
    assert!(driver.wait_for(&format!("joined channel {channel}")).await);
    assert!(driver.wait_for("message(s) of history").await);
}

#[tokio::test]
async fn member_messages_are_printed_and_recorded() {
    let hub = LocalSignalHub::new();
    let (bob_client, mut bob_rx) = hub.attach(64);
    let bob_session = raw_login(&bob_client, &mut bob_rx, "bob").await;
    let bob_channel = raw_join(&bob_client, &mut bob_rx, bob_session, "lobby").await;

    let (controller, driver, runner) = start_client(&hub);
    into_channel(&driver, "alice", "lobby").await;

    bob_client
        .send_channel_message(bob_session, bob_channel, "welcome")
        .await
        .unwrap();
    assert!(driver.wait_for("bob: welcome").await);

    driver.send_line("leave");
    driver.close();
    runner.await.unwrap();

    let records = controller.history(&ConversationKey::Channel("lobby".to_string()));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sender, "bob");
    assert_eq!(records[0].text, "welcome");

    // Leaving removed alice from the hub's membership.
    assert_eq!(hub.channel_members("lobby"), vec!["bob".to_string()]);
}

#[tokio::test]
async fn own_channel_messages_reach_members_but_are_not_recorded() {
    let hub = LocalSignalHub::new();
    let (bob_client, mut bob_rx) = hub.attach(64);
    let bob_session = raw_login(&bob_client, &mut bob_rx, "bob").await;
    raw_join(&bob_client, &mut bob_rx, bob_session, "lobby").await;

    let (controller, driver, runner) = start_client(&hub);
    into_channel(&driver, "alice", "lobby").await;

    driver.send_line("hi all");

    // Bob receives it.
    loop {
        match bob_rx.recv().await.unwrap() {
            SignalEvent::ChannelMessage { from, text, .. } => {
                assert_eq!(from, "alice");
                assert_eq!(text, "hi all");
                break;
            }
            _ => {}
        }
    }

    driver.send_line("leave");
    driver.close();
    runner.await.unwrap();

    // Channel sends have no delivery confirmation and are not recorded.
    assert!(controller
        .history(&ConversationKey::Channel("lobby".to_string()))
        .is_empty());
}

#[tokio::test]
async fn membership_notices_are_printed() {
    let hub = LocalSignalHub::new();
    let (controller, driver, runner) = start_client(&hub);
    into_channel(&driver, "alice", "lobby").await;

    let (bob_client, mut bob_rx) = hub.attach(64);
    let bob_session = raw_login(&bob_client, &mut bob_rx, "bob").await;
    let bob_channel = raw_join(&bob_client, &mut bob_rx, bob_session, "lobby").await;
    assert!(driver.wait_for("bob joined lobby").await);

    bob_client
        .leave_channel(bob_session, bob_channel)
        .await
        .unwrap();
    assert!(driver.wait_for("bob left lobby").await);

    driver.send_line("leave");
    driver.close();
    runner.await.unwrap();
    assert_eq!(controller.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn re_entering_a_channel_replays_history() {
    let hub = LocalSignalHub::new();
    let (bob_client, mut bob_rx) = hub.attach(64);
    let bob_session = raw_login(&bob_client, &mut bob_rx, "bob").await;
    let bob_channel = raw_join(&bob_client, &mut bob_rx, bob_session, "lobby").await;

    let (_controller, driver, runner) = start_client(&hub);
    into_channel(&driver, "alice", "lobby").await;

    bob_client
        .send_channel_message(bob_session, bob_channel, "for the record")
        .await
        .unwrap();
    assert!(driver.wait_for("bob: for the record").await);

    driver.send_line("leave");
    driver.send_line("2");
    driver.send_line("lobby");
    assert!(driver.wait_for("1 message(s) of history").await);
    assert!(driver.wait_for_count("bob: for the record", 2).await);

    driver.send_line("leave");
    driver.close();
    runner.await.unwrap();
}

#[tokio::test]
async fn leave_at_channel_prompt_returns_to_menu() {
    let hub = LocalSignalHub::new();
    let (controller, driver, runner) = start_client(&hub);

    driver.send_line("alice");
    assert!(driver.wait_for("logged in as alice").await);
    driver.send_line("2");
    driver.send_line("leave");
    driver.close();
    runner.await.unwrap();

    assert_eq!(controller.state(), SessionState::Authenticated);
    assert!(hub.channel_members("lobby").is_empty());
}

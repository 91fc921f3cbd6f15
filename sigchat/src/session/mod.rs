//! The session controller: a finite-state machine that serializes the
//! asynchronous signaling backend into a synchronous interactive loop.
//!
//! The controller owns the interactive side: it reads terminal input,
//! validates it, issues backend requests, and blocks on a [`WaitGate`]
//! until the event pump (see [`events`]) applies the outcome or the wait
//! times out. All session state lives in one [`Shared`] struct behind one
//! `parking_lot::Mutex`, shared with the pump; the lock is held briefly
//! and never across an await point.
//!
//! Timeout policy: any pending operation that exceeds its deadline forces
//! the session back to Unauthenticated, the most restrictive state, and
//! issues a best-effort logout of any live backend session so nothing is
//! orphaned. Outcomes arriving after a timeout are detected through the
//! gate's latched flag and get cleanup only (corrective logout for a late
//! login, compensating leave for a late join).

pub mod events;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use sigchat_signal::{ChannelId, SessionId, SignalBackend, SignalEvent};

use crate::console::Console;
use crate::gate::WaitGate;
use crate::history::{ConversationKey, ConversationStore, MessageRecord};
use crate::ident::validate_ident;

/// Keyword that logs out from the menu.
pub const CMD_LOGOUT: &str = "logout";
/// Menu choice for a peer-to-peer conversation.
pub const CMD_PEER_CHAT: &str = "1";
/// Menu choice for a channel conversation.
pub const CMD_CHANNEL_CHAT: &str = "2";
/// Keyword that exits a conversation (or a name prompt).
pub const CMD_LEAVE: &str = "leave";

/// Where the session currently is. Exactly one value at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No backend session; the account prompt is active.
    Unauthenticated,
    /// Logged in; the menu is active.
    Authenticated,
    /// In (or entering) a peer-to-peer conversation.
    PeerConversation,
    /// In (or entering) a channel conversation.
    ChannelConversation,
}

/// The logged-in user and their backend handles.
#[derive(Debug, Clone)]
pub struct ActiveUser {
    /// Account name.
    pub account: String,
    /// Backend-assigned numeric user id.
    pub uid: u32,
    /// Backend session handle.
    pub session: SessionId,
    /// Channel handle while a channel conversation is active.
    pub channel: Option<ChannelId>,
}

/// Which operation a pending gate belongs to.
#[derive(Debug, Clone)]
pub(crate) enum PendingKind {
    Login { account: String },
    Logout,
    ChannelJoin { name: String, session: SessionId },
}

/// The single outstanding asynchronous operation, if any.
#[derive(Debug, Clone)]
pub(crate) struct PendingOp {
    pub(crate) kind: PendingKind,
    pub(crate) gate: WaitGate,
}

/// The working buffer for the conversation currently on screen. Loaded
/// from the store on entry, appended to by the event pump, persisted back
/// on leave.
#[derive(Debug)]
pub(crate) struct ActiveConversation {
    pub(crate) key: ConversationKey,
    pub(crate) records: Vec<MessageRecord>,
}

/// All mutable session state, guarded by one lock.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: SessionState,
    pub(crate) user: Option<ActiveUser>,
    pub(crate) store: ConversationStore,
    pub(crate) active: Option<ActiveConversation>,
    pub(crate) pending: Option<PendingOp>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            user: None,
            store: ConversationStore::new(),
            active: None,
            pending: None,
        }
    }
}

/// Tunables for the controller.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for any pending asynchronous operation.
    pub op_timeout: Duration,
    /// Token passed to the backend on login.
    pub token: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_millis(10_000),
            token: "_no_need_token".to_string(),
        }
    }
}

/// The interactive session controller.
pub struct SessionController<B: SignalBackend, C: Console> {
    backend: B,
    console: Arc<C>,
    shared: Arc<Mutex<Shared>>,
    config: SessionConfig,
    shutdown: AtomicBool,
}

impl<B: SignalBackend, C: Console> SessionController<B, C> {
    /// Create a controller over the given backend and console.
    pub fn new(backend: B, console: Arc<C>, config: SessionConfig) -> Self {
        Self {
            backend,
            console,
            shared: Arc::new(Mutex::new(Shared::new())),
            config,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Spawn the event pump consuming this controller's backend events.
    ///
    /// The pump applies each [`SignalEvent`] to the shared session state
    /// and performs any corrective backend calls a stale outcome requires.
    pub fn spawn_event_pump(
        &self,
        events: mpsc::Receiver<SignalEvent>,
    ) -> tokio::task::JoinHandle<()> {
        events::spawn_event_pump(
            Arc::clone(&self.shared),
            self.backend.clone(),
            Arc::clone(&self.console),
            events,
        )
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Account of the logged-in user, if any.
    #[must_use]
    pub fn current_account(&self) -> Option<String> {
        self.shared.lock().user.as_ref().map(|u| u.account.clone())
    }

    /// Snapshot of the stored history for one conversation.
    #[must_use]
    pub fn history(&self, key: &ConversationKey) -> Vec<MessageRecord> {
        self.shared.lock().store.load(key)
    }

    /// Ask the run loop to stop after the current handler returns.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Drive the interactive loop until shutdown (end of input).
    pub async fn run(&self) {
        self.console.print("== sigchat ==");
        while !self.shutting_down() {
            let state = self.shared.lock().state;
            match state {
                SessionState::Unauthenticated => self.handle_unauthenticated().await,
                SessionState::Authenticated => self.handle_authenticated().await,
                SessionState::PeerConversation => self.handle_peer_conversation().await,
                SessionState::ChannelConversation => self.handle_channel_conversation().await,
            }
        }
        tracing::info!("session controller stopped");
    }

    /// Read one line, translating end of input into a shutdown request.
    async fn read_line(&self, prompt: &str) -> Option<String> {
        match self.console.read_line(prompt).await {
            Ok(Some(line)) => Some(line),
            Ok(None) => {
                self.request_shutdown();
                None
            }
            Err(err) => {
                tracing::error!(error = %err, "console read failed");
                self.request_shutdown();
                None
            }
        }
    }

    // -- Unauthenticated ---------------------------------------------------

    async fn handle_unauthenticated(&self) {
        self.console.print("Enter an account name to log in.");
        let Some(line) = self.read_line("account> ").await else {
            return;
        };
        match validate_ident(&line, None) {
            Ok(()) => self.login(&line).await,
            Err(err) => self.console.print(&format!("invalid account name: {err}")),
        }
    }

    /// Issue a login and wait for the outcome. Success is applied by the
    /// event pump; this side only handles the timeout.
    async fn login(&self, account: &str) {
        let gate = WaitGate::new();
        self.shared.lock().pending = Some(PendingOp {
            kind: PendingKind::Login {
                account: account.to_owned(),
            },
            gate: gate.clone(),
        });

        if let Err(err) = self.backend.login(account, &self.config.token).await {
            self.shared.lock().pending = None;
            self.console.print(&format!("login failed: {err}"));
            return;
        }

        if !gate.wait(self.config.op_timeout).await {
            self.rollback_after_timeout("login").await;
        }
    }

    // -- Authenticated (menu) ----------------------------------------------

    async fn handle_authenticated(&self) {
        self.console.print("Commands: 'logout', '1' peer chat, '2' channel chat.");
        let Some(line) = self.read_line("menu> ").await else {
            return;
        };
        match line.as_str() {
            CMD_LOGOUT => self.logout().await,
            CMD_PEER_CHAT => self.switch_from_menu(SessionState::PeerConversation),
            CMD_CHANNEL_CHAT => self.switch_from_menu(SessionState::ChannelConversation),
            other => self
                .console
                .print(&format!("unrecognized command: {other}")),
        }
    }

    /// Apply a menu transition only if still on the menu; a forced logout
    /// may have raced the read.
    fn switch_from_menu(&self, next: SessionState) {
        let mut s = self.shared.lock();
        if s.state == SessionState::Authenticated {
            s.state = next;
        }
    }

    /// Issue a logout and wait for the outcome. The event pump clears the
    /// user and every conversation history when the backend confirms.
    async fn logout(&self) {
        let Some(session) = self.shared.lock().user.as_ref().map(|u| u.session) else {
            return;
        };
        let gate = WaitGate::new();
        self.shared.lock().pending = Some(PendingOp {
            kind: PendingKind::Logout,
            gate: gate.clone(),
        });

        if let Err(err) = self.backend.logout(session).await {
            self.shared.lock().pending = None;
            self.console.print(&format!("logout failed: {err}"));
            return;
        }

        if !gate.wait(self.config.op_timeout).await {
            self.rollback_after_timeout("logout").await;
        }
    }

    // -- Peer conversations ------------------------------------------------

    async fn handle_peer_conversation(&self) {
        self.console
            .print("Enter the peer account to chat with, or 'leave' to go back.");
        let Some(line) = self.read_line("peer> ").await else {
            return;
        };
        if line == CMD_LEAVE {
            self.return_to_menu(SessionState::PeerConversation);
            return;
        }
        let current = self.current_account();
        match validate_ident(&line, current.as_deref()) {
            Ok(()) => self.enter_peer_conversation(&line).await,
            Err(err) => self.console.print(&format!("invalid peer account: {err}")),
        }
    }

    /// Leave a name prompt without entering a conversation.
    fn return_to_menu(&self, from: SessionState) {
        let mut s = self.shared.lock();
        if s.state == from {
            s.state = SessionState::Authenticated;
        }
    }

    async fn enter_peer_conversation(&self, peer: &str) {
        let key = ConversationKey::Peer(peer.to_owned());
        if !self.open_conversation(&key) {
            return;
        }

        loop {
            let Some(line) = self.read_line("").await else {
                self.persist_and_leave(SessionState::PeerConversation);
                return;
            };
            if self.shared.lock().state != SessionState::PeerConversation {
                // Forced logout ended the conversation; the pump already
                // cleaned up. The typed line is discarded.
                break;
            }
            if line == CMD_LEAVE {
                self.persist_and_leave(SessionState::PeerConversation);
                break;
            }
            if line.is_empty() {
                continue;
            }
            self.send_peer_message(&line, peer).await;
        }
    }

    /// Issue a peer send. The delivery result arrives asynchronously:
    /// success appends and echoes the record, failure prints an error.
    async fn send_peer_message(&self, text: &str, peer: &str) {
        let Some(session) = self.shared.lock().user.as_ref().map(|u| u.session) else {
            return;
        };
        if let Err(err) = self.backend.send_peer_message(session, peer, text).await {
            self.console.print(&format!("send failed: {err}"));
        }
    }

    // -- Channel conversations ---------------------------------------------

    async fn handle_channel_conversation(&self) {
        self.console
            .print("Enter the channel name to join, or 'leave' to go back.");
        let Some(line) = self.read_line("channel> ").await else {
            return;
        };
        if line == CMD_LEAVE {
            self.return_to_menu(SessionState::ChannelConversation);
            return;
        }
        let current = self.current_account();
        match validate_ident(&line, current.as_deref()) {
            Ok(()) => self.enter_channel_conversation(&line).await,
            Err(err) => self.console.print(&format!("invalid channel name: {err}")),
        }
    }

    async fn enter_channel_conversation(&self, name: &str) {
        self.join_channel(name).await;

        let joined = {
            let s = self.shared.lock();
            s.state == SessionState::ChannelConversation
                && s.user.as_ref().is_some_and(|u| u.channel.is_some())
        };
        if !joined {
            self.console.print(&format!("could not join channel {name}"));
            return;
        }

        let key = ConversationKey::Channel(name.to_owned());
        if !self.open_conversation(&key) {
            return;
        }

        loop {
            let Some(line) = self.read_line("").await else {
                self.leave_channel_and_persist().await;
                return;
            };
            if self.shared.lock().state != SessionState::ChannelConversation {
                // Forced leave or forced logout; the pump already cleaned up.
                break;
            }
            if line == CMD_LEAVE {
                self.leave_channel_and_persist().await;
                break;
            }
            if line.is_empty() {
                continue;
            }
            self.send_channel_message(&line).await;
        }
    }

    /// Issue a channel join and wait for the outcome. The pump stores the
    /// channel handle on the user when the join is confirmed in time.
    async fn join_channel(&self, name: &str) {
        let Some(session) = self.shared.lock().user.as_ref().map(|u| u.session) else {
            return;
        };
        let gate = WaitGate::new();
        self.shared.lock().pending = Some(PendingOp {
            kind: PendingKind::ChannelJoin {
                name: name.to_owned(),
                session,
            },
            gate: gate.clone(),
        });

        if let Err(err) = self.backend.join_channel(session, name).await {
            self.shared.lock().pending = None;
            self.console.print(&format!("join failed: {err}"));
            return;
        }

        if !gate.wait(self.config.op_timeout).await {
            self.rollback_after_timeout("channel join").await;
        }
    }

    /// Fire-and-forget channel send; channel messages carry no delivery
    /// confirmation and are not recorded locally.
    async fn send_channel_message(&self, text: &str) {
        let handles = {
            let s = self.shared.lock();
            s.user
                .as_ref()
                .and_then(|u| u.channel.map(|c| (u.session, c)))
        };
        let Some((session, channel)) = handles else {
            return;
        };
        if let Err(err) = self
            .backend
            .send_channel_message(session, channel, text)
            .await
        {
            self.console.print(&format!("send failed: {err}"));
        }
    }

    /// User-initiated channel leave: persist the buffer and drop back to
    /// the menu first, then tell the backend. Dropping the channel handle
    /// before the request goes out lets the pump tell the eventual
    /// `ChannelLeft` acknowledgment apart from a forced leave.
    async fn leave_channel_and_persist(&self) {
        let handles = {
            let mut s = self.shared.lock();
            if let Some(active) = s.active.take() {
                s.store.put(active.key, active.records);
            }
            let handles = s
                .user
                .as_ref()
                .and_then(|u| u.channel.map(|c| (u.session, c)));
            if let Some(user) = &mut s.user {
                user.channel = None;
            }
            if s.state == SessionState::ChannelConversation {
                s.state = SessionState::Authenticated;
            }
            handles
        };
        if let Some((session, channel)) = handles {
            if let Err(err) = self.backend.leave_channel(session, channel).await {
                tracing::debug!(error = %err, "channel leave request failed");
            }
        }
    }

    // -- Shared conversation plumbing --------------------------------------

    /// Load the history for `key` into the active buffer and print it.
    /// Returns false if the state changed under us before entry.
    fn open_conversation(&self, key: &ConversationKey) -> bool {
        let expected = match key {
            ConversationKey::Peer(_) => SessionState::PeerConversation,
            ConversationKey::Channel(_) => SessionState::ChannelConversation,
        };
        let lines = {
            let mut s = self.shared.lock();
            if s.state != expected {
                return false;
            }
            let records = s.store.load(key);
            let mut lines: Vec<String> = Vec::with_capacity(records.len() + 2);
            lines.push(format!("-- {key}: {} message(s) of history --", records.len()));
            lines.extend(records.iter().map(MessageRecord::display_line));
            lines.push(format!("Type a message to send, or '{CMD_LEAVE}' to go back."));
            s.active = Some(ActiveConversation {
                key: key.clone(),
                records,
            });
            lines
        };
        for line in lines {
            self.console.print(&line);
        }
        true
    }

    /// Persist the active buffer back into the store and return to the menu.
    fn persist_and_leave(&self, from: SessionState) {
        let mut s = self.shared.lock();
        if let Some(active) = s.active.take() {
            s.store.put(active.key, active.records);
        }
        if s.state == from {
            s.state = SessionState::Authenticated;
        }
    }

    // -- Timeout rollback ---------------------------------------------------

    /// The fail-safe for an operation that outlived its deadline: drop to
    /// Unauthenticated, wipe session-scoped state, and log out any live
    /// backend session so nothing is orphaned. A late outcome for the
    /// operation finds its gate latched and gets cleanup treatment in the
    /// event pump.
    async fn rollback_after_timeout(&self, op: &str) {
        tracing::warn!(op, "operation timed out");
        self.console
            .print(&format!("{op} timed out; you have been logged out"));
        let orphan = {
            let mut s = self.shared.lock();
            s.state = SessionState::Unauthenticated;
            s.active = None;
            s.store.clear();
            s.user.take()
        };
        if let Some(user) = orphan {
            if let Err(err) = self.backend.logout(user.session).await {
                tracing::debug!(error = %err, "rollback logout failed");
            }
        }
    }
}

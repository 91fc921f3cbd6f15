//! In-process signaling hub.
//!
//! [`LocalSignalHub`] routes peer messages and channel traffic between
//! clients attached within one process, standing in for a remote signaling
//! service. The demo binary attaches a single client to it; integration
//! tests attach several and drive full conversations, including
//! backend-initiated disconnects via [`force_logout`](LocalSignalHub::force_logout)
//! and [`force_leave`](LocalSignalHub::force_leave).
//!
//! Events are delivered with `try_send`: a client that has detached or
//! stopped draining its receiver loses events rather than blocking the hub.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::backend::{SignalBackend, SignalError};
use crate::event::{ChannelId, SessionId, SignalEvent, codes};

/// One queued delivery: the target client's sender and the event for it.
type Outbox = Vec<(mpsc::Sender<SignalEvent>, SignalEvent)>;

/// A live session known to the hub.
struct HubSession {
    account: String,
    uid: u32,
    events: mpsc::Sender<SignalEvent>,
}

/// A channel and its current membership.
struct HubChannel {
    name: String,
    members: Vec<SessionId>,
}

/// Hub registries, guarded by one lock.
#[derive(Default)]
struct HubState {
    next_uid: u32,
    sessions: HashMap<SessionId, HubSession>,
    accounts: HashMap<String, SessionId>,
    channels: HashMap<ChannelId, HubChannel>,
    channel_ids: HashMap<String, ChannelId>,
}

impl HubState {
    /// Remove a session entirely: account registry, channel memberships
    /// (notifying remaining members), and finally the session itself.
    /// Returns the deliveries to make, or `None` if the session is unknown.
    fn remove_session(&mut self, session: SessionId, code: i32) -> Option<Outbox> {
        let sess = self.sessions.remove(&session)?;
        self.accounts.remove(&sess.account);

        let mut vacated: Vec<(String, Vec<SessionId>)> = Vec::new();
        for chan in self.channels.values_mut() {
            if let Some(pos) = chan.members.iter().position(|m| *m == session) {
                chan.members.remove(pos);
                vacated.push((chan.name.clone(), chan.members.clone()));
            }
        }

        let mut outbox: Outbox = Vec::new();
        for (name, members) in vacated {
            for member in members {
                if let Some(s) = self.sessions.get(&member) {
                    outbox.push((
                        s.events.clone(),
                        SignalEvent::ChannelUserLeft {
                            name: name.clone(),
                            account: sess.account.clone(),
                        },
                    ));
                }
            }
        }
        outbox.push((sess.events, SignalEvent::LoggedOut { session, code }));
        Some(outbox)
    }
}

/// Queue an event toward one client, dropping it if the client is gone
/// or has stopped draining its receiver.
fn deliver(tx: &mpsc::Sender<SignalEvent>, event: SignalEvent) {
    if let Err(err) = tx.try_send(event) {
        tracing::warn!(error = %err, "dropping signal event for slow or detached client");
    }
}

fn flush(outbox: Outbox) {
    for (tx, event) in outbox {
        deliver(&tx, event);
    }
}

/// In-process signaling backend shared by every attached [`HubClient`].
pub struct LocalSignalHub {
    state: Arc<Mutex<HubState>>,
}

impl LocalSignalHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
        }
    }

    /// Attach a client. Returns the request handle and the receiver on
    /// which every event for this client's sessions will arrive.
    #[must_use]
    pub fn attach(&self, event_buffer: usize) -> (HubClient, mpsc::Receiver<SignalEvent>) {
        let (tx, rx) = mpsc::channel(event_buffer);
        (
            HubClient {
                state: Arc::clone(&self.state),
                events: tx,
            },
            rx,
        )
    }

    /// Terminate an account's session from the backend side.
    ///
    /// The victim receives `LoggedOut` with [`codes::LOGOUT_KICKED`];
    /// channels it was in are notified. Returns false if the account has
    /// no live session.
    pub fn force_logout(&self, account: &str) -> bool {
        let outbox = {
            let mut st = self.state.lock();
            let Some(session) = st.accounts.get(account).copied() else {
                return false;
            };
            st.remove_session(session, codes::LOGOUT_KICKED)
        };
        match outbox {
            Some(out) => {
                tracing::info!(account, "hub forced logout");
                flush(out);
                true
            }
            None => false,
        }
    }

    /// Remove an account from a channel from the backend side.
    ///
    /// The victim receives `ChannelLeft` with [`codes::LEAVE_KICKED`];
    /// remaining members receive `ChannelUserLeft`. Returns false if the
    /// account is not a member.
    pub fn force_leave(&self, account: &str, channel: &str) -> bool {
        let outbox = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let Some(session) = st.accounts.get(account).copied() else {
                return false;
            };
            let Some(id) = st.channel_ids.get(channel).copied() else {
                return false;
            };
            let Some(chan) = st.channels.get_mut(&id) else {
                return false;
            };
            let Some(pos) = chan.members.iter().position(|m| *m == session) else {
                return false;
            };
            chan.members.remove(pos);

            let mut outbox: Outbox = Vec::new();
            for member in &chan.members {
                if let Some(s) = st.sessions.get(member) {
                    outbox.push((
                        s.events.clone(),
                        SignalEvent::ChannelUserLeft {
                            name: chan.name.clone(),
                            account: account.to_owned(),
                        },
                    ));
                }
            }
            if let Some(s) = st.sessions.get(&session) {
                outbox.push((
                    s.events.clone(),
                    SignalEvent::ChannelLeft {
                        channel: id,
                        name: chan.name.clone(),
                        code: codes::LEAVE_KICKED,
                    },
                ));
            }
            outbox
        };
        tracing::info!(account, channel, "hub forced channel leave");
        flush(outbox);
        true
    }

    /// Whether an account currently has a live session (test helper).
    #[must_use]
    pub fn is_logged_in(&self, account: &str) -> bool {
        self.state.lock().accounts.contains_key(account)
    }

    /// Accounts currently in the named channel (test helper).
    #[must_use]
    pub fn channel_members(&self, channel: &str) -> Vec<String> {
        let st = self.state.lock();
        let Some(id) = st.channel_ids.get(channel) else {
            return Vec::new();
        };
        let Some(chan) = st.channels.get(id) else {
            return Vec::new();
        };
        chan.members
            .iter()
            .filter_map(|m| st.sessions.get(m).map(|s| s.account.clone()))
            .collect()
    }
}

impl Default for LocalSignalHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A client's handle onto a [`LocalSignalHub`].
///
/// Cheap to clone; all clones feed events into the receiver returned by
/// [`LocalSignalHub::attach`].
#[derive(Clone)]
pub struct HubClient {
    state: Arc<Mutex<HubState>>,
    events: mpsc::Sender<SignalEvent>,
}

impl SignalBackend for HubClient {
    async fn login(&self, account: &str, token: &str) -> Result<(), SignalError> {
        // The hub performs no token authentication.
        let _ = token;
        let event = {
            let mut st = self.state.lock();
            if st.accounts.contains_key(account) {
                return Err(SignalError::AccountInUse(account.to_owned()));
            }
            let session = SessionId::new();
            let uid = st.next_uid;
            st.next_uid += 1;
            st.sessions.insert(
                session,
                HubSession {
                    account: account.to_owned(),
                    uid,
                    events: self.events.clone(),
                },
            );
            st.accounts.insert(account.to_owned(), session);
            tracing::info!(%session, account, uid, "hub login");
            SignalEvent::LoginSucceeded {
                account: account.to_owned(),
                session,
                uid,
            }
        };
        deliver(&self.events, event);
        Ok(())
    }

    async fn logout(&self, session: SessionId) -> Result<(), SignalError> {
        let outbox = self
            .state
            .lock()
            .remove_session(session, codes::LOGOUT_USER_REQUEST)
            .ok_or(SignalError::UnknownSession(session))?;
        tracing::info!(%session, "hub logout");
        flush(outbox);
        Ok(())
    }

    async fn send_peer_message(
        &self,
        session: SessionId,
        peer: &str,
        text: &str,
    ) -> Result<(), SignalError> {
        let outbox = {
            let st = self.state.lock();
            let sender = st
                .sessions
                .get(&session)
                .ok_or(SignalError::UnknownSession(session))?;
            let target = st.accounts.get(peer).and_then(|sid| st.sessions.get(sid));
            match target {
                Some(t) => vec![
                    (
                        t.events.clone(),
                        SignalEvent::PeerMessage {
                            from: sender.account.clone(),
                            uid: sender.uid,
                            text: text.to_owned(),
                        },
                    ),
                    (
                        sender.events.clone(),
                        SignalEvent::PeerSendSucceeded {
                            peer: peer.to_owned(),
                            text: text.to_owned(),
                        },
                    ),
                ],
                None => vec![(
                    sender.events.clone(),
                    SignalEvent::PeerSendFailed {
                        peer: peer.to_owned(),
                        code: codes::PEER_OFFLINE,
                    },
                )],
            }
        };
        flush(outbox);
        Ok(())
    }

    async fn join_channel(&self, session: SessionId, name: &str) -> Result<(), SignalError> {
        let outbox = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let account = st
                .sessions
                .get(&session)
                .map(|s| s.account.clone())
                .ok_or(SignalError::UnknownSession(session))?;

            let id = match st.channel_ids.get(name) {
                Some(id) => *id,
                None => {
                    let id = ChannelId::new();
                    st.channel_ids.insert(name.to_owned(), id);
                    st.channels.insert(
                        id,
                        HubChannel {
                            name: name.to_owned(),
                            members: Vec::new(),
                        },
                    );
                    id
                }
            };
            let Some(chan) = st.channels.get_mut(&id) else {
                return Err(SignalError::NotInChannel);
            };
            if !chan.members.contains(&session) {
                chan.members.push(session);
            }

            let mut outbox: Outbox = Vec::new();
            let mut roster: Vec<String> = Vec::new();
            for member in &chan.members {
                let Some(s) = st.sessions.get(member) else {
                    continue;
                };
                roster.push(s.account.clone());
                if *member != session {
                    outbox.push((
                        s.events.clone(),
                        SignalEvent::ChannelUserJoined {
                            name: name.to_owned(),
                            account: account.clone(),
                        },
                    ));
                }
            }
            outbox.push((
                self.events.clone(),
                SignalEvent::ChannelJoined {
                    channel: id,
                    name: name.to_owned(),
                },
            ));
            outbox.push((
                self.events.clone(),
                SignalEvent::ChannelUserList {
                    name: name.to_owned(),
                    members: roster,
                },
            ));
            tracing::info!(%session, channel = name, "hub channel join");
            outbox
        };
        flush(outbox);
        Ok(())
    }

    async fn leave_channel(&self, session: SessionId, channel: ChannelId) -> Result<(), SignalError> {
        let outbox = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let account = st
                .sessions
                .get(&session)
                .map(|s| s.account.clone())
                .ok_or(SignalError::UnknownSession(session))?;
            let chan = st
                .channels
                .get_mut(&channel)
                .ok_or(SignalError::NotInChannel)?;
            let pos = chan
                .members
                .iter()
                .position(|m| *m == session)
                .ok_or(SignalError::NotInChannel)?;
            chan.members.remove(pos);

            let mut outbox: Outbox = Vec::new();
            for member in &chan.members {
                if let Some(s) = st.sessions.get(member) {
                    outbox.push((
                        s.events.clone(),
                        SignalEvent::ChannelUserLeft {
                            name: chan.name.clone(),
                            account: account.clone(),
                        },
                    ));
                }
            }
            outbox.push((
                self.events.clone(),
                SignalEvent::ChannelLeft {
                    channel,
                    name: chan.name.clone(),
                    code: codes::LEAVE_USER_REQUEST,
                },
            ));
            tracing::info!(%session, channel = %chan.name, "hub channel leave");
            outbox
        };
        flush(outbox);
        Ok(())
    }

    async fn send_channel_message(
        &self,
        session: SessionId,
        channel: ChannelId,
        text: &str,
    ) -> Result<(), SignalError> {
        let outbox = {
            let st = self.state.lock();
            let sender = st
                .sessions
                .get(&session)
                .ok_or(SignalError::UnknownSession(session))?;
            let chan = st.channels.get(&channel).ok_or(SignalError::NotInChannel)?;
            if !chan.members.contains(&session) {
                return Err(SignalError::NotInChannel);
            }

            // Broadcast to the other members only; senders never receive
            // their own channel messages back.
            let mut outbox: Outbox = Vec::new();
            for member in &chan.members {
                if *member == session {
                    continue;
                }
                if let Some(s) = st.sessions.get(member) {
                    outbox.push((
                        s.events.clone(),
                        SignalEvent::ChannelMessage {
                            name: chan.name.clone(),
                            from: sender.account.clone(),
                            uid: sender.uid,
                            text: text.to_owned(),
                        },
                    ));
                }
            }
            outbox
        };
        flush(outbox);
        Ok(())
    }
}

//! The backend delivery side: applying [`SignalEvent`]s to session state.
//!
//! Each event is applied under the shared session lock by [`apply_event`],
//! which returns the console lines to print and any corrective backend
//! calls a stale outcome requires; both are performed after the lock is
//! released, so the lock is never held across an await or an I/O call.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use sigchat_signal::{ChannelId, SessionId, SignalBackend, SignalEvent};

use super::{ActiveUser, PendingKind, PendingOp, SessionState, Shared};
use crate::console::Console;
use crate::history::{ConversationKey, MessageRecord};

/// A corrective backend call required by a stale or unexpected outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Followup {
    /// Log out a session that materialized after its login wait gave up.
    CorrectiveLogout(SessionId),
    /// Leave a channel that was joined after its join wait gave up.
    CompensatingLeave {
        session: SessionId,
        channel: ChannelId,
    },
}

/// Everything applying one event produced.
#[derive(Debug, Default)]
pub(crate) struct Applied {
    pub(crate) lines: Vec<String>,
    pub(crate) followups: Vec<Followup>,
}

/// Spawn the task that drains backend events until the stream ends.
pub(crate) fn spawn_event_pump<B: SignalBackend, C: Console>(
    shared: Arc<Mutex<Shared>>,
    backend: B,
    console: Arc<C>,
    mut events: mpsc::Receiver<SignalEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let applied = apply_event(&shared, event);
            for line in &applied.lines {
                console.print(line);
            }
            for followup in applied.followups {
                match followup {
                    Followup::CorrectiveLogout(session) => {
                        tracing::warn!(
                            %session,
                            "login confirmed after timeout; issuing corrective logout"
                        );
                        if let Err(err) = backend.logout(session).await {
                            tracing::debug!(error = %err, "corrective logout failed");
                        }
                    }
                    Followup::CompensatingLeave { session, channel } => {
                        tracing::warn!(
                            %session,
                            %channel,
                            "channel join confirmed after timeout; issuing compensating leave"
                        );
                        if let Err(err) = backend.leave_channel(session, channel).await {
                            tracing::debug!(error = %err, "compensating leave failed");
                        }
                    }
                }
            }
        }
        tracing::debug!("signal event stream ended");
    })
}

/// Drop every piece of session-scoped state; the shape of a logout.
fn clear_session(s: &mut Shared) {
    s.store.clear();
    s.user = None;
    s.active = None;
    s.state = SessionState::Unauthenticated;
}

/// Apply one backend event to the shared state.
///
/// Outcomes for a pending operation are matched against it and checked for
/// staleness through the gate's latched flag; stale outcomes get cleanup
/// follow-ups instead of their normal effect. Conversation traffic is
/// applied only while the matching conversation is on screen.
#[allow(clippy::too_many_lines)]
pub(crate) fn apply_event(shared: &Mutex<Shared>, event: SignalEvent) -> Applied {
    let mut out = Applied::default();
    let mut s = shared.lock();

    match event {
        SignalEvent::LoginSucceeded {
            account,
            session,
            uid,
        } => match s.pending.take() {
            Some(PendingOp {
                kind: PendingKind::Login { account: pending },
                gate,
            }) if pending == account => {
                if gate.timed_out() {
                    out.followups.push(Followup::CorrectiveLogout(session));
                } else {
                    s.user = Some(ActiveUser {
                        account: account.clone(),
                        uid,
                        session,
                        channel: None,
                    });
                    s.state = SessionState::Authenticated;
                    out.lines.push(format!("logged in as {account} (uid {uid})"));
                    gate.signal();
                }
            }
            other => {
                // A success nobody is waiting for would orphan a live
                // backend session; log it out.
                s.pending = other;
                tracing::warn!(%account, %session, "unmatched login success");
                out.followups.push(Followup::CorrectiveLogout(session));
            }
        },

        SignalEvent::LoggedOut { session, code } => {
            let is_current = s.user.as_ref().is_some_and(|u| u.session == session);
            let pending_logout = matches!(
                s.pending.as_ref().map(|p| &p.kind),
                Some(PendingKind::Logout)
            );
            if pending_logout {
                if let Some(p) = s.pending.take() {
                    if p.gate.timed_out() {
                        tracing::debug!(%session, "logout confirmed after timeout");
                    } else {
                        out.lines.push("logged out".to_string());
                        p.gate.signal();
                    }
                }
                clear_session(&mut s);
            } else if is_current {
                clear_session(&mut s);
                out.lines
                    .push(format!("logged out by the backend (code {code})"));
            } else {
                tracing::debug!(%session, code, "stale logout notification ignored");
            }
        }

        SignalEvent::PeerMessage { from, uid: _, text } => {
            let in_conversation = s.state == SessionState::PeerConversation
                && s.active
                    .as_ref()
                    .is_some_and(|a| a.key == ConversationKey::Peer(from.clone()));
            if in_conversation {
                let record = MessageRecord::new(from, text);
                out.lines.push(record.display_line());
                if let Some(active) = &mut s.active {
                    active.records.push(record);
                }
            } else {
                tracing::debug!(%from, "peer message outside its conversation dropped");
            }
        }

        SignalEvent::PeerSendSucceeded { peer, text } => {
            let me = s.user.as_ref().map(|u| u.account.clone());
            let in_conversation = s.state == SessionState::PeerConversation
                && s.active
                    .as_ref()
                    .is_some_and(|a| a.key == ConversationKey::Peer(peer.clone()));
            match me {
                Some(me) if in_conversation => {
                    let record = MessageRecord::new(me, text);
                    out.lines.push(record.display_line());
                    if let Some(active) = &mut s.active {
                        active.records.push(record);
                    }
                }
                _ => tracing::debug!(%peer, "send confirmation after leaving dropped"),
            }
        }

        SignalEvent::PeerSendFailed { peer, code } => {
            out.lines
                .push(format!("message to {peer} failed (code {code})"));
        }

        SignalEvent::ChannelJoined { channel, name } => match s.pending.take() {
            Some(PendingOp {
                kind:
                    PendingKind::ChannelJoin {
                        name: pending,
                        session,
                    },
                gate,
            }) if pending == name => {
                if gate.timed_out() {
                    out.followups
                        .push(Followup::CompensatingLeave { session, channel });
                } else {
                    if let Some(user) = &mut s.user {
                        user.channel = Some(channel);
                    }
                    out.lines.push(format!("joined channel {name}"));
                    gate.signal();
                }
            }
            other => {
                s.pending = other;
                tracing::warn!(%name, "unmatched channel join confirmation ignored");
            }
        },

        SignalEvent::ChannelUserList { name, members } => {
            if s.state == SessionState::ChannelConversation {
                out.lines
                    .push(format!("channel {name} members: {}", members.join(", ")));
            }
        }

        SignalEvent::ChannelMessage {
            name,
            from,
            uid: _,
            text,
        } => {
            let in_channel = s.state == SessionState::ChannelConversation
                && s.active
                    .as_ref()
                    .is_some_and(|a| a.key == ConversationKey::Channel(name.clone()));
            if in_channel {
                let record = MessageRecord::new(from, text);
                out.lines.push(record.display_line());
                if let Some(active) = &mut s.active {
                    active.records.push(record);
                }
            } else {
                tracing::debug!(%name, %from, "channel message outside its conversation dropped");
            }
        }

        SignalEvent::ChannelUserJoined { name, account } => {
            if s.state == SessionState::ChannelConversation {
                out.lines.push(format!("... {account} joined {name} ..."));
            }
        }

        SignalEvent::ChannelUserLeft { name, account } => {
            if s.state == SessionState::ChannelConversation {
                out.lines.push(format!("... {account} left {name} ..."));
            }
        }

        SignalEvent::ChannelLeft {
            channel,
            name,
            code,
        } => {
            let is_current = s
                .user
                .as_ref()
                .is_some_and(|u| u.channel == Some(channel));
            if s.state == SessionState::ChannelConversation && is_current {
                // Backend-initiated: the interactive side never asked to
                // leave. Persist what was exchanged and drop to the menu.
                if let Some(active) = s.active.take() {
                    s.store.put(active.key, active.records);
                }
                if let Some(user) = &mut s.user {
                    user.channel = None;
                }
                s.state = SessionState::Authenticated;
                out.lines.push(format!(
                    "removed from channel {name} (code {code}); press enter to continue"
                ));
            } else {
                // The acknowledgment of our own leave request.
                tracing::debug!(%name, code, "channel leave acknowledged");
            }
        }
    }

    out
}

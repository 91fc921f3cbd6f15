//! The request side of the signaling backend contract.
//!
//! [`SignalBackend`] methods issue requests; they return as soon as the
//! request has been handed to the backend. Outcomes arrive later as
//! [`SignalEvent`](crate::event::SignalEvent)s on the channel obtained when
//! attaching to the backend, possibly after the caller has stopped waiting.

use crate::event::{ChannelId, SessionId};

/// Errors raised while issuing a request to the backend.
///
/// These cover failures detectable at request time. Failures that surface
/// asynchronously (a peer being offline, a forced disconnect) arrive as
/// events instead.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The account already has a live session on this backend.
    #[error("account {0} is already logged in")]
    AccountInUse(String),

    /// The request referenced a session the backend does not know.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The request requires a logged-in session.
    #[error("not logged in")]
    NotLoggedIn,

    /// The request referenced a channel the session is not a member of.
    #[error("not a member of the channel")]
    NotInChannel,

    /// The backend connection is gone.
    #[error("backend connection lost")]
    Disconnected,
}

/// Asynchronous signaling backend: login/logout, peer messaging, and
/// channel membership and messaging.
///
/// Implementations are cheap to clone (a handle); the client hands a clone
/// to its event pump so late outcomes can trigger corrective requests.
///
/// # Contract
///
/// `Ok(())` means the request was issued, not that it succeeded. A request
/// with no eventual matching event is indistinguishable from a lost one;
/// callers bound their waits and roll back on timeout.
pub trait SignalBackend: Clone + Send + Sync + 'static {
    /// Request a login for `account`. Outcome: `LoginSucceeded`, or nothing.
    fn login(
        &self,
        account: &str,
        token: &str,
    ) -> impl std::future::Future<Output = Result<(), SignalError>> + Send;

    /// Request termination of `session`. Outcome: `LoggedOut`.
    fn logout(
        &self,
        session: SessionId,
    ) -> impl std::future::Future<Output = Result<(), SignalError>> + Send;

    /// Send a peer-to-peer message. Outcome: `PeerSendSucceeded` or
    /// `PeerSendFailed`.
    fn send_peer_message(
        &self,
        session: SessionId,
        peer: &str,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), SignalError>> + Send;

    /// Request membership in the named channel, creating it if needed.
    /// Outcome: `ChannelJoined` plus a `ChannelUserList` snapshot.
    fn join_channel(
        &self,
        session: SessionId,
        name: &str,
    ) -> impl std::future::Future<Output = Result<(), SignalError>> + Send;

    /// Give up membership in a joined channel. Outcome: `ChannelLeft`.
    fn leave_channel(
        &self,
        session: SessionId,
        channel: ChannelId,
    ) -> impl std::future::Future<Output = Result<(), SignalError>> + Send;

    /// Send a message to a joined channel. Fire-and-forget: no delivery
    /// confirmation exists for channel messages.
    fn send_channel_message(
        &self,
        session: SessionId,
        channel: ChannelId,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), SignalError>> + Send;
}

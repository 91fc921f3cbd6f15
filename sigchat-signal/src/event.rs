//! Typed signal notifications and the handle types they carry.
//!
//! Instead of one callback object per request, every asynchronous outcome
//! is a single [`SignalEvent`] delivered on an mpsc channel: one typed
//! message the client's event pump consumes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle for a logged-in backend session, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new time-ordered session handle (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for a joined channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(Uuid);

impl ChannelId {
    /// Creates a new channel handle (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Reason codes carried by disconnect notifications.
pub mod codes {
    /// The session ended because the user asked to log out.
    pub const LOGOUT_USER_REQUEST: i32 = 0;
    /// The session was terminated by the backend.
    pub const LOGOUT_KICKED: i32 = 1;
    /// The channel membership ended because the user left.
    pub const LEAVE_USER_REQUEST: i32 = 0;
    /// The membership was terminated by the backend.
    pub const LEAVE_KICKED: i32 = 1;
    /// A peer message could not be delivered because the peer is offline.
    pub const PEER_OFFLINE: i32 = 100;
}

/// An asynchronous notification from the signaling backend.
///
/// Events referring to a request in flight (`LoginSucceeded`,
/// `ChannelJoined`, `LoggedOut` after a logout request, the peer send
/// results) may arrive at any time after the request was issued, including
/// after the client has given up waiting; consumers must treat them
/// defensively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    /// A login request completed; a backend session now exists.
    LoginSucceeded {
        /// The account that logged in.
        account: String,
        /// Handle for the new session.
        session: SessionId,
        /// Backend-assigned numeric user id.
        uid: u32,
    },
    /// A session ended, whether by request or by the backend.
    LoggedOut {
        /// The session that ended.
        session: SessionId,
        /// Reason code (see [`codes`]).
        code: i32,
    },
    /// A peer-to-peer message arrived.
    PeerMessage {
        /// Sending account.
        from: String,
        /// Sender's numeric user id.
        uid: u32,
        /// Message text.
        text: String,
    },
    /// A peer send was delivered. Carries the text so the client can echo
    /// and record it without tracking the request itself.
    PeerSendSucceeded {
        /// The peer the message was sent to.
        peer: String,
        /// The text that was delivered.
        text: String,
    },
    /// A peer send failed.
    PeerSendFailed {
        /// The peer the message was addressed to.
        peer: String,
        /// Reason code (see [`codes`]).
        code: i32,
    },
    /// A channel join completed; a channel handle now exists.
    ChannelJoined {
        /// Handle for the joined channel.
        channel: ChannelId,
        /// The channel's name.
        name: String,
    },
    /// Membership snapshot delivered to a joiner.
    ChannelUserList {
        /// The channel's name.
        name: String,
        /// Accounts currently in the channel, including the joiner.
        members: Vec<String>,
    },
    /// A message arrived in a channel.
    ChannelMessage {
        /// The channel's name.
        name: String,
        /// Sending account.
        from: String,
        /// Sender's numeric user id.
        uid: u32,
        /// Message text.
        text: String,
    },
    /// Another account joined a channel we are in.
    ChannelUserJoined {
        /// The channel's name.
        name: String,
        /// The account that joined.
        account: String,
    },
    /// Another account left a channel we are in.
    ChannelUserLeft {
        /// The channel's name.
        name: String,
        /// The account that left.
        account: String,
    },
    /// Our own channel membership ended, whether by request or by the backend.
    ChannelLeft {
        /// The channel whose membership ended.
        channel: ChannelId,
        /// The channel's name.
        name: String,
        /// Reason code (see [`codes`]).
        code: i32,
    },
}

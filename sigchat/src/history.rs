//! Per-conversation message history, in memory for the process lifetime.
//!
//! Each conversation — a peer account or a channel name — maps to an
//! ordered list of [`MessageRecord`]s (insertion order is chronological
//! order). Entries are created lazily the first time a conversation is
//! entered and are never deleted individually; the whole store is wiped on
//! logout. Durable persistence is a future collaborator: the types carry
//! serde derives but no load/save implementation ships.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use sigchat_signal::Timestamp;

/// One exchanged message. Immutable once created; appended to exactly one
/// conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Account that authored the message.
    pub sender: String,
    /// Message text.
    pub text: String,
    /// When the record was created on this client.
    pub timestamp: Timestamp,
}

impl MessageRecord {
    /// Create a record stamped with the current instant.
    #[must_use]
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            timestamp: Timestamp::now(),
        }
    }

    /// Render the record as a transcript line: `HH:MM sender: text`.
    #[must_use]
    pub fn display_line(&self) -> String {
        format!(
            "{} {}: {}",
            format_timestamp(self.timestamp),
            self.sender,
            self.text
        )
    }
}

/// Format a timestamp as local "HH:MM".
fn format_timestamp(ts: Timestamp) -> String {
    use chrono::{Local, TimeZone};
    let secs = i64::try_from(ts.as_millis() / 1000).unwrap_or(0);
    match Local.timestamp_opt(secs, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M").to_string(),
        _ => "??:??".to_string(),
    }
}

/// Addresses one conversation: a peer account or a channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationKey {
    /// A peer-to-peer conversation with the named account.
    Peer(String),
    /// A group conversation in the named channel.
    Channel(String),
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Peer(account) => write!(f, "@{account}"),
            Self::Channel(name) => write!(f, "#{name}"),
        }
    }
}

/// All conversation histories, keyed by conversation.
#[derive(Debug, Default)]
pub struct ConversationStore {
    entries: HashMap<ConversationKey, Vec<MessageRecord>>,
}

impl ConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The records for `key`, or an empty slice for an unknown key.
    #[must_use]
    pub fn get(&self, key: &ConversationKey) -> &[MessageRecord] {
        self.entries.get(key).map_or(&[], Vec::as_slice)
    }

    /// Clone out the records for `key`; a first-time conversation starts
    /// from an empty list.
    #[must_use]
    pub fn load(&self, key: &ConversationKey) -> Vec<MessageRecord> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Store the records for `key`, replacing any prior list.
    pub fn put(&mut self, key: ConversationKey, records: Vec<MessageRecord>) {
        self.entries.insert(key, records);
    }

    /// Wipe every peer and channel history. Invoked only on logout.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of conversations with a stored history.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no conversation has a stored history.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Signaling backend contract for `SigChat`.
//!
//! The signaling backend provides identity, presence, and messaging
//! primitives whose results arrive asynchronously. This crate defines the
//! typed form of that contract: the [`SignalBackend`] request trait, the
//! [`SignalEvent`] notifications a backend delivers over an mpsc channel,
//! and [`hub::LocalSignalHub`], an in-process backend that routes traffic
//! between clients attached within one process (used by the demo binary
//! and by integration tests).

pub mod backend;
pub mod event;
pub mod hub;

pub use backend::{SignalBackend, SignalError};
pub use event::{ChannelId, SessionId, SignalEvent, Timestamp, codes};

//! `SigChat` — terminal chat client over an asynchronous signaling backend.

pub mod config;
pub mod console;
pub mod gate;
pub mod history;
pub mod ident;
pub mod session;

//! A client of the KERI chat API.
//!
//! [`ChatClient`] streams answers from the server, [`SessionStore`] keeps
//! per-session conversation history on top of it, and [`AskLog`] records
//! answered questions. The crate also ships an interactive CLI.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod client;
mod log;
mod session;

pub use client::{ChatClient, ClientError, DEFAULT_TIMEOUT, DEFAULT_URL};
pub use log::{AskLog, LogEntry};
pub use session::{Ask, SessionStore, format_answer};

/// Re-exports of [`keri_chat_core`] crate.
pub mod core {
    pub use keri_chat_core::*;
}

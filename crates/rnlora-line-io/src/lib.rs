//! Line-oriented IO engine for the RN2483/RN2903 command protocol.
//!
//! The module speaks one ASCII request line and gets one ASCII reply line
//! back, both terminated by CR LF. This crate turns the arbitrarily
//! fragmented byte stream from a [`Transport`](rnlora_core::Transport) into
//! those reply lines and hands each one to exactly one waiting command.
//!
//! # Architecture
//!
//! - [`framer`] -- incremental CR-LF framing of raw chunks into lines
//! - [`mailbox`] -- single-slot rendezvous between the receive task and a
//!   waiting command, with backpressure and a forced release for teardown
//! - [`channel`] -- the receive task, and the command channel that keeps
//!   one command in flight at a time

pub mod channel;
pub mod framer;
pub mod mailbox;

pub use channel::{ChannelConfig, CommandChannel, LineIo, spawn_line_io};
pub use framer::{FeedResult, LineFramer};
pub use mailbox::Mailbox;

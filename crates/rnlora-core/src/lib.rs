//! rnlora-core: Core traits, types, and error definitions for rnlora.
//!
//! This crate defines the hardware-agnostic boundaries the RN2483/RN2903
//! driver is built on. The line IO engine and the device controller depend
//! only on these types, so they can be exercised against in-memory fakes
//! as easily as against a real serial port.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level duplex channel to the module
//! - [`ResetLine`] -- the single binary output wired to the module's reset pin
//! - [`Eui64`] -- the 64-bit hardware identifier burned into the module
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod eui;
pub mod reset;
pub mod transport;

// Re-export key types at crate root for ergonomic `use rnlora_core::*`.
pub use error::{Error, Result};
pub use eui::Eui64;
pub use reset::{NoResetLine, ResetLine};
pub use transport::Transport;

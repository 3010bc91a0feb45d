//! rnlora-test-harness: Test utilities and mock collaborators for rnlora.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! line IO engine and device controller without a real radio module, and
//! [`MockResetLine`] which records every level change with a timestamp.

pub mod mock_reset;
pub mod mock_serial;

pub use mock_reset::MockResetLine;
pub use mock_serial::MockTransport;

//! Transport trait for module communication.
//!
//! The [`Transport`] trait abstracts over the physical link to the radio
//! module. The production implementation is a serial port
//! (`rnlora-transport`); tests use `MockTransport` from
//! `rnlora-test-harness`.
//!
//! The line IO engine never assumes anything about chunk sizes: a single
//! reply line may arrive in one `receive()` call or be spread over many,
//! and one call may also carry the tail of one line and the head of the
//! next.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level duplex transport to a module.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the module.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying link.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the module into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

//! Mock transport for deterministic testing of the line IO engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. When the driver sends a request that matches the
//! next expectation, the paired response bytes are queued for reception.
//! Unsolicited bytes (such as the module's boot banner) can be queued
//! directly with [`MockTransport::push_inbound`].
//!
//! Clones share state: keep a clone in the test to inspect what was sent
//! after the first one has been boxed and handed to the driver.
//!
//! # Example
//!
//! ```
//! use rnlora_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! mock.push_inbound(b"RN2483 1.0.3 Nov 23 2016 10:55:12\r\n");
//! mock.expect_line("sys get hweui", "0004A30B001A2B3C");
//! // Deliver replies three bytes at a time to exercise reassembly.
//! mock.set_chunk_size(3);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rnlora_core::error::{Error, Result};
use rnlora_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// The bytes queued for reception when the matching request is sent.
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    /// Ordered queue of expected request/response pairs.
    expectations: VecDeque<Expectation>,
    /// Bytes waiting to be returned by `receive()`.
    inbound: VecDeque<u8>,
    /// Upper bound on bytes returned per `receive()` call.
    chunk_size: Option<usize>,
    /// Whether the transport is "connected".
    connected: bool,
    /// When set, every `send()` fails with this I/O error kind.
    send_failure: Option<std::io::ErrorKind>,
    /// Log of all bytes sent through this transport.
    sent_log: Vec<Vec<u8>>,
}

/// A mock [`Transport`] for testing without hardware.
///
/// Expectations are consumed in order. If a send does not match the next
/// expectation, or the queue is exhausted, `send()` returns a protocol
/// error.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                expectations: VecDeque::new(),
                inbound: VecDeque::new(),
                chunk_size: None,
                connected: true,
                send_failure: None,
                sent_log: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an expected request/response pair (raw bytes).
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Add an expected command line and its reply line.
    ///
    /// Both are given without terminator; CR LF is appended to each.
    pub fn expect_line(&self, command: &str, reply: &str) {
        self.expect(
            format!("{command}\r\n").as_bytes(),
            format!("{reply}\r\n").as_bytes(),
        );
    }

    /// Add an expected command line that the module never answers.
    pub fn expect_silence(&self, command: &str) {
        self.expect(format!("{command}\r\n").as_bytes(), b"");
    }

    /// Queue bytes for reception without any preceding send.
    pub fn push_inbound(&self, data: &[u8]) {
        self.lock().inbound.extend(data.iter().copied());
    }

    /// Limit how many bytes a single `receive()` returns.
    pub fn set_chunk_size(&self, size: usize) {
        self.lock().chunk_size = Some(size.max(1));
    }

    /// Make every subsequent `send()` fail with an I/O error.
    pub fn fail_sends(&self, kind: std::io::ErrorKind) {
        self.lock().send_failure = Some(kind);
    }

    /// Return a copy of all data that has been sent through this transport.
    ///
    /// Each element is the byte slice from one `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.lock().sent_log.clone()
    }

    /// Return every sent command as text, with the line terminator removed.
    pub fn sent_lines(&self) -> Vec<String> {
        self.lock()
            .sent_log
            .iter()
            .map(|bytes| {
                String::from_utf8_lossy(bytes)
                    .trim_end_matches("\r\n")
                    .to_string()
            })
            .collect()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.lock().expectations.len()
    }

    /// Return the number of queued bytes not yet received.
    pub fn pending_inbound(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if let Some(kind) = state.send_failure {
            return Err(Error::Io(std::io::Error::new(kind, "mock send failure")));
        }

        // Record what was sent.
        state.sent_log.push(data.to_vec());

        // Match against the next expectation.
        if let Some(expectation) = state.expectations.pop_front() {
            if data != expectation.request.as_slice() {
                return Err(Error::Protocol(format!(
                    "unexpected send data: expected {:?}, got {:?}",
                    String::from_utf8_lossy(&expectation.request),
                    String::from_utf8_lossy(data)
                )));
            }
            state.inbound.extend(expectation.response);
            Ok(())
        } else {
            Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            ))
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if state.inbound.is_empty() {
            return Err(Error::Timeout);
        }

        let limit = state.chunk_size.unwrap_or(usize::MAX);
        let n = state.inbound.len().min(buf.len()).min(limit);
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.connected = false;
        state.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_basic_send_receive() {
        let mut mock = MockTransport::new();
        mock.expect_line("mac get band", "868");

        mock.send(b"mac get band\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"868\r\n");
    }

    #[tokio::test]
    async fn mock_transport_tracks_sent_data_across_clones() {
        let observer = MockTransport::new();
        let mut mock = observer.clone();
        mock.expect_line("mac pause", "4294967245");
        mock.expect_line("mac resume", "ok");

        mock.send(b"mac pause\r\n").await.unwrap();
        mock.send(b"mac resume\r\n").await.unwrap();

        assert_eq!(observer.sent_data().len(), 2);
        assert_eq!(observer.sent_lines(), vec!["mac pause", "mac resume"]);
    }

    #[tokio::test]
    async fn mock_transport_wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect_line("sys get hweui", "0004A30B001A2B3C");

        let result = mock.send(b"mac get status\r\n").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn mock_transport_no_expectations_errors() {
        let mut mock = MockTransport::new();
        let result = mock.send(b"sys get ver\r\n").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn mock_transport_receive_without_data_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 64];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }

    #[tokio::test]
    async fn mock_transport_chunked_receive() {
        let mut mock = MockTransport::new();
        mock.push_inbound(b"ok\r\n");
        mock.set_chunk_size(3);

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], b"ok\r");
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], b"\n");
        assert_eq!(mock.pending_inbound(), 0);
    }

    #[tokio::test]
    async fn mock_transport_send_failure() {
        let mut mock = MockTransport::new();
        mock.fail_sends(std::io::ErrorKind::BrokenPipe);
        let result = mock.send(b"mac get sync\r\n").await;
        assert!(matches!(result.unwrap_err(), Error::Io(_)));
    }

    #[tokio::test]
    async fn mock_transport_disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.close().await.unwrap();
        assert!(!mock.is_connected());

        let result = mock.send(b"mac get sync\r\n").await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));
        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));
    }

    #[tokio::test]
    async fn mock_transport_remaining_expectations() {
        let mut mock = MockTransport::new();
        mock.expect_line("mac pause", "0");
        mock.expect_line("mac resume", "ok");
        assert_eq!(mock.remaining_expectations(), 2);

        mock.send(b"mac pause\r\n").await.unwrap();
        assert_eq!(mock.remaining_expectations(), 1);
    }
}

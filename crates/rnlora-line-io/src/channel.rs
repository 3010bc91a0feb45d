//! Receive task and serialized command channel.
//!
//! One tokio task (the receive pump) reads raw chunks from the transport,
//! frames them into lines, and publishes each line to the [`Mailbox`].
//! The [`CommandChannel`] writes one command at a time and takes exactly
//! one line from the mailbox as its reply.
//!
//! Because only one command is ever outstanding, the reply to the n-th
//! command is the first line framed after that command was written.
//! Every write bumps a write epoch, and the receive task stamps each line
//! with the epoch current when its final bytes were read. A command drops
//! every line stamped before its own write (late replies to commands that
//! timed out, unsolicited output), however many of them are queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use rnlora_core::error::{Error, Result};
use rnlora_core::transport::Transport;

use crate::framer::{self, FeedResult, LineFramer};
use crate::mailbox::Mailbox;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Shared handle to the transport. The receive task locks it only for the
/// duration of one poll, so writes are delayed by at most `poll_interval`.
type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// What the receive task hands to a waiting command: a line, or the
/// local failure that prevented one from being framed.
struct Received {
    /// Write epoch at the time the line's last bytes were read.
    epoch: u64,
    line: Result<String>,
}

type LineMailbox = Mailbox<Received>;

/// Default timeout for one command/reply exchange.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for the line IO engine.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Timeout used by [`CommandChannel::command`].
    pub command_timeout: Duration,
    /// Longest line content accepted before it is dropped as a
    /// [`Error::Resource`] failure.
    pub max_line_len: usize,
    /// How long one transport read may hold the transport.
    pub poll_interval: Duration,
    /// Pause after an empty read before polling again.
    pub idle_backoff: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_line_len: framer::DEFAULT_MAX_LINE_LEN,
            poll_interval: Duration::from_millis(20),
            idle_backoff: Duration::from_millis(10),
        }
    }
}

struct ChannelInner {
    transport: SharedTransport,
    mailbox: Arc<LineMailbox>,
    /// Bumped on every write. Only changed and read under the transport
    /// lock, which orders it against the receive task's reads.
    epoch: Arc<AtomicU64>,
    /// Held for the whole of one exchange: one command in flight, globally.
    cmd_lock: Mutex<()>,
    command_timeout: Duration,
}

/// Issues one textual command at a time and waits for its reply line.
///
/// Cheap to clone; all clones share the same exclusion lock, so commands
/// from different tasks are strictly serialized.
#[derive(Clone)]
pub struct CommandChannel {
    inner: Arc<ChannelInner>,
}

impl CommandChannel {
    /// Send `command` and wait up to `timeout` for the reply line.
    ///
    /// The terminator is appended here. The reply is returned verbatim;
    /// checking it against the command's grammar is the caller's job.
    /// A transport write failure is returned immediately. Nothing is
    /// written once the line IO has been torn down.
    pub async fn execute(&self, command: &str, timeout: Duration) -> Result<String> {
        let frame = framer::encode_line(command).ok_or_else(|| {
            Error::InvalidParameter(format!("command contains a line terminator: {command:?}"))
        })?;

        let _exclusive = self.inner.cmd_lock.lock().await;
        let deadline = Instant::now() + timeout;

        if self.inner.mailbox.is_released() {
            return Err(Error::NotConnected);
        }

        let written_at = {
            let mut transport = self.inner.transport.lock().await;
            let epoch = self.inner.epoch.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(command, epoch, "sending command");
            transport.send(&frame).await?;
            epoch
        };

        loop {
            let received = match self.inner.mailbox.take_until(deadline).await {
                Ok(received) => received,
                Err(Error::Timeout) => {
                    debug!(command, timeout_ms = timeout.as_millis(), "command timed out");
                    return Err(Error::Timeout);
                }
                Err(e) => return Err(e),
            };

            if received.epoch < written_at {
                match received.line {
                    Ok(line) => debug!(line, "discarding stale line"),
                    Err(e) => debug!(error = %e, "discarding stale receive failure"),
                }
                continue;
            }

            let reply = received.line?;
            debug!(command, reply, "command reply");
            return Ok(reply);
        }
    }

    /// Send `command` with the configured default timeout.
    pub async fn command(&self, command: &str) -> Result<String> {
        self.execute(command, self.inner.command_timeout).await
    }

    /// Wait up to `timeout` for a line the module sends on its own (the
    /// boot banner), without writing anything.
    pub async fn read_line(&self, timeout: Duration) -> Result<String> {
        let _exclusive = self.inner.cmd_lock.lock().await;
        self.inner.mailbox.take(timeout).await?.line
    }

    /// The timeout used by [`command`](Self::command).
    pub fn command_timeout(&self) -> Duration {
        self.inner.command_timeout
    }
}

/// Handle to the running line IO engine.
///
/// Dropping the handle tears the engine down: the mailbox is force-released
/// and the receive task is cancelled, so it can never stay blocked.
pub struct LineIo {
    channel: CommandChannel,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LineIo {
    /// A clone of the command channel.
    pub fn channel(&self) -> CommandChannel {
        self.channel.clone()
    }

    /// Whether the receive task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the receive task and close the transport.
    pub async fn shutdown(mut self) -> Result<()> {
        self.release();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.channel.inner.transport.lock().await.close().await
    }

    fn release(&self) {
        self.channel.inner.mailbox.force_release();
        self.cancel.cancel();
    }
}

impl Drop for LineIo {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Arm the receive path: spawn the receive task over `transport`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_line_io(transport: Box<dyn Transport>, config: ChannelConfig) -> LineIo {
    let transport: SharedTransport = Arc::new(Mutex::new(transport));
    let mailbox = Arc::new(LineMailbox::new());
    let epoch = Arc::new(AtomicU64::new(0));
    let cancel = CancellationToken::new();

    let task = tokio::spawn(rx_pump(
        transport.clone(),
        LineFramer::with_max_line_len(config.max_line_len),
        mailbox.clone(),
        epoch.clone(),
        config.clone(),
        cancel.clone(),
    ));

    LineIo {
        channel: CommandChannel {
            inner: Arc::new(ChannelInner {
                transport,
                mailbox,
                epoch,
                cmd_lock: Mutex::new(()),
                command_timeout: config.command_timeout,
            }),
        },
        cancel,
        task: Some(task),
    }
}

// ---------------------------------------------------------------------------
// Receive task
// ---------------------------------------------------------------------------

/// Size of one transport read.
const RX_CHUNK: usize = 256;

/// The receive loop. Runs as a spawned tokio task until cancelled, the
/// mailbox is released, or the transport goes away.
async fn rx_pump(
    transport: SharedTransport,
    mut framer: LineFramer,
    mailbox: Arc<LineMailbox>,
    epoch: Arc<AtomicU64>,
    config: ChannelConfig,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; RX_CHUNK];

    loop {
        let (received, read_epoch) = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("receive task cancelled");
                break;
            }

            received = async {
                let mut transport = transport.lock().await;
                let received = transport.receive(&mut buf, config.poll_interval).await;
                (received, epoch.load(Ordering::Relaxed))
            } => received,
        };

        match received {
            Ok(n) if n > 0 => {
                if deliver(&buf[..n], read_epoch, &mut framer, &mailbox)
                    .await
                    .is_err()
                {
                    debug!("mailbox released, stopping receive task");
                    break;
                }
                continue;
            }
            Ok(_) | Err(Error::Timeout) => {}
            Err(Error::NotConnected) | Err(Error::ConnectionLost) => {
                debug!("transport gone, stopping receive task");
                break;
            }
            Err(e) => warn!(error = %e, "transport receive failed"),
        }

        // Nothing read: yield so writers can take the transport.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.idle_backoff) => {}
        }
    }
}

/// Feed one chunk through the framer, redelivering the unconsumed
/// remainder after every completed line. Every line is stamped with the
/// write epoch current when `chunk` was read.
///
/// Fails only when the mailbox has been released.
async fn deliver(
    chunk: &[u8],
    epoch: u64,
    framer: &mut LineFramer,
    mailbox: &LineMailbox,
) -> Result<()> {
    let mut rest = chunk;
    while !rest.is_empty() {
        match framer.feed(rest) {
            FeedResult::Line { line, consumed } => {
                trace!(line, "line received");
                mailbox
                    .publish(Received {
                        epoch,
                        line: Ok(line),
                    })
                    .await?;
                rest = &rest[consumed..];
            }
            FeedResult::Overflow { consumed } => {
                warn!("received line exceeds buffer limit, dropping it");
                mailbox
                    .publish(Received {
                        epoch,
                        line: Err(Error::Resource("received line exceeds buffer limit".into())),
                    })
                    .await?;
                rest = &rest[consumed..];
            }
            FeedResult::Incomplete => break,
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rnlora_test_harness::MockTransport;

    fn test_config() -> ChannelConfig {
        ChannelConfig::default()
    }

    #[tokio::test(start_paused = true)]
    async fn basic_command() {
        let mock = MockTransport::new();
        mock.expect_line("mac get band", "868");
        let io = spawn_line_io(Box::new(mock.clone()), test_config());

        let reply = io.channel().command("mac get band").await.unwrap();
        assert_eq!(reply, "868");
        assert_eq!(mock.sent_data(), vec![b"mac get band\r\n".to_vec()]);

        io.shutdown().await.unwrap();
        assert!(!mock.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn reply_reassembled_from_small_chunks() {
        let mock = MockTransport::new();
        mock.set_chunk_size(1);
        mock.expect_line("sys get hweui", "00AABBCCDDEEFF01");
        let io = spawn_line_io(Box::new(mock.clone()), test_config());

        let reply = io.channel().command("sys get hweui").await.unwrap();
        assert_eq!(reply, "00AABBCCDDEEFF01");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_reply_line_is_legal() {
        let mock = MockTransport::new();
        mock.expect_line("mac get sync", "");
        let io = spawn_line_io(Box::new(mock), test_config());

        assert_eq!(io.channel().command("mac get sync").await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_never_early() {
        let mock = MockTransport::new();
        mock.expect_silence("mac get status");
        let io = spawn_line_io(Box::new(mock), test_config());

        let start = Instant::now();
        let result = io
            .channel()
            .execute("mac get status", Duration::from_secs(1))
            .await;
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(Error::Timeout)));
        assert!(elapsed >= Duration::from_secs(1), "timed out early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1200), "timed out late: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_returns_immediately() {
        let mock = MockTransport::new();
        mock.fail_sends(std::io::ErrorKind::BrokenPipe);
        let io = spawn_line_io(Box::new(mock), test_config());

        let start = Instant::now();
        let result = io.channel().command("mac pause").await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn command_with_terminator_is_rejected() {
        let mock = MockTransport::new();
        let io = spawn_line_io(Box::new(mock.clone()), test_config());

        let result = io.channel().command("mac pause\r\nmac resume").await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_commands_get_their_own_replies() {
        let mock = MockTransport::new();
        mock.set_chunk_size(3);
        mock.expect_line("mac get band", "868");
        mock.expect_line("mac reset 433", "ok");
        mock.expect_line("mac get band", "433");
        mock.expect_line("mac get status", "00000001");
        let io = spawn_line_io(Box::new(mock.clone()), test_config());
        let channel = io.channel();

        assert_eq!(channel.command("mac get band").await.unwrap(), "868");
        assert_eq!(channel.command("mac reset 433").await.unwrap(), "ok");
        assert_eq!(channel.command("mac get band").await.unwrap(), "433");
        assert_eq!(channel.command("mac get status").await.unwrap(), "00000001");
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn extra_line_in_reply_chunk_is_held_then_discarded() {
        let mock = MockTransport::new();
        // The first exchange carries two lines in one read.
        mock.expect(b"mac pause\r\n", b"4294967245\r\nok\r\n");
        mock.expect_silence("mac resume");
        let io = spawn_line_io(Box::new(mock), test_config());
        let channel = io.channel();

        assert_eq!(channel.command("mac pause").await.unwrap(), "4294967245");

        // The receive task redelivers the remainder and stalls on "ok".
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(channel.inner.mailbox.is_occupied());

        // That line predates the next write, so it cannot be its reply.
        let result = channel.command("mac resume").await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(!channel.inner.mailbox.is_occupied());
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_does_not_answer_next_command() {
        let mock = MockTransport::new();
        mock.expect_silence("mac get status");
        mock.expect_line("mac get band", "868");
        let io = spawn_line_io(Box::new(mock.clone()), test_config());
        let channel = io.channel();

        let result = channel
            .execute("mac get status", Duration::from_millis(200))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));

        // The status reply shows up after the deadline.
        mock.push_inbound(b"00000001\r\n");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(channel.command("mac get band").await.unwrap(), "868");
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_of_several_lines_is_skipped() {
        let mock = MockTransport::new();
        // Unsolicited output queued before the command is written.
        mock.push_inbound(b"mac_rx 1 AA\r\nmac_rx 2 BB\r\nmac_rx 3 CC\r\n");
        mock.expect_line("mac get band", "868");
        mock.expect_line("mac get status", "00000001");
        let io = spawn_line_io(Box::new(mock.clone()), test_config());
        let channel = io.channel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(channel.command("mac get band").await.unwrap(), "868");
        assert_eq!(channel.command("mac get status").await.unwrap(), "00000001");
    }

    #[tokio::test(start_paused = true)]
    async fn multi_line_late_reply_is_skipped() {
        let mock = MockTransport::new();
        mock.expect_silence("sys get ver");
        mock.expect_line("mac get band", "868");
        let io = spawn_line_io(Box::new(mock.clone()), test_config());
        let channel = io.channel();

        let result = channel.execute("sys get ver", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Timeout)));

        // The timed-out command answers late, in two lines.
        mock.push_inbound(b"RN2483 1.0.3\r\nNov 23 2016\r\n");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(channel.command("mac get band").await.unwrap(), "868");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_commands_are_serialized() {
        let mock = MockTransport::new();
        mock.set_chunk_size(2);
        // Same command from every task; the n-th exchange gets reply n.
        for i in 0..4 {
            mock.expect_line("mac get sync", &format!("3{i}"));
        }
        let io = spawn_line_io(Box::new(mock.clone()), test_config());

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let channel = io.channel();
            tasks.push(tokio::spawn(
                async move { channel.command("mac get sync").await },
            ));
        }

        let mut replies = Vec::new();
        for task in tasks {
            replies.push(task.await.unwrap().unwrap());
        }
        // Overlapping exchanges would lose or duplicate replies.
        replies.sort();
        assert_eq!(replies, vec!["30", "31", "32", "33"]);
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn banner_read_without_command() {
        let mock = MockTransport::new();
        mock.push_inbound(b"RN2483 1.0.3 Nov 23 2016 10:55:12\r\n");
        let io = spawn_line_io(Box::new(mock.clone()), test_config());

        let banner = io.channel().read_line(Duration::from_secs(1)).await.unwrap();
        assert_eq!(banner, "RN2483 1.0.3 Nov 23 2016 10:55:12");
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_is_reported_as_resource() {
        let mock = MockTransport::new();
        let mut noise = vec![b'x'; 40];
        noise.extend_from_slice(b"\r\n");
        mock.expect(b"mac get sync\r\n", &noise);
        mock.expect_line("mac get band", "868");
        let config = ChannelConfig {
            max_line_len: 16,
            ..test_config()
        };
        let io = spawn_line_io(Box::new(mock), config);
        let channel = io.channel();

        let result = channel.command("mac get sync").await;
        assert!(matches!(result, Err(Error::Resource(_))));
        // Framing resynchronises on the next terminator.
        assert_eq!(channel.command("mac get band").await.unwrap(), "868");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_releases_blocked_receive_task() {
        let mock = MockTransport::new();
        // Unsolicited line nobody will take: the receive task blocks.
        mock.push_inbound(b"mac_rx 1 DEADBEEF\r\n");
        let io = spawn_line_io(Box::new(mock.clone()), test_config());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(io.is_running());

        let channel = io.channel();
        drop(io);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = channel.command("mac get sync").await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_receive_task() {
        let mock = MockTransport::new();
        mock.push_inbound(b"unsolicited\r\n");
        let io = spawn_line_io(Box::new(mock.clone()), test_config());
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Completes even though the receive task is blocked in publish.
        io.shutdown().await.unwrap();
        assert!(!mock.is_connected());
    }
}

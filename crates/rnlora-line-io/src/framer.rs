//! Incremental CR-LF line framing.
//!
//! [`LineFramer`] is fed raw chunks exactly as the transport delivers them.
//! Chunk boundaries may fall anywhere, including between the CR and the LF
//! of a terminator. The framer stops at the first completed line in a chunk
//! and reports how many bytes it used; the caller redelivers the rest.
//!
//! Every CR is withheld from line content. A CR that is not followed by LF
//! neither terminates the line nor appears in it. An LF without a preceding
//! CR is ordinary content.

use bytes::{BufMut, BytesMut};

/// Carriage return, first byte of the terminator.
pub const CR: u8 = b'\r';

/// Line feed, second byte of the terminator.
pub const LF: u8 = b'\n';

/// The line terminator used in both directions.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Default limit for the content of one line.
///
/// Replies from the module are at most a few dozen bytes; anything longer
/// is line noise or a wrong baud rate.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

/// Result of feeding one chunk to the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedResult {
    /// A complete line was framed.
    Line {
        /// Line content without terminator.
        line: String,
        /// Bytes of the chunk used, up to and including the LF.
        consumed: usize,
    },

    /// The pending line outgrew the buffer limit and was dropped.
    ///
    /// The framer discards everything up to the next terminator.
    Overflow {
        /// Bytes of the chunk used, up to and including the offending byte.
        consumed: usize,
    },

    /// No terminator in the chunk; all of it was accumulated.
    Incomplete,
}

/// Incremental framer state, persisted across chunks.
#[derive(Debug)]
pub struct LineFramer {
    /// Content bytes of the current, not yet terminated line.
    buf: BytesMut,
    /// The previous byte was a CR.
    saw_cr: bool,
    /// Dropping the rest of an overflowed line.
    discarding: bool,
    max_line_len: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        LineFramer {
            buf: BytesMut::with_capacity(64),
            saw_cr: false,
            discarding: false,
            max_line_len,
        }
    }

    /// Number of content bytes buffered for the current line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Scan `chunk` up to the first terminator.
    pub fn feed(&mut self, chunk: &[u8]) -> FeedResult {
        for (i, &byte) in chunk.iter().enumerate() {
            match byte {
                CR => self.saw_cr = true,
                LF if self.saw_cr => {
                    self.saw_cr = false;
                    if self.discarding {
                        // End of an overflowed line; resume framing.
                        self.discarding = false;
                        continue;
                    }
                    // split() hands over the content and empties the buffer.
                    let content = self.buf.split();
                    return FeedResult::Line {
                        line: String::from_utf8_lossy(&content).into_owned(),
                        consumed: i + 1,
                    };
                }
                _ => {
                    self.saw_cr = false;
                    if self.discarding {
                        continue;
                    }
                    if self.buf.len() >= self.max_line_len {
                        self.buf.clear();
                        self.discarding = true;
                        return FeedResult::Overflow { consumed: i + 1 };
                    }
                    self.buf.put_u8(byte);
                }
            }
        }
        FeedResult::Incomplete
    }

    /// Forget any partial line.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.saw_cr = false;
        self.discarding = false;
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a command line ready for transmission.
///
/// Appends the CR LF terminator. Returns `None` if the command itself
/// contains a CR or LF, which would split it into several requests.
pub fn encode_line(command: &str) -> Option<BytesMut> {
    if command.bytes().any(|b| b == CR || b == LF) {
        return None;
    }
    let mut out = BytesMut::with_capacity(command.len() + TERMINATOR.len());
    out.put_slice(command.as_bytes());
    out.put_slice(TERMINATOR);
    Some(out)
}

//! Error types for rnlora.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! device-layer errors are all captured here.

/// The error type for all rnlora operations.
///
/// The variants separate failures the module reported (`Protocol`,
/// `Invalid`, `Unsupported`) from failures on our side of the wire
/// (`Transport`, `Resource`, `Io`) and from silence (`Timeout`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open/write failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// The reply line does not match the grammar expected for the command.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a reply line from the module.
    ///
    /// This typically indicates the module is held in reset, the baud rate
    /// is wrong, or the module is still busy with a previous command.
    #[error("timeout waiting for response")]
    Timeout,

    /// The module recognised the command but rejected its parameter
    /// (`invalid_param`).
    #[error("rejected by device: {0}")]
    Invalid(String),

    /// The module model or the requested operation is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A local buffer could not hold the incoming line.
    ///
    /// Reported once where it is detected; callers should not log it again.
    #[error("local resource exhausted: {0}")]
    Resource(String),

    /// An invalid parameter was passed to a local API.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the module has been established, or it was torn down.
    #[error("not connected")]
    NotConnected,

    /// The connection to the module was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this failure was already reported where it was detected.
    ///
    /// The device controller skips its own error log for these so that a
    /// single local failure does not show up twice.
    pub fn is_resource(&self) -> bool {
        matches!(self, Error::Resource(_))
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("expected decimal band".into());
        assert_eq!(e.to_string(), "protocol error: expected decimal band");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_invalid() {
        let e = Error::Invalid("mac reset 433".into());
        assert_eq!(e.to_string(), "rejected by device: mac reset 433");
    }

    #[test]
    fn error_display_unsupported() {
        let e = Error::Unsupported("model 2400".into());
        assert_eq!(e.to_string(), "unsupported: model 2400");
    }

    #[test]
    fn error_display_resource() {
        let e = Error::Resource("line exceeds 1024 bytes".into());
        assert_eq!(
            e.to_string(),
            "local resource exhausted: line exceeds 1024 bytes"
        );
    }

    #[test]
    fn resource_is_flagged() {
        assert!(Error::Resource("x".into()).is_resource());
        assert!(!Error::Protocol("x".into()).is_resource());
        assert!(!Error::Timeout.is_resource());
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}

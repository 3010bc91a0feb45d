//! Transports for rnlora.
//!
//! [`SerialTransport`] is the UART link to an RN2483/RN2903, usually through
//! a USB serial adapter.
//!
//! # Example
//!
//! ```no_run
//! use rnlora_core::transport::Transport;
//! use rnlora_transport::SerialTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> rnlora_core::Result<()> {
//! let mut port = SerialTransport::open("/dev/ttyUSB0").await?;
//! port.send(b"sys get ver\r\n").await?;
//!
//! let mut buf = [0u8; 64];
//! let n = port.receive(&mut buf, Duration::from_secs(1)).await?;
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{
    DEFAULT_BAUD_RATE, DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits,
};

//! UART transport to an RN2483/RN2903.
//!
//! The modules ship with their UART fixed at 57600 baud, 8N1, without flow
//! control, and [`SerialConfig::default`] is exactly that. A different
//! configuration is only useful behind adapters or bridges that re-clock
//! the link.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace, warn};

use rnlora_core::error::{Error, Result};
use rnlora_core::transport::Transport;

pub use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

/// Factory UART baud rate of the RN2483/RN2903.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Line settings for the serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    /// The module has no handshake lines; keep this at `None`.
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// Factory settings at a different baud rate.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        SerialConfig {
            baud_rate,
            ..Self::default()
        }
    }
}

/// A serial port connected to the module's UART.
pub struct SerialTransport {
    stream: Option<SerialStream>,
    path: String,
}

impl SerialTransport {
    /// Open `path` (e.g. `/dev/ttyUSB0`, `COM3`) at the factory settings.
    pub async fn open(path: &str) -> Result<Self> {
        Self::open_with_config(path, SerialConfig::default()).await
    }

    /// Open `path` with explicit line settings.
    pub async fn open_with_config(path: &str, config: SerialConfig) -> Result<Self> {
        debug!(port = %path, ?config, "Opening serial port");

        let mut stream = tokio_serial::new(path, config.baud_rate)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .parity(config.parity)
            .flow_control(config.flow_control)
            .open_native_async()
            .map_err(|e| {
                error!(port = %path, error = %e, "Failed to open serial port");
                Error::Transport(format!("cannot open {path}: {e}"))
            })?;

        // Boards that wire DTR or RTS to the reset pin would otherwise hold
        // the module in reset while the port is open.
        if let Err(e) = stream.write_data_terminal_ready(false) {
            warn!(port = %path, error = %e, "Could not clear DTR");
        }
        if let Err(e) = stream.write_request_to_send(false) {
            warn!(port = %path, error = %e, "Could not clear RTS");
        }

        info!(port = %path, baud_rate = config.baud_rate, "Serial port open");
        Ok(SerialTransport {
            stream: Some(stream),
            path: path.to_string(),
        })
    }

    /// The path this transport was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A vanished USB adapter shows up as one of these; anything else is an
/// ordinary I/O failure.
fn link_error(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            Error::ConnectionLost
        }
        _ => Error::Io(e),
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        trace!(
            port = %self.path,
            data = %String::from_utf8_lossy(data).escape_debug(),
            "tx"
        );

        let written = async {
            stream.write_all(data).await?;
            stream.flush().await
        }
        .await;
        written.map_err(|e| {
            error!(port = %self.path, error = %e, "Serial write failed");
            link_error(e)
        })
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let n = match tokio::time::timeout(timeout, stream.read(buf)).await {
            Err(_) => return Err(Error::Timeout),
            Ok(read) => read.map_err(|e| {
                error!(port = %self.path, error = %e, "Serial read failed");
                link_error(e)
            })?,
        };
        if n == 0 {
            warn!(port = %self.path, "Serial port closed by the other end");
            return Err(Error::ConnectionLost);
        }

        trace!(
            port = %self.path,
            data = %String::from_utf8_lossy(&buf[..n]).escape_debug(),
            "rx"
        );
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        if let Err(e) = stream.flush().await {
            warn!(port = %self.path, error = %e, "Flush before close failed");
        }
        info!(port = %self.path, "Serial port closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

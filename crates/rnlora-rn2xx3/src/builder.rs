//! Rn2xx3Builder -- fluent builder for bringing up an [`Rn2xx3Device`].
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters, timeouts and the reset line before the module
//! is reset and identified.
//!
//! # Example
//!
//! ```no_run
//! use rnlora_rn2xx3::builder::Rn2xx3Builder;
//! use std::time::Duration;
//!
//! # async fn example() -> rnlora_core::Result<()> {
//! let device = Rn2xx3Builder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .command_timeout(Duration::from_millis(1500))
//!     .build()
//!     .await?;
//! println!("{} {}", device.model().name, device.hweui());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rnlora_core::error::{Error, Result};
use rnlora_core::reset::{NoResetLine, ResetLine};
use rnlora_core::transport::Transport;
use rnlora_transport::{SerialConfig, SerialTransport};

use crate::device::{self, DeviceConfig, Rn2xx3Device};
use crate::models::Rn2xx3Model;

/// Fluent builder for [`Rn2xx3Device`].
///
/// Every setting has a default matching the module's factory behaviour,
/// so the simplest usage is:
///
/// ```ignore
/// let device = Rn2xx3Builder::new()
///     .serial_port("/dev/ttyUSB0")
///     .build()
///     .await?;
/// ```
pub struct Rn2xx3Builder {
    serial_port: Option<String>,
    serial_config: SerialConfig,
    config: DeviceConfig,
    reset_line: Option<Box<dyn ResetLine>>,
}

impl Rn2xx3Builder {
    pub fn new() -> Self {
        Rn2xx3Builder {
            serial_port: None,
            serial_config: SerialConfig::default(),
            config: DeviceConfig::default(),
            reset_line: None,
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the baud rate (default: 57600).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.serial_config.baud_rate = baud;
        self
    }

    /// Replace the whole serial configuration.
    pub fn serial_config(mut self, config: SerialConfig) -> Self {
        self.serial_config = config;
        self
    }

    /// Timeout for one command/reply exchange (default: 1s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.channel.command_timeout = timeout;
        self
    }

    /// How long to wait for the boot banner (default: 1s).
    pub fn banner_timeout(mut self, timeout: Duration) -> Self {
        self.config.banner_timeout = timeout;
        self
    }

    /// How long reset is held low (default: 5ms).
    pub fn reset_pulse(mut self, pulse: Duration) -> Self {
        self.config.reset_pulse = pulse;
        self
    }

    /// Delay after releasing reset (default: 100ms).
    pub fn settle_time(mut self, settle: Duration) -> Self {
        self.config.settle_time = settle;
        self
    }

    /// Band an RN2483 is reset to during bring-up (default: 433 MHz).
    pub fn target_band(mut self, band: u16) -> Self {
        self.config.target_band = band;
        self
    }

    /// Models accepted during identification (default: RN2483 and RN2903).
    pub fn supported_models(mut self, models: Vec<Rn2xx3Model>) -> Self {
        self.config.supported_models = models;
        self
    }

    /// Longest reply line accepted (default: 1024 bytes).
    pub fn max_line_len(mut self, len: usize) -> Self {
        self.config.channel.max_line_len = len;
        self
    }

    /// Drive this line for reset. Without one, level changes are skipped
    /// but the reset timing is kept.
    pub fn reset_line(mut self, line: impl ResetLine + 'static) -> Self {
        self.reset_line = Some(Box::new(line));
        self
    }

    fn validate(&self) -> Result<()> {
        if self.config.supported_models.is_empty() {
            return Err(Error::InvalidParameter(
                "at least one supported model is required".into(),
            ));
        }
        if self.config.channel.max_line_len == 0 {
            return Err(Error::InvalidParameter(
                "max_line_len must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Run bring-up over an already-open transport.
    ///
    /// Useful for tests (with a mock transport) or for links other than a
    /// local serial port.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Rn2xx3Device> {
        self.validate()?;
        let reset = self
            .reset_line
            .unwrap_or_else(|| Box::new(NoResetLine));
        device::bring_up(transport, reset, self.config).await
    }

    /// Open the serial port and run bring-up.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if no serial port was set.
    pub async fn build(self) -> Result<Rn2xx3Device> {
        self.validate()?;
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required".into()))?;
        let transport = SerialTransport::open_with_config(port, self.serial_config).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for Rn2xx3Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rn2483;
    use rnlora_test_harness::{MockResetLine, MockTransport};

    #[test]
    fn defaults() {
        let builder = Rn2xx3Builder::new();
        assert_eq!(builder.serial_config.baud_rate, 57_600);
        assert_eq!(builder.config.channel.command_timeout, Duration::from_secs(1));
        assert_eq!(builder.config.banner_timeout, Duration::from_secs(1));
        assert_eq!(builder.config.reset_pulse, Duration::from_millis(5));
        assert_eq!(builder.config.settle_time, Duration::from_millis(100));
        assert_eq!(builder.config.target_band, 433);
        assert_eq!(builder.config.supported_models.len(), 2);
        assert!(builder.reset_line.is_none());
    }

    #[test]
    fn setters() {
        let builder = Rn2xx3Builder::new()
            .serial_port("/dev/ttyACM0")
            .baud_rate(115_200)
            .command_timeout(Duration::from_millis(250))
            .target_band(868)
            .supported_models(vec![rn2483()]);
        assert_eq!(builder.serial_port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(builder.serial_config.baud_rate, 115_200);
        assert_eq!(builder.config.channel.command_timeout, Duration::from_millis(250));
        assert_eq!(builder.config.target_band, 868);
        assert_eq!(builder.config.supported_models, vec![rn2483()]);
    }

    #[tokio::test]
    async fn build_without_port_is_invalid_parameter() {
        let result = Rn2xx3Builder::new().build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn empty_model_set_is_rejected_before_reset() {
        let reset = MockResetLine::new();
        let result = Rn2xx3Builder::new()
            .supported_models(Vec::new())
            .reset_line(reset.clone())
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(reset.changes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_target_band_aborts_bring_up() {
        let mock = MockTransport::new();
        mock.push_inbound(b"RN2483 1.0.3 Nov 23 2016 10:55:12\r\n");
        mock.expect_line("sys get hweui", "0004A30B001A2B3C");

        let result = Rn2xx3Builder::new()
            .target_band(915)
            .build_with_transport(Box::new(mock.clone()))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert_eq!(mock.sent_lines(), vec!["sys get hweui"]);
    }
}

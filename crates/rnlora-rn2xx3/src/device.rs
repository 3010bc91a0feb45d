//! Rn2xx3Device -- bring-up and control of a connected RN2483/RN2903.
//!
//! [`bring_up`] drives the module through reset, reads its boot banner,
//! identifies it, reads its hardware EUI, configures the band and pokes the
//! LoRaWAN MAC once before handing back a ready [`Rn2xx3Device`]. Any fatal
//! failure drives the reset line low again and tears the line IO down, so
//! a failed bring-up leaves the module held in reset.

use std::fmt;
use std::sync::{Arc, MutexGuard};
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use rnlora_core::error::{Error, Result};
use rnlora_core::reset::ResetLine;
use rnlora_core::transport::Transport;
use rnlora_core::Eui64;
use rnlora_line_io::{ChannelConfig, CommandChannel, LineIo, spawn_line_io};

use crate::commands;
use crate::models::{self, Rn2xx3Model};

/// How long to wait for the boot banner after releasing reset.
pub const DEFAULT_BANNER_TIMEOUT: Duration = Duration::from_secs(1);
/// How long reset is held low.
pub const DEFAULT_RESET_PULSE: Duration = Duration::from_millis(5);
/// Delay after releasing reset before the banner is expected.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(100);
/// Band an RN2483 is reset to during bring-up, in MHz.
pub const DEFAULT_TARGET_BAND: u16 = 433;

/// The steps of bring-up, in order. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpStage {
    Resetting,
    AwaitingBanner,
    IdentifyingModel,
    ReadingIdentifier,
    ConfiguringBand,
    ReadingStatus,
    PauseResumeCycle,
    Ready,
    Failed,
}

impl fmt::Display for BringUpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BringUpStage::Resetting => "resetting",
            BringUpStage::AwaitingBanner => "awaiting banner",
            BringUpStage::IdentifyingModel => "identifying model",
            BringUpStage::ReadingIdentifier => "reading identifier",
            BringUpStage::ConfiguringBand => "configuring band",
            BringUpStage::ReadingStatus => "reading status",
            BringUpStage::PauseResumeCycle => "pause/resume cycle",
            BringUpStage::Ready => "ready",
            BringUpStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything bring-up needs besides the transport and reset line.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Line IO settings, including the per-command timeout.
    pub channel: ChannelConfig,
    pub banner_timeout: Duration,
    pub reset_pulse: Duration,
    pub settle_time: Duration,
    /// Band an RN2483 is reset to, in MHz.
    pub target_band: u16,
    /// Models accepted during identification.
    pub supported_models: Vec<Rn2xx3Model>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            banner_timeout: DEFAULT_BANNER_TIMEOUT,
            reset_pulse: DEFAULT_RESET_PULSE,
            settle_time: DEFAULT_SETTLE_TIME,
            target_band: DEFAULT_TARGET_BAND,
            supported_models: models::all_models(),
        }
    }
}

/// What the module told us about itself during bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub model: Rn2xx3Model,
    /// The boot banner, e.g. `RN2483 1.0.3 Nov 23 2016 10:55:12`.
    pub firmware: String,
    pub hweui: Eui64,
}

/// Mutable per-device state, updated by bring-up and later operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    /// Current band in MHz.
    pub band: u16,
    /// Last MAC status bitmask read.
    pub mac_status: Option<u32>,
    /// Pause duration reported by the last `mac pause`.
    pub max_pause: Option<u32>,
    /// Whether the MAC is paused (a `mac pause` not yet followed by a
    /// successful `mac resume`).
    pub paused: bool,
    /// Last `mac get sync` reply.
    pub sync: Option<String>,
}

/// A module that completed bring-up.
///
/// Constructed via [`Rn2xx3Builder`](crate::builder::Rn2xx3Builder). All
/// operations go through one [`CommandChannel`], so they are serialized
/// even when called from several tasks.
///
/// [`close`](Self::close) is the reliable teardown and should be awaited
/// before the runtime goes away. Dropping the device without closing it
/// still releases the receive task. On a multi-threaded runtime the drop
/// also drives the reset line low before returning; on a current-thread
/// runtime that happens on a spawned task, which never runs if the
/// runtime is already shutting down.
pub struct Rn2xx3Device {
    identity: DeviceIdentity,
    state: std::sync::Mutex<DeviceState>,
    channel: CommandChannel,
    line_io: Option<LineIo>,
    reset: Arc<Mutex<Box<dyn ResetLine>>>,
}

impl Rn2xx3Device {
    /// Identity established during bring-up.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn model(&self) -> &Rn2xx3Model {
        &self.identity.model
    }

    pub fn hweui(&self) -> Eui64 {
        self.identity.hweui
    }

    /// Snapshot of the device state.
    pub fn state(&self) -> DeviceState {
        self.lock_state().clone()
    }

    /// A clone of the command channel, for issuing commands from other
    /// tasks.
    pub fn channel(&self) -> CommandChannel {
        self.channel.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read the current band in MHz.
    ///
    /// Models without band commands report their fixed band without any
    /// traffic.
    pub async fn get_band(&self) -> Result<u16> {
        let band = match self.identity.model.fixed_band {
            Some(band) => band,
            None => read_band(&self.channel).await?,
        };
        self.lock_state().band = band;
        Ok(band)
    }

    /// Reset the MAC to the defaults of `band` (MHz).
    ///
    /// # Errors
    ///
    /// [`Error::Unsupported`] on a model without band commands,
    /// [`Error::InvalidParameter`] for a band the model cannot use, and
    /// [`Error::Invalid`] if the module answers `invalid_param`.
    pub async fn reset_band(&self, band: u16) -> Result<()> {
        let model = &self.identity.model;
        if !model.has_band_command() {
            return Err(Error::Unsupported(format!(
                "{} has no band command",
                model.name
            )));
        }
        if !model.supports_band(band) {
            return Err(Error::InvalidParameter(format!(
                "{} does not support the {band} MHz band",
                model.name
            )));
        }
        mac_reset(&self.channel, band).await?;
        let mut state = self.lock_state();
        state.band = band;
        state.paused = false;
        Ok(())
    }

    /// Read the MAC status bitmask.
    pub async fn get_status(&self) -> Result<u32> {
        let status = read_status(&self.channel).await?;
        self.lock_state().mac_status = Some(status);
        Ok(status)
    }

    /// Pause the LoRaWAN MAC, returning how long it may stay paused.
    pub async fn pause(&self) -> Result<u32> {
        let max_pause = mac_pause(&self.channel).await?;
        let mut state = self.lock_state();
        state.max_pause = Some(max_pause);
        state.paused = true;
        Ok(max_pause)
    }

    /// Resume the LoRaWAN MAC.
    pub async fn resume(&self) -> Result<()> {
        mac_resume(&self.channel).await?;
        self.lock_state().paused = false;
        Ok(())
    }

    /// Read the sync word. The reply is returned as received.
    pub async fn get_sync(&self) -> Result<String> {
        let sync = self.channel.command(commands::CMD_MAC_GET_SYNC).await?;
        self.lock_state().sync = Some(sync.clone());
        Ok(sync)
    }

    /// Send any command and return its reply line unparsed.
    pub async fn command(&self, text: &str) -> Result<String> {
        self.channel.command(text).await
    }

    /// Tear down: hold the module in reset, stop the receive task and
    /// close the transport.
    pub async fn close(mut self) -> Result<()> {
        let Some(line_io) = self.line_io.take() else {
            return Ok(());
        };
        let reset_result = self.reset.lock().await.set_level(false).await;
        if let Err(e) = &reset_result {
            warn!(error = %e, "Failed to assert reset during close");
        }
        line_io.shutdown().await?;
        info!(model = self.identity.model.name, "Device closed");
        reset_result
    }
}

impl Drop for Rn2xx3Device {
    fn drop(&mut self) {
        // Dropping the line IO releases the mailbox and cancels the
        // receive task.
        let Some(line_io) = self.line_io.take() else {
            return;
        };
        drop(line_io);

        let reset = Arc::clone(&self.reset);
        let hold_in_reset = async move {
            if let Err(e) = reset.lock().await.set_level(false).await {
                warn!(error = %e, "Failed to assert reset on drop");
            }
        };

        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(hold_in_reset));
            }
            Ok(handle) => {
                handle.spawn(hold_in_reset);
            }
            Err(_) => warn!("Device dropped outside a runtime; reset line left as is"),
        }
    }
}

// ---------------------------------------------------------------------------
// Command helpers shared by bring-up and the device operations
// ---------------------------------------------------------------------------

async fn query<T>(
    channel: &CommandChannel,
    command: &str,
    parse: fn(&str) -> Result<T>,
) -> Result<T> {
    let reply = channel.command(command).await?;
    parse(&reply)
}

async fn read_hweui(channel: &CommandChannel) -> Result<Eui64> {
    query(channel, commands::CMD_SYS_GET_HWEUI, commands::parse_hweui).await
}

async fn read_band(channel: &CommandChannel) -> Result<u16> {
    query(channel, commands::CMD_MAC_GET_BAND, commands::parse_band).await
}

async fn mac_reset(channel: &CommandChannel, band: u16) -> Result<()> {
    let reply = channel.command(&commands::cmd_mac_reset(band)).await?;
    commands::parse_mac_reset_reply(&reply)
}

async fn read_status(channel: &CommandChannel) -> Result<u32> {
    query(channel, commands::CMD_MAC_GET_STATUS, commands::parse_status).await
}

async fn mac_pause(channel: &CommandChannel) -> Result<u32> {
    query(channel, commands::CMD_MAC_PAUSE, commands::parse_pause).await
}

async fn mac_resume(channel: &CommandChannel) -> Result<()> {
    query(channel, commands::CMD_MAC_RESUME, commands::parse_ok).await
}

/// Log a failed best-effort step and carry on.
///
/// Resource failures were already reported where they happened.
fn tolerate<T>(step: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            if !e.is_resource() {
                warn!(step, error = %e, "Step failed, continuing");
            }
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Bring-up
// ---------------------------------------------------------------------------

/// Reset the module and run it through identification and configuration.
///
/// The receive path is armed while reset is held, so the boot banner is
/// never missed. On failure the reset line is driven low and the line IO
/// is shut down before the error is returned.
pub async fn bring_up(
    transport: Box<dyn Transport>,
    reset: Box<dyn ResetLine>,
    config: DeviceConfig,
) -> Result<Rn2xx3Device> {
    let reset = Arc::new(Mutex::new(reset));

    debug!(stage = %BringUpStage::Resetting, "Bring-up stage");
    if let Err(e) = reset.lock().await.set_level(false).await {
        error!(stage = %BringUpStage::Resetting, error = %e, "Failed to assert reset");
        return Err(e);
    }
    tokio::time::sleep(config.reset_pulse).await;

    let line_io = spawn_line_io(transport, config.channel.clone());
    let channel = line_io.channel();

    let mut progress = BringUp {
        channel: &channel,
        config: &config,
        stage: BringUpStage::Resetting,
    };
    let result = progress.run(&reset).await;
    let stage = progress.stage;

    match result {
        Ok((identity, state)) => {
            info!(
                model = identity.model.name,
                hweui = %identity.hweui,
                band = state.band,
                "Device ready"
            );
            Ok(Rn2xx3Device {
                identity,
                state: std::sync::Mutex::new(state),
                channel,
                line_io: Some(line_io),
                reset,
            })
        }
        Err(e) => {
            if !e.is_resource() {
                error!(%stage, error = %e, "Bring-up failed");
            }
            debug!(stage = %BringUpStage::Failed, failed_at = %stage, "Bring-up stage");
            if let Err(reset_err) = reset.lock().await.set_level(false).await {
                warn!(error = %reset_err, "Failed to assert reset after failed bring-up");
            }
            if let Err(close_err) = line_io.shutdown().await {
                debug!(error = %close_err, "Failed to close transport after failed bring-up");
            }
            Err(e)
        }
    }
}

struct BringUp<'a> {
    channel: &'a CommandChannel,
    config: &'a DeviceConfig,
    stage: BringUpStage,
}

impl BringUp<'_> {
    fn enter(&mut self, stage: BringUpStage) {
        debug!(%stage, "Bring-up stage");
        self.stage = stage;
    }

    async fn run(
        &mut self,
        reset: &Mutex<Box<dyn ResetLine>>,
    ) -> Result<(DeviceIdentity, DeviceState)> {
        reset.lock().await.set_level(true).await?;
        tokio::time::sleep(self.config.settle_time).await;

        self.enter(BringUpStage::AwaitingBanner);
        let line = self.channel.read_line(self.config.banner_timeout).await?;
        let banner = commands::parse_banner(&line)?;
        info!(firmware = %banner.text, "Firmware banner");

        self.enter(BringUpStage::IdentifyingModel);
        let model = self
            .config
            .supported_models
            .iter()
            .find(|m| m.code == banner.model_code)
            .cloned()
            .ok_or_else(|| Error::Unsupported(format!("model RN{}", banner.model_code)))?;
        info!(model = model.name, "Detected model");

        self.enter(BringUpStage::ReadingIdentifier);
        let hweui = read_hweui(self.channel).await?;
        info!(hweui = %hweui, "Hardware EUI");

        self.enter(BringUpStage::ConfiguringBand);
        let band = match model.fixed_band {
            Some(band) => band,
            None => self.configure_band(&model).await?,
        };
        let mut state = DeviceState {
            band,
            ..DeviceState::default()
        };

        self.enter(BringUpStage::ReadingStatus);
        if let Some(status) = tolerate("mac get status", read_status(self.channel).await) {
            info!(status = format_args!("{status:08x}"), "MAC status");
            state.mac_status = Some(status);
        }

        self.enter(BringUpStage::PauseResumeCycle);
        if let Some(max_pause) = tolerate("mac pause", mac_pause(self.channel).await) {
            info!(max_pause = format_args!("{max_pause:#010x}"), "MAC pausing");
            state.max_pause = Some(max_pause);
        }
        if tolerate("mac resume", mac_resume(self.channel).await).is_some() {
            info!("MAC resuming");
        }

        self.enter(BringUpStage::Ready);
        if let Ok(sync) = self.channel.command(commands::CMD_MAC_GET_SYNC).await {
            info!(command = commands::CMD_MAC_GET_SYNC, reply = %sync, "Diagnostic");
            state.sync = Some(sync);
        }

        let identity = DeviceIdentity {
            model,
            firmware: banner.text,
            hweui,
        };
        Ok((identity, state))
    }

    /// Read the band, reset to the target band, then read it back.
    async fn configure_band(&self, model: &Rn2xx3Model) -> Result<u16> {
        let target = self.config.target_band;
        if !model.supports_band(target) {
            return Err(Error::InvalidParameter(format!(
                "{} does not support the {target} MHz band",
                model.name
            )));
        }

        let current = read_band(self.channel).await?;
        info!(band = current, "Frequency band");

        mac_reset(self.channel, target).await?;

        match read_band(self.channel).await {
            Ok(band) => {
                info!(band, "New frequency band");
                Ok(band)
            }
            Err(e) => {
                debug!(error = %e, "Could not confirm new band");
                Ok(target)
            }
        }
    }
}

// rnlora test application -- CLI tool for bringing up an RN2483/RN2903
// module and issuing MAC commands against real hardware or a scripted mock
// transport.
//
// Usage:
//   rnlora-test-app --port /dev/ttyUSB0 info
//   rnlora-test-app --port /dev/ttyUSB0 status
//   rnlora-test-app --port /dev/ttyUSB0 band --set 868
//   rnlora-test-app --port /dev/ttyUSB0 raw sys get ver
//   rnlora-test-app --mock pause
//   rnlora-test-app list
//
// Logging is controlled with RUST_LOG (default: info), e.g.
//   RUST_LOG=rnlora_line_io=trace rnlora-test-app --port /dev/ttyUSB0 info

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rnlora::rn2xx3::commands;
use rnlora::{Rn2xx3Builder, Rn2xx3Device};
use rnlora_test_harness::MockTransport;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// rnlora test application -- exercises RN2483/RN2903 modules from the
/// command line.
#[derive(Parser)]
#[command(name = "rnlora-test-app", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    /// Required unless --mock is used.
    #[arg(long)]
    port: Option<String>,

    /// Override the baud rate (default: 57600).
    #[arg(long)]
    baud: Option<u32>,

    /// Per-command timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Band an RN2483 is reset to during bring-up, in MHz.
    #[arg(long, default_value_t = 433)]
    band: u16,

    /// Use a scripted RN2483 mock transport instead of a serial port.
    /// Useful for verifying CLI parsing and bring-up without hardware.
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the module up and print its identity.
    Info,

    /// Read the MAC status bitmask.
    Status,

    /// Pause the MAC, print the pause duration, then resume.
    Pause,

    /// Read the band, or reset the MAC to another band.
    Band {
        /// Reset to this band (MHz) instead of reading it.
        #[arg(long)]
        set: Option<u16>,
    },

    /// Send any command and print the reply line.
    Raw {
        /// Command words, e.g. `sys get ver`.
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },

    /// List supported models (no connection needed).
    List,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

const MOCK_BANNER: &str = "RN2483 1.0.3 Nov 23 2016 10:55:12";

/// Script a mock RN2483 through bring-up plus whatever `command` sends.
fn scripted_mock(cli: &Cli) -> MockTransport {
    let mock = MockTransport::new();
    mock.push_inbound(format!("{MOCK_BANNER}\r\n").as_bytes());
    mock.expect_line(commands::CMD_SYS_GET_HWEUI, "0004A30B001A2B3C");
    mock.expect_line(commands::CMD_MAC_GET_BAND, "868");
    mock.expect_line(&commands::cmd_mac_reset(cli.band), "ok");
    mock.expect_line(commands::CMD_MAC_GET_BAND, &cli.band.to_string());
    mock.expect_line(commands::CMD_MAC_GET_STATUS, "00000000");
    mock.expect_line(commands::CMD_MAC_PAUSE, "4294967245");
    mock.expect_line(commands::CMD_MAC_RESUME, "ok");
    mock.expect_line(commands::CMD_MAC_GET_SYNC, "34");

    match &cli.command {
        Command::Status => mock.expect_line(commands::CMD_MAC_GET_STATUS, "00000000"),
        Command::Pause => {
            mock.expect_line(commands::CMD_MAC_PAUSE, "4294967245");
            mock.expect_line(commands::CMD_MAC_RESUME, "ok");
        }
        Command::Band { set: Some(band) } => mock.expect_line(&commands::cmd_mac_reset(*band), "ok"),
        Command::Band { set: None } => {
            mock.expect_line(commands::CMD_MAC_GET_BAND, &cli.band.to_string())
        }
        Command::Raw { words } => mock.expect_line(&words.join(" "), "ok"),
        Command::Info | Command::List => {}
    }
    mock
}

async fn connect(cli: &Cli) -> Result<Rn2xx3Device> {
    let mut builder = Rn2xx3Builder::new()
        .command_timeout(Duration::from_millis(cli.timeout_ms))
        .target_band(cli.band);
    if let Some(baud) = cli.baud {
        builder = builder.baud_rate(baud);
    }

    if cli.mock {
        let device = builder
            .build_with_transport(Box::new(scripted_mock(cli)))
            .await
            .context("bring-up failed on mock transport")?;
        println!("Connected (mock transport) -- {}", device.model().name);
        return Ok(device);
    }

    let port = cli
        .port
        .as_deref()
        .context("--port is required when not using --mock")?;
    let device = builder
        .serial_port(port)
        .build()
        .await
        .with_context(|| format!("bring-up failed on {port}"))?;
    println!("Connected on {port} -- {}", device.model().name);
    Ok(device)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_list() -> Result<()> {
    println!("{:<8}  {:>4}  {:<18}  Bands (MHz)", "Model", "Code", "Compatible");
    println!("{:<8}  {:>4}  {:<18}  -----------", "--------", "----", "-".repeat(18));
    for model in rnlora::supported_models() {
        let bands = model
            .bands
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let fixed = if model.has_band_command() { "" } else { " (fixed)" };
        println!(
            "{:<8}  {:>4}  {:<18}  {bands}{fixed}",
            model.name, model.code, model.compatible
        );
    }
    Ok(())
}

fn cmd_info(device: &Rn2xx3Device) -> Result<()> {
    let identity = device.identity();
    let state = device.state();

    println!("Module Information");
    println!("  Model:          {}", identity.model.name);
    println!("  Firmware:       {}", identity.firmware);
    println!("  HWEUI:          {:#}", identity.hweui);
    println!();
    println!("State");
    println!("  Band:           {} MHz", state.band);
    match state.mac_status {
        Some(status) => println!("  MAC status:     {status:08x}"),
        None => println!("  MAC status:     (unavailable)"),
    }
    match state.max_pause {
        Some(pause) => println!("  Max pause:      {pause}"),
        None => println!("  Max pause:      (unavailable)"),
    }
    println!("  Sync word:      {}", state.sync.as_deref().unwrap_or("(unavailable)"));
    Ok(())
}

async fn cmd_status(device: &Rn2xx3Device) -> Result<()> {
    let status = device.get_status().await?;
    println!("MAC status: {status:08x}");
    Ok(())
}

async fn cmd_pause(device: &Rn2xx3Device) -> Result<()> {
    let pause = device.pause().await?;
    println!("MAC paused, may stay paused for {pause}");
    device.resume().await?;
    println!("MAC resumed");
    Ok(())
}

async fn cmd_band(device: &Rn2xx3Device, set: Option<u16>) -> Result<()> {
    if let Some(band) = set {
        device.reset_band(band).await?;
        println!("MAC reset to {band} MHz");
    } else {
        println!("Band: {} MHz", device.get_band().await?);
    }
    Ok(())
}

async fn cmd_raw(device: &Rn2xx3Device, words: &[String]) -> Result<()> {
    let text = words.join(" ");
    if text.contains(['\r', '\n']) {
        bail!("command must not contain line terminators");
    }
    let reply = device.command(&text).await?;
    println!("{text} => {reply}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // The `list` command does not require a connection.
    if let Command::List = cli.command {
        return cmd_list();
    }

    let device = connect(&cli).await?;

    let result = match &cli.command {
        Command::Info => cmd_info(&device),
        Command::Status => cmd_status(&device).await,
        Command::Pause => cmd_pause(&device).await,
        Command::Band { set } => cmd_band(&device, *set).await,
        Command::Raw { words } => cmd_raw(&device, words).await,
        Command::List => Ok(()),
    };

    if let Err(e) = device.close().await {
        tracing::warn!(error = %e, "Failed to close device");
    }
    result
}

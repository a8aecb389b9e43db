//! kvsm-hid command-line tool.
//!
//! Drives a serial HID bridge controller directly: query its status, send
//! single keys, text, mouse moves and media keys, or run the full input
//! pipeline and watch the lock indicators change.
//!
//! # Usage
//!
//! ```text
//! kvsm-hid [OPTIONS] <COMMAND>
//!
//! Commands:
//!   info        Print firmware version, USB connection and lock LEDs
//!   key         Press and release one HID usage (e.g. 0x04 for "a")
//!   type        Type ASCII text (letters, digits, space)
//!   mouse-rel   Move the pointer by a relative amount
//!   mouse-abs   Move the pointer to device coordinates (0..4095)
//!   wheel       Scroll the wheel
//!   media       Press and release a media or ACPI key (e.g. mute)
//!   reset       Software-reset the controller
//!   watch       Run the input pipeline and log status changes until Ctrl-C
//!   config      Print the effective configuration (optionally save it)
//!
//! Options:
//!   -d, --device <PATH>      Serial device [env: KVSM_DEVICE]
//!       --timeout-ms <MS>    Response timeout [env: KVSM_TIMEOUT_MS]
//!       --config <FILE>      Config file [env: KVSM_CONFIG]
//! ```
//!
//! Settings come from the config file (see
//! [`kvsm_hid::infrastructure::storage::config`]); command-line flags and
//! their environment variables override it.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kvsm_core::{MediaKey, StatusSnapshot};
use kvsm_hid::infrastructure::serial::SerialLink;
use kvsm_hid::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, ConfigError, HidConfig,
};
use kvsm_hid::{HidEngine, InputPipeline, PipelineOptions};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial HID bridge controller tool.
#[derive(Debug, Parser)]
#[command(
    name = "kvsm-hid",
    about = "Drive a CH9329-style serial HID bridge controller",
    version
)]
struct Cli {
    /// Serial device the controller is attached to.
    #[arg(long, short = 'd', env = "KVSM_DEVICE")]
    device: Option<String>,

    /// How long to wait for each response, in milliseconds.
    #[arg(long, env = "KVSM_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Config file to read instead of the default location.
    #[arg(long, env = "KVSM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print firmware version, USB connection and lock LEDs.
    Info,

    /// Press and release one HID usage ID (decimal or 0x-prefixed hex).
    Key {
        #[arg(value_parser = parse_usage)]
        usage: u8,
    },

    /// Type ASCII text.  Characters other than letters, digits and space are skipped.
    Type { text: String },

    /// Move the pointer by (dx, dy), each -128..=127.
    MouseRel {
        #[arg(allow_negative_numbers = true)]
        dx: i8,
        #[arg(allow_negative_numbers = true)]
        dy: i8,
    },

    /// Move the pointer to absolute device coordinates (0..=4095).
    MouseAbs { x: u16, y: u16 },

    /// Scroll the wheel by `delta` notches (negative scrolls down).
    Wheel {
        #[arg(allow_negative_numbers = true)]
        delta: i8,
    },

    /// Press and release a media or ACPI key, e.g. `mute`, `volume-up`, `power`.
    Media { key: MediaKey },

    /// Software-reset the controller.
    Reset,

    /// Run the input pipeline and log status changes until Ctrl-C.
    Watch {
        /// Override the status poll interval, in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Also write it to the config file.
        #[arg(long)]
        write: bool,
    },
}

fn parse_usage(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid HID usage '{s}': {e}"))
}

impl Cli {
    /// Applies command-line overrides on top of `config`.
    fn apply_overrides(&self, config: &mut HidConfig) {
        if let Some(device) = &self.device {
            config.device.path = device.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.device.receive_timeout_ms = ms;
        }
        if let Cmd::Watch {
            interval_ms: Some(ms),
        } = self.command
        {
            config.pipeline.status_interval_ms = ms;
        }
    }

    fn config_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path(),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path();
    let mut config = match &config_path {
        Ok(path) => load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        Err(_) => HidConfig::default(),
    };
    cli.apply_overrides(&mut config);

    // `RUST_LOG` wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    if let Err(e) = &config_path {
        warn!("{e}; using built-in defaults");
    }

    if let Cmd::Config { write } = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        if write {
            let path = config_path.context("no config location available")?;
            save_config_to(&config, &path)
                .with_context(|| format!("writing config to {}", path.display()))?;
            info!(path = %path.display(), "config written");
        }
        return Ok(());
    }

    let engine = open_engine(&config)?;
    let engine = run(engine, cli.command, &config)?;
    close_engine(engine)
}

#[cfg(unix)]
type Port = kvsm_hid::infrastructure::serial::termios::TtyPort;

#[cfg(unix)]
fn open_engine(config: &HidConfig) -> anyhow::Result<HidEngine<Port>> {
    let timeout = config.device.receive_timeout();
    let port = Port::open(&config.device.path, timeout)
        .with_context(|| format!("opening serial device {}", config.device.path))?;
    info!(device = %config.device.path, "connected to bridge controller");
    Ok(HidEngine::new(port, timeout))
}

#[cfg(unix)]
fn close_engine(engine: HidEngine<Port>) -> anyhow::Result<()> {
    engine.into_link().close().context("closing serial device")
}

#[cfg(not(unix))]
type Port = kvsm_hid::infrastructure::serial::mock::SimulatedBridge;

#[cfg(not(unix))]
fn open_engine(_config: &HidConfig) -> anyhow::Result<HidEngine<Port>> {
    anyhow::bail!("serial devices are only supported on Unix-like systems")
}

#[cfg(not(unix))]
fn close_engine(_engine: HidEngine<Port>) -> anyhow::Result<()> {
    Ok(())
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Executes `command` and hands the engine back for closing.
fn run<L: SerialLink + 'static>(
    mut engine: HidEngine<L>,
    command: Cmd,
    config: &HidConfig,
) -> anyhow::Result<HidEngine<L>> {
    match command {
        Cmd::Info => print_status(&engine.get_status().context("reading status")?),
        Cmd::Key { usage } => {
            engine.key_down(usage).context("key down")?;
            engine.key_up(usage).context("key up")?;
        }
        Cmd::Type { text } => {
            let typed = engine.type_text(&text).context("typing text")?;
            info!(typed, skipped = text.chars().count() - typed, "text sent");
        }
        Cmd::MouseRel { dx, dy } => engine.mouse_move_relative(dx, dy).context("relative move")?,
        Cmd::MouseAbs { x, y } => engine.mouse_move_device(x, y).context("absolute move")?,
        Cmd::Wheel { delta } => engine.mouse_wheel(delta).context("wheel")?,
        Cmd::Media { key } => {
            engine.media_key(key, true).context("media key down")?;
            engine.media_key(key, false).context("media key up")?;
        }
        Cmd::Reset => engine.reset().context("reset")?,
        Cmd::Watch { .. } => return watch(engine, PipelineOptions::from(&config.pipeline)),
        Cmd::Config { .. } => {}
    }
    Ok(engine)
}

fn watch<L: SerialLink + 'static>(
    engine: HidEngine<L>,
    options: PipelineOptions,
) -> anyhow::Result<HidEngine<L>> {
    let mut pipeline = InputPipeline::new(engine, options);
    pipeline.start().context("starting input pipeline")?;
    print_status(&pipeline.status());

    let mut changes = pipeline.subscribe();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;

    runtime.block_on(async {
        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *changes.borrow_and_update();
                    print_status(&status);
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, stopping");
                    break;
                }
            }
        }
    });

    pipeline
        .shutdown()
        .context("input worker exited abnormally")
}

fn print_status(status: &StatusSnapshot) {
    let flag = |on: bool| if on { "on" } else { "off" };
    println!(
        "firmware {}  usb {}  num {}  caps {}  scroll {}",
        status.version_string(),
        if status.connected { "connected" } else { "disconnected" },
        flag(status.num_lock),
        flag(status.caps_lock),
        flag(status.scroll_lock),
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! keyppm: keyboard-driven PPM controller
//!
//! Entry point: CLI, logging, link selection and task wiring.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keyppm::config::ControllerConfig;
use keyppm::input::{InputSource, ScriptedInput, TerminalInput};
use keyppm::scheduler::{run_generator, run_input, Shutdown};
use keyppm::state::SharedState;
use keyppm::tui::{self, App, LinkStatus};
use keyppm_link::{
    list_ports, locate, pick, ChannelTransmitter, LogTransmitter, NullTransmitter,
    SerialTransmitter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputKind {
    /// Keys typed into this terminal
    Terminal,
    /// Every keyboard on the system via /dev/input (Linux)
    Global,
}

#[derive(Parser)]
#[command(name = "keyppm")]
#[command(about = "Keyboard-driven 8-channel PPM controller for Arduino PPM encoders")]
struct Cli {
    /// Config file path (default: ~/.config/keyppm/keyppm.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port (default: auto-detect)
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Run without TUI (headless mode)
    #[arg(long)]
    headless: bool,

    /// Where key events come from
    #[arg(long, value_enum, default_value_t = InputKind::Terminal)]
    input: InputKind,

    /// Log channel updates instead of opening a serial port
    #[arg(long)]
    dry_run: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Write the default config to the config path and exit
    #[arg(long)]
    write_config: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log file used while the TUI owns the terminal
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Play key events from a script instead of reading the keyboard
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let use_tui = !(cli.headless || cli.list_ports || cli.write_config);
    init_logging(&cli, use_tui)?;

    if cli.list_ports {
        return print_ports();
    }

    let config_path = cli.config.clone().unwrap_or_else(ControllerConfig::default_path);
    if cli.write_config {
        if config_path.exists() {
            bail!("{} already exists, not overwriting", config_path.display());
        }
        ControllerConfig::default().save(&config_path)?;
        println!("Wrote default config to {}", config_path.display());
        return Ok(());
    }

    info!("Loading config from {:?}", config_path);
    let mut config = ControllerConfig::load(&config_path)?;
    if let Some(port) = &cli.port {
        config.serial.port = Some(port.clone());
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }

    let source = open_input(&cli).await?;
    let tx = open_transmitter(&cli, &config);
    let link = LinkStatus {
        description: tx.describe(),
        connected: tx.is_connected(),
    };

    let state = Arc::new(SharedState::new(&config)?);
    let shutdown = Shutdown::new();
    setup_interrupt_handler(&shutdown);

    let generator = tokio::spawn(run_generator(
        state.clone(),
        tx,
        config.tick_interval(),
        config.shutdown_grace(),
        shutdown.clone(),
    ));

    let linger = config.tick_interval() * 2;
    let input = {
        let state = state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut source = source;
            run_input(&mut source, &state, &shutdown, linger).await
        })
    };

    let display = if use_tui {
        let app = App::new(&config, link, state.snapshot());
        let result = tui::run(state.clone(), app, config.render_interval(), shutdown.clone()).await;
        shutdown.trigger();
        result
    } else {
        info!("Running in headless mode. Press Esc, Q or Ctrl+C to exit.");
        Ok(())
    };

    let end = input.await?;
    let stats = generator.await?;
    info!(
        "Stopped ({:?}): {} ticks, {} lines sent, {} failed",
        end, stats.ticks, stats.sent, stats.failed
    );
    display
}

fn init_logging(cli: &Cli, to_file: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if !to_file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    // The TUI owns the terminal, so logs go to a file
    let path = cli.log_file.clone().unwrap_or_else(default_log_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

fn default_log_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("keyppm")
        .join("keyppm.log")
}

fn print_ports() -> Result<()> {
    let candidates = list_ports()?;
    if candidates.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    let chosen = pick(&candidates).map(|c| c.name.clone());
    for c in &candidates {
        let marker = if chosen.as_deref() == Some(c.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, c);
    }
    Ok(())
}

async fn open_input(cli: &Cli) -> Result<Box<dyn InputSource>> {
    if let Some(path) = &cli.replay {
        let script = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading replay script {}", path.display()))?;
        let source = ScriptedInput::parse(&script)?;
        info!("Replaying {} events from {}", source.len(), path.display());
        return Ok(Box::new(source));
    }

    match cli.input {
        InputKind::Terminal => Ok(Box::new(TerminalInput::new()?)),
        InputKind::Global => open_global_hook(),
    }
}

#[cfg(all(target_os = "linux", feature = "global-hook"))]
fn open_global_hook() -> Result<Box<dyn InputSource>> {
    Ok(Box::new(keyppm::input::EvdevInput::open()?))
}

#[cfg(not(all(target_os = "linux", feature = "global-hook")))]
fn open_global_hook() -> Result<Box<dyn InputSource>> {
    Err(keyppm::input::InputError::HookUnavailable.into())
}

/// Serial link if one can be opened; otherwise updates go nowhere
fn open_transmitter(cli: &Cli, config: &ControllerConfig) -> Box<dyn ChannelTransmitter> {
    if cli.dry_run {
        return Box::new(LogTransmitter);
    }

    let port = match locate(config.serial.port.as_deref()) {
        Ok(port) => port,
        Err(e) => {
            warn!("Serial device unavailable: {}. Running without output.", e);
            return Box::new(NullTransmitter::new());
        }
    };

    match SerialTransmitter::open(&port, config.serial.baud_rate, config.serial_timeout()) {
        Ok(tx) => Box::new(tx),
        Err(e) => {
            warn!("{}. Running without output.", e);
            Box::new(NullTransmitter::new())
        }
    }
}

fn setup_interrupt_handler(shutdown: &Shutdown) {
    let shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || shutdown.trigger()) {
        warn!("Failed to install Ctrl+C handler: {}", e);
    }
}

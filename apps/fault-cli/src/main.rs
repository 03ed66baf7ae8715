use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fault_core::{
    FlashTool, RecoverSession, RecoveryConfig, RecoveryDriver, ResetOutcome, SerialObserver,
    ThreadSleeper, TouchSignaler, TracingObserver, scan_file,
};
use tracing::{error, info};

/// Extracts fault trace data from an otherwise unavailable board.
#[derive(Parser, Debug)]
#[command(author, version, about = "Fault trace recovery tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Load settings from a TOML file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reset a board into bootloader mode using the 1200 baud touch
    ResetBoard {
        /// Serial port of the board
        port: String,

        /// Number of times to retry resetting the device [default: 10]
        #[arg(short = 'a', long)]
        attempt_count: Option<u32>,

        /// Milliseconds to wait between attempts [default: 1000]
        #[arg(short = 'w', long)]
        attempt_wait: Option<u64>,

        /// Disable all checks that the port is valid (not recommended)
        #[arg(short, long)]
        force: bool,
    },
    /// Extract fault trace data from a board in bootloader mode
    Recover {
        /// Serial port of the board
        port: String,

        /// Location of the bossac flash reader
        #[arg(short = 'u', long)]
        bossac_path: Option<PathBuf>,

        /// Where to temporarily place the flash data [default: ./flash.bin]
        #[arg(short, long)]
        bin_path: Option<PathBuf>,

        /// Disable all checks that the port is valid (not recommended)
        #[arg(short, long)]
        force: bool,
    },
    /// Search an already downloaded flash image for fault data
    Scan {
        /// Flash image file
        image: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RecoveryConfig> {
    match path {
        Some(path) => RecoveryConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(RecoveryConfig::default()),
    }
}

/// Explicit flags win over values loaded from `--config`.
fn apply_overrides(config: &mut RecoveryConfig, command: &Commands) {
    match command {
        Commands::ResetBoard {
            attempt_count,
            attempt_wait,
            ..
        } => {
            if let Some(n) = attempt_count {
                config.budget.attempts = *n;
            }
            if let Some(ms) = attempt_wait {
                config.budget.attempt_wait_ms = *ms;
            }
        }
        Commands::Recover {
            bossac_path,
            bin_path,
            ..
        } => {
            if let Some(path) = bossac_path {
                config.flash.tool_path = Some(path.clone());
            }
            if let Some(path) = bin_path {
                config.flash.image_path = path.clone();
            }
        }
        Commands::Scan { .. } => {}
    }
}

/// `Ok(false)` is an expected miss; the process still exits non-zero.
fn run(cli: Cli) -> Result<bool> {
    let mut config = load_config(cli.config.as_ref())?;
    apply_overrides(&mut config, &cli.command);

    match cli.command {
        Commands::ResetBoard { port, force, .. } => reset_board(&config, &port, force),
        Commands::Recover { port, force, .. } => recover(&config, &port, force),
        Commands::Scan { image } => {
            let found = scan_file(&image)
                .with_context(|| format!("Failed to scan {}", image.display()))?;
            Ok(report(found))
        }
    }
}

fn reset_board(config: &RecoveryConfig, port: &str, force: bool) -> Result<bool> {
    let devices = SerialObserver::new(config.catalog.clone());
    let signaler = TouchSignaler::new();
    let events = TracingObserver;

    let outcome = RecoveryDriver::new(&devices, &signaler, &ThreadSleeper, config.budget.clone())
        .with_observer(&events)
        .force(force)
        .run(port)?;

    match outcome {
        ResetOutcome::Succeeded {
            port: Some(new_port),
            ..
        } => {
            println!("Board successfully reset! New port is {}", new_port);
            Ok(true)
        }
        ResetOutcome::Succeeded { port: None, .. } => {
            println!("Board successfully reset!");
            Ok(true)
        }
        ResetOutcome::Exhausted { attempts } => {
            eprintln!("Board failed to reset after {} attempts.", attempts);
            Ok(false)
        }
        ResetOutcome::AmbiguousLoss { .. } => {
            eprintln!(
                "Port disappeared, but unable to find a port in bootloader mode. \
                 Press the reset button twice to enter the bootloader manually."
            );
            Ok(false)
        }
    }
}

fn recover(config: &RecoveryConfig, port: &str, force: bool) -> Result<bool> {
    let tool_path =
        FlashTool::discover(config.flash.tool_path.as_deref(), &config.flash.tool_name)?;
    info!(tool = %tool_path.display(), "Using flash reader");
    let tool = FlashTool::new(tool_path, config.flash.read_offset);

    let devices = SerialObserver::new(config.catalog.clone());
    let events = TracingObserver;

    let found = RecoverSession::from_config(&devices, &tool, config)
        .with_observer(&events)
        .force(force)
        .run(port)?;

    Ok(report(found))
}

fn report(found: Option<fault_core::ScanMatch>) -> bool {
    match found {
        Some(found) => {
            println!("{}", found.record);
            true
        }
        None => {
            eprintln!("Could not find fault data! Did the device fault?");
            false
        }
    }
}

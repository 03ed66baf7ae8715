use anyhow::Result;
use clap::{Parser, Subcommand};
use fault_core::{DiagnosticRecord, FaultCause};
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the test suite
    Test,
    /// Run the CLI, passing the remaining arguments through
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Write a fake flash image with a trace block, for trying `recover-fault scan`
    SampleImage {
        #[arg(default_value = "sample_flash.bin")]
        out: PathBuf,
        /// Byte offset of the trace block
        #[arg(long, default_value_t = 0x3F00)]
        offset: usize,
    },
}

fn cargo(args: &[&str]) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {} failed", args.join(" "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            cargo(&["build"])?;
        }
        Commands::Test => {
            println!("Running tests...");
            cargo(&["test", "--workspace"])?;
        }
        Commands::Run { args } => {
            println!("Running CLI...");
            let mut full = vec!["run", "-p", "fault-cli", "--"];
            full.extend(args.iter().map(String::as_str));
            cargo(&full)?;
        }
        Commands::SampleImage { out, offset } => {
            let record = DiagnosticRecord::new(FaultCause::HardFault, 0, 1, 42, "main.cpp");
            let mut image = vec![0xFFu8; offset + DiagnosticRecord::SIZE + 0x100];
            image[*offset..*offset + DiagnosticRecord::SIZE].copy_from_slice(&record.to_bytes());
            std::fs::write(out, &image)?;
            println!("Wrote {} bytes to {}", image.len(), out.display());
        }
    }

    Ok(())
}

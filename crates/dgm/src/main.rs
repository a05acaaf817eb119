//! dgm CLI - Diagram asset pipeline.
//!
//! Provides commands for:
//! - `build`: Render a document's diagrams and write a rewritten copy
//! - `extract`: Write a document's diagram sources to files
//! - `render`: Render a directory of standalone diagram sources

mod commands;
mod error;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{BuildArgs, ExtractArgs, RenderArgs};
use output::Output;

/// dgm - Render fenced diagrams to images.
#[derive(Parser)]
#[command(name = "dgm", version, about)]
struct Cli {
    /// Enable verbose output (per-diagram logs).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a document's diagrams and write `<DOCUMENT>.updated`.
    Build(BuildArgs),
    /// Write a document's diagram sources to files.
    Extract(ExtractArgs),
    /// Render a directory of standalone diagram sources.
    Render(RenderArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Build(args) => args.execute(),
        Commands::Extract(args) => args.execute(),
        Commands::Render(args) => args.execute(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output.error(&format!("Error: {err}"));
            ExitCode::FAILURE
        }
    }
}

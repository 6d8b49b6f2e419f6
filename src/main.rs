//! Varispeed CLI - PCM speed, pitch, rate and volume processor
//!
//! Command-line interface for the varispeed stream processor.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::debug;

use varispeed::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still takes precedence
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    debug!("Varispeed v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Varispeed v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Process {
            input,
            output,
            params,
        } => commands::process(&input, &output, &params),
        Commands::Pipe {
            sample_rate,
            format,
            channels,
            params,
        } => commands::pipe(sample_rate, format, channels, &params),
        Commands::Tone {
            output,
            frequency,
            duration_ms,
            sample_rate,
            amplitude,
        } => commands::tone(&output, frequency, duration_ms, sample_rate, amplitude),
    }
}

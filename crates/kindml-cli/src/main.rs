//! kindml CLI - model cache, option resolution and media inspection.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use commands::{Cli, Commands, ExitCode};
use config::AppConfig;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = AppConfig::load();

    let outcome = match cli.command {
        Commands::Models(ref args) => commands::models::run(args, &config).map(|()| ExitCode::Success),
        Commands::Options(ref args) => commands::options::run(args, &config).map(|()| ExitCode::Success),
        Commands::Inspect(ref args) => commands::inspect::run(args, &config),
    };

    let exit_code = outcome.unwrap_or_else(|e| {
        eprintln!("error: {e:#}");
        ExitCode::Error
    });

    exit_code.into()
}

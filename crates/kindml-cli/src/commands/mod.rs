//! CLI command definitions and handlers.

pub mod inspect;
pub mod models;
pub mod options;

use clap::{Parser, Subcommand};

/// kindml - friendly wrappers around pre-trained models
#[derive(Parser)]
#[command(name = "kindml")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Manage downloaded models
    Models(models::ModelsArgs),
    /// Print the options a model would be created with
    Options(options::OptionsArgs),
    /// Describe media files the way a model would see them
    Inspect(inspect::InspectArgs),
}

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Everything succeeded.
    Success,
    /// Some inputs could not be read.
    Partial,
    /// The command failed.
    Error,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        match code {
            ExitCode::Success => Self::SUCCESS,
            ExitCode::Partial => Self::from(1),
            ExitCode::Error => Self::from(2),
        }
    }
}

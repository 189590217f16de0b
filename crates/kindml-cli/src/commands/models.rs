//! Models command - manage downloaded model files.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use kindml_adapters::models::{
    ensure_models_with_progress, list_models as adapter_list_models, model_path, models_dir,
    set_models_dir, ProgressCallback,
};
use kindml_core::ModelKind;

use crate::config::AppConfig;

/// Arguments for the models command
#[derive(Args)]
pub struct ModelsArgs {
    /// Models directory (overrides config and KINDML_MODELS_DIR)
    #[arg(long, global = true)]
    pub models_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Models subcommands
#[derive(Subcommand)]
pub enum ModelsCommand {
    /// Download all models with weights
    Fetch,
    /// List known models and whether they are installed
    List,
    /// Print the models directory, or where one model is cached
    Path {
        /// Model name
        model: Option<String>,
    },
}

/// Run the models command.
pub fn run(args: &ModelsArgs, config: &AppConfig) -> Result<()> {
    // Models directory: CLI > config > environment/default
    if let Some(dir) = args.models_dir.as_ref().or(config.models.dir.as_ref()) {
        set_models_dir(dir.clone());
    }

    match args.command {
        ModelsCommand::Fetch => fetch_models(),
        ModelsCommand::List => {
            list_models();
            Ok(())
        }
        ModelsCommand::Path { ref model } => print_path(model.as_deref()),
    }
}

fn fetch_models() -> Result<()> {
    let pb = Arc::new(ProgressBar::new(0));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let current_model: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let pb_clone = Arc::clone(&pb);
    let model_clone = Arc::clone(&current_model);

    let progress: ProgressCallback =
        Box::new(move |name: &str, downloaded: u64, total: Option<u64>| {
            let is_new_model = {
                let mut current = model_clone
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if *current == name {
                    false
                } else {
                    *current = name.to_string();
                    true
                }
            };
            if is_new_model {
                pb_clone.set_length(total.unwrap_or(0));
                pb_clone.set_message(name.to_string());
            }
            pb_clone.set_position(downloaded);
        });

    ensure_models_with_progress(Some(&progress))?;

    pb.finish_with_message("All models downloaded");
    Ok(())
}

fn list_models() {
    let models = adapter_list_models();

    println!("Models directory: {}", models_dir().display());
    println!();

    for (file, installed) in &models {
        let status = if *installed { "✓" } else { "✗" };
        println!("  {status} {} ({})", file.name(), file.filename);
    }

    println!();
    let installed_count = models.iter().filter(|(_, installed)| *installed).count();
    println!("{}/{} models installed", installed_count, models.len());
}

fn print_path(model: Option<&str>) -> Result<()> {
    let Some(name) = model else {
        println!("{}", models_dir().display());
        return Ok(());
    };

    let Some(kind) = ModelKind::from_name(name) else {
        bail!("Unknown model '{name}'");
    };
    let Some(path) = model_path(kind) else {
        bail!("Model '{kind}' has no downloadable weights");
    };
    println!("{}", path.display());
    Ok(())
}

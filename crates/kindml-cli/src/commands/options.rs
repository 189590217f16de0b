//! Options command - print the effective options for a model.

use anyhow::{Context, Result};
use clap::Args;
use kindml_core::{ModelKind, ModelOptions};
use serde_json::Value;

use crate::config::AppConfig;

/// Arguments for the options command
#[derive(Args)]
pub struct OptionsArgs {
    /// Model name (e.g. posenet, bodypix, mobilenet)
    #[arg(value_parser = parse_model)]
    pub model: ModelKind,

    /// Override an option, as key=value. Values are read as JSON, falling
    /// back to a plain string.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, Value)>,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// Parse a model name.
fn parse_model(s: &str) -> Result<ModelKind, String> {
    ModelKind::from_name(s).ok_or_else(|| {
        let known: Vec<&str> = ModelKind::ALL.iter().map(|k| k.name()).collect();
        format!("unknown model '{s}' (known: {})", known.join(", "))
    })
}

/// Parse a `key=value` override.
fn parse_assignment(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty option name in '{s}'"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Layers library defaults, model defaults, config and `--set` overrides.
pub fn effective_options(args: &OptionsArgs, config: &AppConfig) -> Result<ModelOptions> {
    let configured = config.model_options(args.model)?;
    let mut overrides = ModelOptions::new();
    for (key, value) in &args.set {
        overrides.insert(key.clone(), value.clone());
    }

    Ok(ModelOptions::for_kind(Some(args.model), [&configured, &overrides]))
}

/// Run the options command.
pub fn run(args: &OptionsArgs, config: &AppConfig) -> Result<()> {
    let options = effective_options(args, config)?;
    let pretty = args.pretty || config.output.pretty.unwrap_or(false);

    let json = if pretty {
        serde_json::to_string_pretty(&options)
    } else {
        serde_json::to_string(&options)
    }
    .context("Failed to serialize options")?;
    println!("{json}");
    Ok(())
}

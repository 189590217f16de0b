//! Configuration file support for kindml.
//!
//! Supports TOML configuration from:
//! - XDG config: `~/.config/kindml/config.toml` (lowest priority)
//! - Project-local: `.kindml.toml` (searched up directory tree)
//! - CLI flags (highest priority, applied separately)
//!
//! Per-model option tables live under `[models.<name>]`, next to the
//! `models.dir` setting.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kindml_core::{ModelKind, ModelOptions};
use serde::Deserialize;
use tracing::{debug, info};

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General options.
    pub general: GeneralConfig,
    /// Model cache and per-model options.
    pub models: ModelsConfig,
    /// Output formatting settings.
    pub output: OutputConfig,
}

/// General configuration options.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Recurse into subdirectories by default.
    pub recursive: Option<bool>,
}

/// Model configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Custom models directory path.
    pub dir: Option<PathBuf>,
    /// Option tables keyed by model name.
    #[serde(flatten)]
    pub options: BTreeMap<String, toml::Table>,
}

/// Output formatting configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Pretty-print JSON output.
    pub pretty: Option<bool>,
}

impl AppConfig {
    /// Load configuration from XDG and project-local files.
    ///
    /// Missing files are silently ignored. Invalid values are reported as
    /// warnings.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                if let Some(xdg_config) = load_file(&xdg_path) {
                    config = xdg_config;
                }
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            if let Some(project_config) = load_file(&project_path) {
                config.merge(project_config);
            }
        }

        for warning in config.validate() {
            eprintln!("warning: {warning}");
        }

        config
    }

    /// Options configured for a model, converted to option values.
    ///
    /// Tables are looked up by canonical name first, then by any alias
    /// [`ModelKind::from_name`] accepts.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented as JSON.
    pub fn model_options(&self, kind: ModelKind) -> Result<ModelOptions> {
        let mut options = ModelOptions::new();
        let tables = self
            .models
            .options
            .iter()
            .filter(|(name, _)| ModelKind::from_name(name) == Some(kind));
        for (name, table) in tables {
            let value = serde_json::to_value(table)
                .with_context(|| format!("Invalid options in [models.{name}]"))?;
            if let serde_json::Value::Object(map) = value {
                options.merge(&ModelOptions::from(map));
            }
        }
        Ok(options)
    }

    /// Checks configured values, returning one message per problem.
    #[allow(clippy::cast_precision_loss)]
    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (name, table) in &self.models.options {
            if ModelKind::from_name(name).is_none() {
                problems.push(format!("[models.{name}] does not name a known model"));
            }
            for (key, value) in table {
                if !is_unit_interval_key(key) {
                    continue;
                }
                match value.as_float().or_else(|| value.as_integer().map(|i| i as f64)) {
                    Some(v) if (0.0..=1.0).contains(&v) => {}
                    Some(v) => problems.push(format!("models.{name}.{key} must be 0.0-1.0, got {v}")),
                    None => problems.push(format!("models.{name}.{key} must be a number")),
                }
            }
        }
        problems
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present; model
    /// tables merge key by key.
    fn merge(&mut self, other: Self) {
        self.general.recursive = other.general.recursive.or(self.general.recursive);

        self.models.dir = other.models.dir.or_else(|| self.models.dir.take());
        for (name, table) in other.models.options {
            self.models.options.entry(name).or_default().extend(table);
        }

        self.output.pretty = other.output.pretty.or(self.output.pretty);
    }
}

/// Keys whose values are probabilities.
fn is_unit_interval_key(key: &str) -> bool {
    key.ends_with("threshold") || key.ends_with("confidence")
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kindml").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.kindml.toml` in the given directory and its parents.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        let config_path = dir.join(".kindml.toml");
        if config_path.exists() {
            return Some(config_path);
        }
        current = dir.parent();
    }

    None
}

/// Load and parse a TOML config file.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}

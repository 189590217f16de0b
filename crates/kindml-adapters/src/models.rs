//! Model downloading and caching adapter.
//!
//! A model is cached as its tfjs `model.json` plus every weight shard the
//! manifest's `weightsManifest` lists, stored next to it under the same
//! relative paths.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use kindml_core::{ModelKind, ModelRef};
use parking_lot::RwLock;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Placeholder checksum indicating verification should be skipped.
const PLACEHOLDER_CHECKSUM: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Environment variable overriding the models directory.
pub const MODELS_DIR_ENV: &str = "KINDML_MODELS_DIR";

/// Download chunk size.
const CHUNK: usize = 64 * 1024;

static MODELS_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Callback for download progress: `(model name, bytes downloaded, total bytes)`.
pub type ProgressCallback = Box<dyn Fn(&str, u64, Option<u64>) + Send + Sync>;

/// A downloadable model manifest.
#[derive(Debug, Clone)]
pub struct ModelFile {
    /// Model this file belongs to.
    pub kind: ModelKind,
    /// Download URL.
    pub url: &'static str,
    /// Expected SHA256 hash. All zeros skips verification.
    pub sha256: &'static str,
    /// Filename inside the model's cache directory.
    pub filename: &'static str,
}

impl ModelFile {
    /// Model name, as used on the command line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Known downloadable models. K-means has no weights.
pub const MODELS: &[ModelFile] = &[
    ModelFile {
        kind: ModelKind::PoseNet,
        url: "https://storage.googleapis.com/tfjs-models/savedmodel/posenet/mobilenet/float/075/model-stride16.json",
        sha256: PLACEHOLDER_CHECKSUM,
        filename: "model.json",
    },
    ModelFile {
        kind: ModelKind::BodyPix,
        url: "https://storage.googleapis.com/tfjs-models/savedmodel/bodypix/mobilenet/float/075/model-stride16.json",
        sha256: PLACEHOLDER_CHECKSUM,
        filename: "model.json",
    },
    ModelFile {
        kind: ModelKind::UNet,
        url: "https://raw.githubusercontent.com/zaidalyafeai/HostedModels/master/unet-128/model.json",
        sha256: PLACEHOLDER_CHECKSUM,
        filename: "model.json",
    },
    ModelFile {
        kind: ModelKind::FaceMesh,
        url: "https://tfhub.dev/mediapipe/tfjs-model/facemesh/1/default/1/model.json?tfjs-format=file",
        sha256: PLACEHOLDER_CHECKSUM,
        filename: "model.json",
    },
    ModelFile {
        kind: ModelKind::ImageClassifier,
        url: "https://storage.googleapis.com/tfjs-models/tfjs/mobilenet_v1_1.0_224/model.json",
        sha256: PLACEHOLDER_CHECKSUM,
        filename: "model.json",
    },
    ModelFile {
        kind: ModelKind::Toxicity,
        url: "https://tfhub.dev/tensorflow/tfjs-model/toxicity/1/default/1/model.json?tfjs-format=file",
        sha256: PLACEHOLDER_CHECKSUM,
        filename: "model.json",
    },
];

/// Overrides the models directory for this process.
pub fn set_models_dir(dir: impl Into<PathBuf>) {
    *MODELS_DIR_OVERRIDE.write() = Some(dir.into());
}

/// Returns the models directory path.
///
/// In order: [`set_models_dir`], `KINDML_MODELS_DIR`, then
/// `XDG_DATA_HOME/kindml/models` or `~/.local/share/kindml/models`.
#[must_use]
pub fn models_dir() -> PathBuf {
    if let Some(dir) = MODELS_DIR_OVERRIDE.read().clone() {
        return dir;
    }
    if let Some(dir) = std::env::var_os(MODELS_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kindml")
        .join("models")
}

/// The part of a tfjs `model.json` naming the weight files.
#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "weightsManifest", default)]
    weights_manifest: Vec<WeightGroup>,
}

#[derive(Debug, Deserialize)]
struct WeightGroup {
    #[serde(default)]
    paths: Vec<String>,
}

/// Returns the manifest entry for a kind, if it has weights.
#[must_use]
pub fn model_file(kind: ModelKind) -> Option<&'static ModelFile> {
    MODELS.iter().find(|m| m.kind == kind)
}

/// Returns the path a model's manifest is cached at.
#[must_use]
pub fn model_path(kind: ModelKind) -> Option<PathBuf> {
    model_file(kind).map(|m| cached_path(&models_dir(), m))
}

/// Prefers a cached local copy, falling back to the catalog entry.
#[must_use]
pub fn resolve_model_ref(kind: ModelKind) -> ModelRef {
    match model_path(kind) {
        Some(path) if path.exists() => ModelRef::Path(path),
        _ => ModelRef::Catalog(kind),
    }
}

/// Ensures all known models are downloaded.
///
/// # Errors
///
/// Returns an error if the models directory cannot be created, a download
/// fails, or a checksum does not match.
pub fn ensure_models() -> Result<()> {
    ensure_models_with_progress(None)
}

/// Ensures all known models are downloaded, reporting progress.
///
/// # Errors
///
/// See [`ensure_models`].
pub fn ensure_models_with_progress(progress: Option<&ProgressCallback>) -> Result<()> {
    let dir = models_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create models directory {}", dir.display()))?;

    for model in MODELS {
        let path = cached_path(&dir, model);
        let manifest = if path.exists() {
            debug!("Model {} already exists", model.name());
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?
        } else {
            info!("Downloading model: {}", model.name());
            let bytes = fetch(model.name(), model.url, progress)?;
            verify_checksum(model, &bytes, &path)?;
            write_file(&path, &bytes)?;
            info!("Downloaded {} ({} bytes)", model.name(), bytes.len());
            bytes
        };

        let base = path.parent().unwrap_or(dir.as_path());
        for shard in weight_paths(&manifest)
            .with_context(|| format!("Invalid manifest for {}", model.name()))?
        {
            let shard_path = base.join(&shard);
            if shard_path.exists() {
                continue;
            }
            debug!("Downloading {} shard {shard}", model.name());
            let bytes = fetch(model.name(), &shard_url(model.url, &shard), progress)?;
            write_file(&shard_path, &bytes)?;
        }
    }

    Ok(())
}

fn cached_path(dir: &Path, model: &ModelFile) -> PathBuf {
    dir.join(model.name()).join(model.filename)
}

/// Lists the weight files a `model.json` refers to, relative to it.
fn weight_paths(manifest: &[u8]) -> Result<Vec<String>> {
    let manifest: Manifest =
        serde_json::from_slice(manifest).context("Failed to parse model.json")?;
    let paths: Vec<String> = manifest
        .weights_manifest
        .into_iter()
        .flat_map(|group| group.paths)
        .collect();

    for path in &paths {
        let relative = Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !relative {
            anyhow::bail!("Weight path escapes the model directory: {path}");
        }
    }
    Ok(paths)
}

/// Resolves a shard path against the manifest URL, keeping its query.
fn shard_url(manifest_url: &str, shard: &str) -> String {
    let (location, query) = match manifest_url.split_once('?') {
        Some((location, query)) => (location, Some(query)),
        None => (manifest_url, None),
    };
    let base = location.rfind('/').map_or("", |i| &location[..=i]);
    match query {
        Some(query) => format!("{base}{shard}?{query}"),
        None => format!("{base}{shard}"),
    }
}

/// Downloads `url` into memory, reporting progress under `name`.
fn fetch(name: &str, url: &str, progress: Option<&ProgressCallback>) -> Result<Vec<u8>> {
    let mut response =
        reqwest::blocking::get(url).with_context(|| format!("Failed to download {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!("Download of {url} failed with status: {}", response.status());
    }

    let total = response.content_length();
    let mut bytes = Vec::with_capacity(total.and_then(|t| usize::try_from(t).ok()).unwrap_or(0));
    let mut chunk = vec![0u8; CHUNK];
    loop {
        let n = response
            .read(&mut chunk)
            .with_context(|| format!("Failed to read response for {name}"))?;
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n]);
        if let Some(report) = progress {
            report(name, bytes.len() as u64, total);
        }
    }
    Ok(bytes)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

fn verify_checksum(model: &ModelFile, bytes: &[u8], path: &Path) -> Result<()> {
    if model.sha256 == PLACEHOLDER_CHECKSUM {
        debug!(
            "Skipping checksum verification for {} (placeholder checksum)",
            model.name()
        );
        return Ok(());
    }

    let hash = format!("{:x}", Sha256::digest(bytes));
    if hash != model.sha256 {
        anyhow::bail!(
            "Checksum mismatch for {}: expected {}, got {}. \
             Try deleting {} and re-running to download a fresh copy.",
            model.name(),
            model.sha256,
            hash,
            path.display()
        );
    }
    Ok(())
}

/// Whether a model's manifest and every shard it lists are cached.
fn is_installed(dir: &Path, model: &ModelFile) -> bool {
    let path = cached_path(dir, model);
    let Ok(manifest) = fs::read(&path) else {
        return false;
    };
    let base = path.parent().unwrap_or(dir);
    match weight_paths(&manifest) {
        Ok(shards) => shards.iter().all(|shard| base.join(shard).exists()),
        Err(e) => {
            warn!("Ignoring cached {}: {e:#}", path.display());
            false
        }
    }
}

/// Checks if all models are installed.
#[must_use]
pub fn all_models_installed() -> bool {
    let dir = models_dir();
    MODELS.iter().all(|m| is_installed(&dir, m))
}

/// Lists known models with their install status.
#[must_use]
pub fn list_models() -> Vec<(&'static ModelFile, bool)> {
    let dir = models_dir();
    MODELS.iter().map(|m| (m, is_installed(&dir, m))).collect()
}

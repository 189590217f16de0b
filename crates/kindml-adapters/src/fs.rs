//! Filesystem adapter for loading media.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::DynamicImage;
use kindml_core::domain::{MediaHandle, VideoSource};
use kindml_core::ports::FrameProvider;
use tracing::{debug, warn};

/// Supported image extensions.
const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "webp", "bmp", "gif"];

/// Filesystem media source adapter.
pub struct FsMediaSource {
    paths: Vec<PathBuf>,
    recursive: bool,
}

impl FsMediaSource {
    /// Creates a new filesystem media source.
    ///
    /// # Arguments
    ///
    /// * `paths` - Files or directories to scan
    /// * `recursive` - Whether to recurse into subdirectories
    #[must_use]
    pub const fn new(paths: Vec<PathBuf>, recursive: bool) -> Self {
        Self { paths, recursive }
    }

    /// Collects all image files from the configured paths, sorted.
    #[must_use]
    pub fn collect_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for path in &self.paths {
            if path.is_file() {
                if is_supported_image(path) {
                    files.push(path.clone());
                } else {
                    warn!("Unsupported file type: {}", path.display());
                }
            } else if path.is_dir() {
                self.collect_from_dir(path, &mut files);
            } else {
                warn!("Path does not exist: {}", path.display());
            }
        }

        files
    }

    fn collect_from_dir(&self, dir: &Path, files: &mut Vec<PathBuf>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read directory {}: {e}", dir.display());
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            if path.is_file() && is_supported_image(&path) {
                files.push(path);
            } else if path.is_dir() && self.recursive {
                self.collect_from_dir(&path, files);
            }
        }
    }

    /// Loads every collected file as a still image.
    ///
    /// Each item pairs the path with its load result, so one unreadable
    /// file does not stop the rest.
    pub fn media(&self) -> impl Iterator<Item = (PathBuf, Result<MediaHandle>)> {
        let files = self.collect_files();
        debug!("Found {} image files", files.len());
        files.into_iter().map(|path| {
            let media = load_media(&path);
            (path, media)
        })
    }
}

/// Checks if a path has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .is_some_and(|e| RASTER_EXTENSIONS.contains(&e.as_str()))
}

/// Loads a still image from the filesystem.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or decoded.
pub fn load_media(path: &Path) -> Result<MediaHandle> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?;
    Ok(MediaHandle::still(image))
}

/// Plays a sorted list of image files as a looping video.
///
/// Every read advances to the next file. The source is ready as soon as it
/// is opened, since the first file has already been decoded.
pub struct ImageSequence {
    frames: Vec<PathBuf>,
    next: AtomicUsize,
    dimensions: (u32, u32),
}

impl ImageSequence {
    /// Opens the images found by `source` as a video.
    ///
    /// # Errors
    ///
    /// Returns an error if no image is found or the first one cannot be
    /// decoded.
    pub fn open(source: &FsMediaSource) -> Result<VideoSource> {
        Self::from_files(source.collect_files())
    }

    /// Plays an already collected list of image files as a video.
    ///
    /// # Errors
    ///
    /// Returns an error if `frames` is empty or the first file cannot be
    /// decoded.
    pub fn from_files(frames: Vec<PathBuf>) -> Result<VideoSource> {
        let first = frames.first().context("No images found for sequence")?;
        let image = image::open(first)
            .with_context(|| format!("Failed to open image: {}", first.display()))?;
        let dimensions = (image.width(), image.height());
        debug!("Image sequence of {} frames at {dimensions:?}", frames.len());

        Ok(VideoSource::ready(Arc::new(Self {
            frames,
            next: AtomicUsize::new(0),
            dimensions,
        })))
    }
}

impl FrameProvider for ImageSequence {
    fn current_frame(&self) -> Result<DynamicImage> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.frames.len();
        let path = &self.frames[index];
        image::open(path).with_context(|| format!("Failed to open frame: {}", path.display()))
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.dimensions)
    }
}

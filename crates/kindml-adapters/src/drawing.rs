//! Raster drawing sink: overlays as in-memory RGBA images, optionally saved
//! as PNG files.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use kindml_core::domain::Overlay;
use kindml_core::ports::DrawingSink;
use tracing::debug;

/// The drawable a [`RasterSink`] puts in an [`Overlay`].
#[derive(Debug, Clone)]
pub struct RasterOverlay {
    /// Rendered pixels.
    pub image: RgbaImage,
    /// Where the overlay was written, if the sink saves files.
    pub saved_to: Option<PathBuf>,
}

impl RasterOverlay {
    /// Encodes the overlay as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buffer, ImageFormat::Png)
            .context("Failed to encode overlay as PNG")?;
        Ok(buffer.into_inner())
    }
}

/// Drawing sink backed by the `image` crate.
#[derive(Debug, Default)]
pub struct RasterSink {
    output_dir: Option<PathBuf>,
    counter: AtomicU64,
}

impl RasterSink {
    /// Keeps overlays in memory only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also writes every overlay to `dir` as `overlay-NNNNNN.png`.
    #[must_use]
    pub fn saving_to(dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: Some(dir.into()),
            counter: AtomicU64::new(0),
        }
    }

    fn save(&self, dir: &Path, overlay: &RasterOverlay) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create overlay directory {}", dir.display()))?;
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("overlay-{index:06}.png"));
        std::fs::write(&path, overlay.to_png()?)
            .with_context(|| format!("Failed to write overlay {}", path.display()))?;
        debug!("Saved overlay to {}", path.display());
        Ok(path)
    }
}

impl DrawingSink for RasterSink {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn render(&self, pixels: &RgbaImage) -> Result<Overlay> {
        let mut overlay = RasterOverlay {
            image: pixels.clone(),
            saved_to: None,
        };
        if let Some(dir) = &self.output_dir {
            overlay.saved_to = Some(self.save(dir, &overlay)?);
        }
        Ok(Overlay::new(overlay))
    }
}

//! kindml Adapters - External adapters for kindml.
//!
//! This crate provides adapters for:
//! - Filesystem media sources (still images and image sequences)
//! - Model downloading and caching
//! - Raster overlay rendering

pub mod drawing;
pub mod fs;
pub mod models;

pub use drawing::{RasterOverlay, RasterSink};
pub use fs::{load_media, FsMediaSource, ImageSequence};
pub use models::{model_path, models_dir, set_models_dir};

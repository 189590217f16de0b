//! Drawing port for optional overlay rendering.

use image::RgbaImage;

use crate::domain::Overlay;

/// Port for an environment able to turn pixels into something drawable.
///
/// A model built without a sink simply produces envelopes without an
/// overlay; nothing checks for one at runtime.
pub trait DrawingSink: Send + Sync {
    /// Returns the name of this sink, used in log messages.
    fn name(&self) -> &'static str;

    /// Converts an RGBA buffer into a drawable handle.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails. Callers treat a failure as
    /// "no overlay" rather than as a failed prediction.
    fn render(&self, pixels: &RgbaImage) -> anyhow::Result<Overlay>;
}

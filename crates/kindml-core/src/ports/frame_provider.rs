//! Frame provider port for live media sources.

use image::DynamicImage;

/// Port for anything that can hand out decodable frames on demand.
///
/// Readiness is not part of this trait: a provider is wrapped in a
/// [`VideoSource`](crate::domain::VideoSource) together with a one-shot
/// first-frame signal.
pub trait FrameProvider: Send + Sync {
    /// Returns the frame currently available.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be decoded.
    fn current_frame(&self) -> anyhow::Result<DynamicImage>;

    /// Returns the frame size, if the provider knows it up front.
    fn dimensions(&self) -> Option<(u32, u32)> {
        None
    }
}

//! Media handles accepted as model input.

use std::fmt;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView, GrayImage, RgbImage, RgbaImage};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::ports::FrameProvider;

/// The variant of a [`MediaHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A live source producing frames over time.
    VideoFrame,
    /// A decoded still image.
    StillImage,
    /// A raw interleaved pixel buffer.
    PixelBuffer,
}

/// Anything a model can look at.
#[derive(Clone)]
pub enum MediaHandle {
    /// A live video source.
    VideoFrame(VideoSource),
    /// A decoded still image.
    StillImage(Arc<DynamicImage>),
    /// Raw interleaved pixels.
    PixelBuffer(PixelBuffer),
}

impl MediaHandle {
    /// Wraps a decoded image.
    #[must_use]
    pub fn still(image: DynamicImage) -> Self {
        Self::StillImage(Arc::new(image))
    }

    /// Returns the variant of this handle.
    #[must_use]
    pub const fn kind(&self) -> MediaKind {
        match self {
            Self::VideoFrame(_) => MediaKind::VideoFrame,
            Self::StillImage(_) => MediaKind::StillImage,
            Self::PixelBuffer(_) => MediaKind::PixelBuffer,
        }
    }

    /// Returns true if the handle can be read right now.
    ///
    /// Still images and pixel buffers are ready once constructed with a
    /// non-zero size; videos become ready when their first frame arrives.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match self {
            Self::VideoFrame(video) => video.is_ready(),
            Self::StillImage(image) => image.width() > 0 && image.height() > 0,
            Self::PixelBuffer(_) => true,
        }
    }

    /// Waits until the handle is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMedia`] if a still image is empty or a video
    /// source closes before producing its first frame.
    pub async fn ready(&self) -> Result<()> {
        match self {
            Self::VideoFrame(video) => video.wait_ready().await,
            Self::StillImage(image) if image.width() == 0 || image.height() == 0 => Err(
                Error::InvalidMedia("still image has zero width or height".into()),
            ),
            Self::StillImage(_) | Self::PixelBuffer(_) => Ok(()),
        }
    }

    /// Reads the current pixels as an image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMedia`] if a video is not ready yet or its
    /// provider fails to produce a frame.
    pub fn frame(&self) -> Result<DynamicImage> {
        match self {
            Self::VideoFrame(video) => video.current_frame(),
            Self::StillImage(image) => Ok(image.as_ref().clone()),
            Self::PixelBuffer(buffer) => buffer.to_image(),
        }
    }

    /// Width and height, when known without reading a frame.
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::VideoFrame(video) => video.dimensions(),
            Self::StillImage(image) => Some(image.dimensions()),
            Self::PixelBuffer(buffer) => Some((buffer.width(), buffer.height())),
        }
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoFrame(video) => f.debug_tuple("VideoFrame").field(video).finish(),
            Self::StillImage(image) => f
                .debug_tuple("StillImage")
                .field(&image.dimensions())
                .finish(),
            Self::PixelBuffer(buffer) => f.debug_tuple("PixelBuffer").field(buffer).finish(),
        }
    }
}

impl From<VideoSource> for MediaHandle {
    fn from(video: VideoSource) -> Self {
        Self::VideoFrame(video)
    }
}

impl From<DynamicImage> for MediaHandle {
    fn from(image: DynamicImage) -> Self {
        Self::still(image)
    }
}

impl From<PixelBuffer> for MediaHandle {
    fn from(buffer: PixelBuffer) -> Self {
        Self::PixelBuffer(buffer)
    }
}

/// A live frame source with a one-shot "first frame available" signal.
#[derive(Clone)]
pub struct VideoSource {
    provider: Arc<dyn FrameProvider>,
    first_frame: watch::Receiver<bool>,
}

impl VideoSource {
    /// Creates a source that is not ready until the returned notifier fires.
    #[must_use]
    pub fn new(provider: Arc<dyn FrameProvider>) -> (Self, FirstFrameNotifier) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                provider,
                first_frame: rx,
            },
            FirstFrameNotifier { tx },
        )
    }

    /// Creates a source whose first frame is already available.
    #[must_use]
    pub fn ready(provider: Arc<dyn FrameProvider>) -> Self {
        let (source, notifier) = Self::new(provider);
        notifier.notify();
        source
    }

    /// Returns true once the first frame has arrived.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.first_frame.borrow()
    }

    /// Suspends until the first frame has arrived.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMedia`] if the notifier is dropped without
    /// ever signalling a frame.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.first_frame.clone();
        rx.wait_for(|ready| *ready).await.map(|_| ()).map_err(|_| {
            Error::InvalidMedia("video source closed before its first frame".into())
        })
    }

    /// Reads the frame currently shown by the source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMedia`] if the source is not ready or the
    /// provider fails.
    pub fn current_frame(&self) -> Result<DynamicImage> {
        if !self.is_ready() {
            return Err(Error::InvalidMedia("video has no frame yet".into()));
        }
        self.provider
            .current_frame()
            .map_err(|e| Error::InvalidMedia(format!("failed to read video frame: {e:#}")))
    }

    /// Frame size reported by the provider.
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.provider.dimensions()
    }
}

impl fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoSource")
            .field("ready", &self.is_ready())
            .field("dimensions", &self.dimensions())
            .finish_non_exhaustive()
    }
}

/// Signals that a [`VideoSource`] produced its first frame.
///
/// Dropping the notifier without calling [`notify`](Self::notify) marks the
/// source as closed: anyone waiting on it fails with `InvalidMedia`.
#[derive(Debug)]
pub struct FirstFrameNotifier {
    tx: watch::Sender<bool>,
}

impl FirstFrameNotifier {
    /// Marks the first frame as available.
    pub fn notify(self) {
        self.tx.send_replace(true);
    }
}

/// Interleaved 8-bit pixels with 1, 3 or 4 channels.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Arc<[u8]>,
}

impl PixelBuffer {
    /// Creates a buffer after checking its size against the data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMedia`] for zero dimensions, an unsupported
    /// channel count, or a data length that does not match.
    pub fn new(width: u32, height: u32, channels: u8, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();
        if width == 0 || height == 0 {
            return Err(Error::InvalidMedia(format!(
                "pixel buffer must not be empty, got {width}x{height}"
            )));
        }
        if !matches!(channels, 1 | 3 | 4) {
            return Err(Error::InvalidMedia(format!(
                "pixel buffer needs 1, 3 or 4 channels, got {channels}"
            )));
        }
        let expected = width as usize * height as usize * usize::from(channels);
        if data.len() != expected {
            return Err(Error::InvalidMedia(format!(
                "pixel buffer of {width}x{height}x{channels} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Channels per pixel.
    #[must_use]
    pub const fn channels(&self) -> u8 {
        self.channels
    }

    /// Raw interleaved bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Converts the buffer into an image without touching channel values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMedia`] if the buffer cannot be wrapped.
    pub fn to_image(&self) -> Result<DynamicImage> {
        let raw = self.data.to_vec();
        let image = match self.channels {
            1 => GrayImage::from_raw(self.width, self.height, raw).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(self.width, self.height, raw).map(DynamicImage::ImageRgb8),
            _ => RgbaImage::from_raw(self.width, self.height, raw).map(DynamicImage::ImageRgba8),
        };
        image.ok_or_else(|| Error::InvalidMedia("pixel buffer does not fit its dimensions".into()))
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

/// What a single prediction looks at.
#[derive(Debug, Clone)]
pub enum PredictInput {
    /// Image-like input.
    Media(MediaHandle),
    /// Text input, for language models.
    Text(String),
}

impl PredictInput {
    /// Returns the media handle, if this is image-like input.
    #[must_use]
    pub const fn media(&self) -> Option<&MediaHandle> {
        match self {
            Self::Media(media) => Some(media),
            Self::Text(_) => None,
        }
    }

    /// Returns the text, if this is text input.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Media(_) => None,
        }
    }

    /// Waits until the input is usable.
    ///
    /// # Errors
    ///
    /// See [`MediaHandle::ready`].
    pub async fn ready(&self) -> Result<()> {
        match self {
            Self::Media(media) => media.ready().await,
            Self::Text(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SolidFrames;

    impl FrameProvider for SolidFrames {
        fn current_frame(&self) -> anyhow::Result<DynamicImage> {
            Ok(DynamicImage::new_rgb8(4, 3))
        }

        fn dimensions(&self) -> Option<(u32, u32)> {
            Some((4, 3))
        }
    }

    #[test]
    fn test_pixel_buffer_validates_length() {
        assert!(PixelBuffer::new(2, 2, 3, vec![0u8; 12]).is_ok());
        assert!(matches!(
            PixelBuffer::new(2, 2, 3, vec![0u8; 11]),
            Err(Error::InvalidMedia(_))
        ));
        assert!(matches!(
            PixelBuffer::new(0, 2, 3, Vec::<u8>::new()),
            Err(Error::InvalidMedia(_))
        ));
        assert!(matches!(
            PixelBuffer::new(1, 1, 2, vec![0u8; 2]),
            Err(Error::InvalidMedia(_))
        ));
    }

    #[test]
    fn test_pixel_buffer_preserves_channel_order() {
        let buffer = PixelBuffer::new(1, 1, 3, vec![10u8, 20, 30]).unwrap_or_else(|e| panic!("{e}"));
        let image = buffer.to_image().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(image.to_rgb8().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_still_image_kind_and_dimensions() {
        let media = MediaHandle::still(DynamicImage::new_rgb8(8, 6));
        assert_eq!(media.kind(), MediaKind::StillImage);
        assert_eq!(media.dimensions(), Some((8, 6)));
        assert!(media.is_ready());
    }

    #[tokio::test]
    async fn test_empty_still_image_is_invalid() {
        let media = MediaHandle::still(DynamicImage::new_rgb8(0, 0));
        assert!(!media.is_ready());
        assert!(matches!(media.ready().await, Err(Error::InvalidMedia(_))));
    }

    #[tokio::test]
    async fn test_video_becomes_ready_after_first_frame() {
        let (video, notifier) = VideoSource::new(Arc::new(SolidFrames));
        let media = MediaHandle::from(video.clone());
        assert!(!media.is_ready());
        assert!(matches!(media.frame(), Err(Error::InvalidMedia(_))));

        let waiter = tokio::spawn(async move { video.wait_ready().await });
        notifier.notify();

        assert!(waiter.await.is_ok_and(|r| r.is_ok()));
        assert!(media.is_ready());
        assert_eq!(media.frame().map(|f| f.dimensions()).ok(), Some((4, 3)));
    }

    #[tokio::test]
    async fn test_video_closed_before_first_frame() {
        let (video, notifier) = VideoSource::new(Arc::new(SolidFrames));
        drop(notifier);
        assert!(matches!(video.wait_ready().await, Err(Error::InvalidMedia(_))));
    }

    #[tokio::test]
    async fn test_text_input_is_always_ready() {
        let input = PredictInput::Text("you are great".into());
        assert!(input.ready().await.is_ok());
        assert_eq!(input.text(), Some("you are great"));
        assert!(input.media().is_none());
    }
}

//! Mock implementations of core port traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use kindml_core::domain::{
    Classification, MediaKind, ModelOptions, Overlay, PredictInput, RawOutput, RawPrediction,
};
use kindml_core::ports::{DrawingSink, FrameProvider, ModelRuntime};
use kindml_core::{ModelRef, ResourceScope};

/// Handle returned by [`MockRuntime::load`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    /// The model that was loaded.
    pub model: ModelRef,
    /// Options the load saw.
    pub params: ModelOptions,
}

/// One recorded `predict` call.
#[derive(Debug, Clone)]
pub struct RecordedPredict {
    /// Media variant, or `None` for text input.
    pub media: Option<MediaKind>,
    /// Size of the frame the mock read, if any.
    pub dimensions: Option<(u32, u32)>,
    /// Text input, if any.
    pub text: Option<String>,
    /// Effective options for the call.
    pub params: ModelOptions,
}

/// An error message and how many calls, counted from the first, get it.
#[derive(Debug, Clone)]
struct Failure {
    message: String,
    calls: usize,
}

impl Failure {
    fn check(failure: Option<&Self>, call: usize) -> anyhow::Result<()> {
        match failure {
            Some(f) if call < f.calls => Err(anyhow!("{}", f.message)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Behavior {
    load_delay: Duration,
    load_error: Option<Failure>,
    predict_delay: Duration,
    predict_error: Option<Failure>,
    output: Option<RawOutput>,
    transient_tensors: usize,
    derived_tensor: bool,
}

/// Mock implementation of `ModelRuntime` for testing.
///
/// By default loads and predicts succeed immediately and the output echoes
/// the input: a single classification labelled `"<width>x<height>"` for
/// media or the text itself. Counters and recorded calls support
/// assertions.
#[derive(Default)]
pub struct MockRuntime {
    behavior: Behavior,
    load_calls: AtomicUsize,
    predict_calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    recorded: Mutex<Vec<RecordedPredict>>,
}

impl MockRuntime {
    /// Creates a runtime that succeeds instantly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every load.
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.behavior.load_delay = delay;
        self
    }

    /// Makes every load fail with `message`.
    #[must_use]
    pub fn failing_load(self, message: impl Into<String>) -> Self {
        self.failing_first_loads(usize::MAX, message)
    }

    /// Makes the first `count` loads fail with `message`; later ones succeed.
    #[must_use]
    pub fn failing_first_loads(mut self, count: usize, message: impl Into<String>) -> Self {
        self.behavior.load_error = Some(Failure {
            message: message.into(),
            calls: count,
        });
        self
    }

    /// Delays every predict.
    #[must_use]
    pub fn with_predict_delay(mut self, delay: Duration) -> Self {
        self.behavior.predict_delay = delay;
        self
    }

    /// Makes every predict fail with `message`, after allocating tensors.
    #[must_use]
    pub fn failing_predict(self, message: impl Into<String>) -> Self {
        self.failing_first_predicts(usize::MAX, message)
    }

    /// Makes the first `count` predicts fail with `message`, after
    /// allocating tensors; later ones succeed.
    #[must_use]
    pub fn failing_first_predicts(mut self, count: usize, message: impl Into<String>) -> Self {
        self.behavior.predict_error = Some(Failure {
            message: message.into(),
            calls: count,
        });
        self
    }

    /// Returns `output` from every predict instead of echoing the input.
    #[must_use]
    pub fn with_output(mut self, output: RawOutput) -> Self {
        self.behavior.output = Some(output);
        self
    }

    /// Allocates `count` scratch tensors in every predict.
    #[must_use]
    pub fn with_transient_tensors(mut self, count: usize) -> Self {
        self.behavior.transient_tensors = count;
        self
    }

    /// Attaches a derived tensor to every prediction.
    #[must_use]
    pub fn with_derived_tensor(mut self) -> Self {
        self.behavior.derived_tensor = true;
        self
    }

    /// Number of `load` calls.
    #[must_use]
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of `predict` calls.
    #[must_use]
    pub fn predict_calls(&self) -> usize {
        self.predict_calls.load(Ordering::SeqCst)
    }

    /// Highest number of predicts observed running at once.
    #[must_use]
    pub fn max_concurrent_predicts(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Every predict call so far, in start order.
    #[must_use]
    pub fn recorded(&self) -> Vec<RecordedPredict> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, input: &PredictInput, params: &ModelOptions) -> anyhow::Result<String> {
        let (media, dimensions, text, label) = match input {
            PredictInput::Media(media) => {
                let frame = media.frame()?;
                let (w, h) = (frame.width(), frame.height());
                (Some(media.kind()), Some((w, h)), None, format!("{w}x{h}"))
            }
            PredictInput::Text(text) => (None, None, Some(text.clone()), text.clone()),
        };
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedPredict {
                media,
                dimensions,
                text,
                params: params.clone(),
            });
        Ok(label)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelRuntime for MockRuntime {
    type Handle = MockHandle;

    async fn load(&self, model: &ModelRef, params: &ModelOptions) -> anyhow::Result<MockHandle> {
        let call = self.load_calls.fetch_add(1, Ordering::SeqCst);
        if !self.behavior.load_delay.is_zero() {
            tokio::time::sleep(self.behavior.load_delay).await;
        }
        Failure::check(self.behavior.load_error.as_ref(), call)?;
        Ok(MockHandle {
            model: model.clone(),
            params: params.clone(),
        })
    }

    async fn predict(
        &self,
        _handle: &MockHandle,
        input: &PredictInput,
        params: &ModelOptions,
        scope: &ResourceScope,
    ) -> anyhow::Result<RawPrediction> {
        let call = self.predict_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(&self.active);

        let label = self.record(input, params)?;
        for _ in 0..self.behavior.transient_tensors {
            scope.alloc(vec![2, 2], vec![0.5; 4])?;
        }
        if !self.behavior.predict_delay.is_zero() {
            tokio::time::sleep(self.behavior.predict_delay).await;
        }
        Failure::check(self.behavior.predict_error.as_ref(), call)?;

        let output = self.behavior.output.clone().unwrap_or_else(|| {
            RawOutput::Classifications(vec![Classification {
                label,
                confidence: 1.0,
            }])
        });
        let mut prediction = RawPrediction::new(output);
        if self.behavior.derived_tensor {
            prediction = prediction.with_tensor(scope.alloc(vec![1, 3], vec![1.0, 2.0, 3.0])?);
        }
        Ok(prediction)
    }
}

/// Mock implementation of `DrawingSink` for testing.
///
/// Wraps rendered pixels in the overlay and records their sizes.
pub struct MockDrawingSink {
    renders: Arc<Mutex<Vec<(u32, u32)>>>,
    fail: bool,
}

impl MockDrawingSink {
    /// Creates a sink that renders successfully.
    #[must_use]
    pub fn new() -> Self {
        Self {
            renders: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    /// Creates a sink whose every render fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Sizes of every render attempt.
    #[must_use]
    pub fn renders(&self) -> Vec<(u32, u32)> {
        self.renders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockDrawingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingSink for MockDrawingSink {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn render(&self, pixels: &RgbaImage) -> anyhow::Result<Overlay> {
        self.renders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pixels.dimensions());
        if self.fail {
            bail!("mock sink refused to draw");
        }
        Ok(Overlay::new(pixels.clone()))
    }
}

/// Mock implementation of `FrameProvider` for testing.
///
/// Serves a solid-color frame of fixed size and counts reads.
pub struct MockFrameProvider {
    width: u32,
    height: u32,
    color: [u8; 3],
    reads: AtomicUsize,
}

impl MockFrameProvider {
    /// Creates a provider of `width` x `height` mid-gray frames.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: [128, 128, 128],
            reads: AtomicUsize::new(0),
        }
    }

    /// Sets the frame color.
    #[must_use]
    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }

    /// Number of frames served.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl FrameProvider for MockFrameProvider {
    fn current_frame(&self) -> anyhow::Result<DynamicImage> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let frame = RgbImage::from_pixel(self.width, self.height, Rgb(self.color));
        Ok(DynamicImage::ImageRgb8(frame))
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }
}

//! Normalizes raw runtime output into a [`ResultEnvelope`].

use std::fmt;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::domain::{
    ModelOptions, PixelMask, RawOutput, RawPrediction, ResultEnvelope, RENDER_OVERLAY,
    RETURN_TENSORS,
};
use crate::error::{Error, Result};
use crate::ports::DrawingSink;
use crate::resources::ResourceScope;

/// Builds envelopes, optionally rendering mask overlays.
#[derive(Clone, Default)]
pub struct ResultAdapter {
    sink: Option<Arc<dyn DrawingSink>>,
}

impl ResultAdapter {
    /// Creates an adapter. Without a sink envelopes never carry an overlay.
    #[must_use]
    pub fn new(sink: Option<Arc<dyn DrawingSink>>) -> Self {
        Self { sink }
    }

    /// Returns true if a drawing sink was injected.
    #[must_use]
    pub fn can_draw(&self) -> bool {
        self.sink.is_some()
    }

    /// Wraps one prediction.
    ///
    /// The derived tensor escapes through `scope` when `return_tensors` is
    /// set in `params`; otherwise it is tracked by the scope and released
    /// when the scope closes. Overlay failures are logged and leave the
    /// overlay empty.
    pub fn adapt(
        &self,
        prediction: RawPrediction,
        params: &ModelOptions,
        scope: &ResourceScope,
    ) -> ResultEnvelope {
        let RawPrediction { output, derived } = prediction;

        let return_tensors = params.get_bool(RETURN_TENSORS).unwrap_or(false);
        let tensor = derived.and_then(|tensor| {
            if return_tensors {
                Some(scope.keep(&tensor))
            } else {
                scope.track(&tensor);
                None
            }
        });

        let overlay = match (&output, &self.sink) {
            (RawOutput::Mask(mask), Some(sink))
                if params.get_bool(RENDER_OVERLAY).unwrap_or(true) =>
            {
                match mask_to_image(mask).and_then(|pixels| {
                    sink.render(&pixels)
                        .map_err(|e| Error::InvalidMedia(format!("{e:#}")))
                }) {
                    Ok(overlay) => Some(overlay),
                    Err(e) => {
                        warn!("Drawing sink '{}' failed, omitting overlay: {e}", sink.name());
                        None
                    }
                }
            }
            (RawOutput::Mask(_), None) => {
                debug!("No drawing sink; returning mask without overlay");
                None
            }
            _ => None,
        };

        ResultEnvelope::new(output, overlay, tensor)
    }
}

impl fmt::Debug for ResultAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultAdapter")
            .field("sink", &self.sink.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// Converts a float mask into an RGBA image.
///
/// Channel order is preserved and values are rounded and clamped to 0-255.
/// One channel becomes opaque gray, two become gray plus alpha, three become
/// opaque RGB and four are copied as RGBA.
///
/// # Errors
///
/// Returns [`Error::InvalidMedia`] if the channel count is not 1 to 4, the
/// mask is empty, or the data length does not match the dimensions.
pub fn mask_to_image(mask: &PixelMask) -> Result<RgbaImage> {
    let channels = usize::from(mask.channels);
    if !(1..=4).contains(&channels) {
        return Err(Error::InvalidMedia(format!(
            "mask has {channels} channels, expected 1 to 4"
        )));
    }
    if mask.width == 0 || mask.height == 0 {
        return Err(Error::InvalidMedia("mask has zero size".into()));
    }
    let pixels = mask.width as usize * mask.height as usize;
    if mask.data.len() != pixels * channels {
        return Err(Error::InvalidMedia(format!(
            "mask data has {} values, expected {}",
            mask.data.len(),
            pixels * channels
        )));
    }

    let mut image = RgbaImage::new(mask.width, mask.height);
    for (pixel, values) in image.pixels_mut().zip(mask.data.chunks_exact(channels)) {
        *pixel = match *values {
            [v] => {
                let v = to_u8(v);
                Rgba([v, v, v, 255])
            }
            [v, a] => {
                let v = to_u8(v);
                Rgba([v, v, v, to_u8(a)])
            }
            [r, g, b] => Rgba([to_u8(r), to_u8(g), to_u8(b), 255]),
            [r, g, b, a, ..] => Rgba([to_u8(r), to_u8(g), to_u8(b), to_u8(a)]),
            [] => Rgba([0, 0, 0, 0]),
        };
    }
    Ok(image)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(v: f32) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::{Classification, Overlay};
    use crate::resources::ResourcePool;

    struct CountingSink {
        renders: AtomicUsize,
        fail: bool,
    }

    impl CountingSink {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                renders: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl DrawingSink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn render(&self, pixels: &RgbaImage) -> anyhow::Result<Overlay> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("canvas unavailable");
            }
            Ok(Overlay::new(pixels.clone()))
        }
    }

    fn mask() -> PixelMask {
        PixelMask {
            width: 2,
            height: 1,
            channels: 1,
            data: vec![0.0, 255.0],
        }
    }

    #[test]
    fn test_mask_to_image_clamps_instead_of_wrapping() {
        let m = PixelMask {
            width: 3,
            height: 1,
            channels: 3,
            data: vec![300.0, -5.0, 127.6, 256.0, 255.4, 0.4, f32::NAN, 1.0, 2.0],
        };
        let img = mask_to_image(&m).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 0, 128, 255]));
        assert_eq!(img.get_pixel(1, 0), &Rgba([255, 255, 0, 255]));
        assert_eq!(img.get_pixel(2, 0), &Rgba([0, 1, 2, 255]));
    }

    #[test]
    fn test_mask_channel_layouts() {
        let gray_alpha = PixelMask {
            width: 1,
            height: 1,
            channels: 2,
            data: vec![10.0, 20.0],
        };
        let rgba = PixelMask {
            width: 1,
            height: 1,
            channels: 4,
            data: vec![1.0, 2.0, 3.0, 4.0],
        };
        let to = |m: &PixelMask| mask_to_image(m).map(|i| *i.get_pixel(0, 0)).ok();
        assert_eq!(to(&mask()), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(to(&gray_alpha), Some(Rgba([10, 10, 10, 20])));
        assert_eq!(to(&rgba), Some(Rgba([1, 2, 3, 4])));
    }

    #[test]
    fn test_mask_rejects_bad_layout() {
        let mut m = mask();
        m.channels = 5;
        assert!(matches!(mask_to_image(&m), Err(Error::InvalidMedia(_))));

        let mut m = mask();
        m.data.pop();
        assert!(matches!(mask_to_image(&m), Err(Error::InvalidMedia(_))));
    }

    #[test]
    fn test_no_sink_means_no_overlay() {
        let pool = ResourcePool::new();
        let scope = pool.scope();
        let adapter = ResultAdapter::new(None);
        assert!(!adapter.can_draw());

        let envelope = adapter.adapt(
            RawOutput::Mask(mask()).into(),
            &ModelOptions::library_defaults(),
            &scope,
        );
        assert!(envelope.overlay().is_none());
        assert!(matches!(envelope.raw(), RawOutput::Mask(_)));
    }

    #[test]
    fn test_sink_renders_masks_only() {
        let sink = CountingSink::new(false);
        let adapter = ResultAdapter::new(Some(sink.clone()));
        let pool = ResourcePool::new();
        let scope = pool.scope();
        let params = ModelOptions::library_defaults();

        let envelope = adapter.adapt(RawOutput::Mask(mask()).into(), &params, &scope);
        let overlay = envelope.overlay().and_then(Overlay::downcast_ref::<RgbaImage>);
        assert_eq!(overlay.map(|img| img.dimensions()), Some((2, 1)));

        let labels = RawOutput::Classifications(vec![Classification {
            label: "cat".into(),
            confidence: 0.8,
        }]);
        let envelope = adapter.adapt(labels.into(), &params, &scope);
        assert!(envelope.overlay().is_none());
        assert_eq!(sink.renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_sink_omits_overlay() {
        let sink = CountingSink::new(true);
        let adapter = ResultAdapter::new(Some(sink.clone()));
        let pool = ResourcePool::new();
        let scope = pool.scope();

        let envelope = adapter.adapt(
            RawOutput::Mask(mask()).into(),
            &ModelOptions::library_defaults(),
            &scope,
        );
        assert!(envelope.overlay().is_none());
        assert_eq!(sink.renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_render_overlay_off() {
        let sink = CountingSink::new(false);
        let adapter = ResultAdapter::new(Some(sink.clone()));
        let pool = ResourcePool::new();
        let scope = pool.scope();
        let params = ModelOptions::library_defaults().with(RENDER_OVERLAY, false);

        let envelope = adapter.adapt(RawOutput::Mask(mask()).into(), &params, &scope);
        assert!(envelope.overlay().is_none());
        assert_eq!(sink.renders.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_derived_tensor_released_unless_requested() {
        let pool = ResourcePool::new();
        let adapter = ResultAdapter::default();

        let envelope = {
            let scope = pool.scope();
            let derived = pool.tensor(vec![2], vec![0.0, 1.0]).unwrap_or_else(|e| panic!("{e}"));
            let prediction = RawPrediction::from(RawOutput::Mask(mask())).with_tensor(derived);
            adapter.adapt(prediction, &ModelOptions::library_defaults(), &scope)
        };
        assert!(envelope.tensor().is_none());
        assert_eq!(pool.live(), 0);

        let envelope = {
            let scope = pool.scope();
            let derived = pool.tensor(vec![2], vec![0.0, 1.0]).unwrap_or_else(|e| panic!("{e}"));
            let prediction = RawPrediction::from(RawOutput::Mask(mask())).with_tensor(derived);
            let params = ModelOptions::library_defaults().with(RETURN_TENSORS, true);
            adapter.adapt(prediction, &params, &scope)
        };
        assert_eq!(pool.live(), 1);
        assert_eq!(envelope.tensor().map(|t| t.to_vec().ok()), Some(Some(vec![0.0, 1.0])));
        drop(envelope);
        assert_eq!(pool.live(), 0);
    }
}

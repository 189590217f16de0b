//! Raw model outputs, before they are wrapped in an envelope.

use serde::{Deserialize, Serialize};

use crate::resources::Tensor;

/// A named body or face point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Part name, e.g. `"leftWrist"`.
    pub part: String,
    /// Horizontal position in pixels.
    pub x: f32,
    /// Vertical position in pixels.
    pub y: f32,
    /// Detection confidence (0.0 to 1.0).
    pub score: f32,
}

/// A single label with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Class label.
    pub label: String,
    /// Confidence (0.0 to 1.0).
    pub confidence: f32,
}

/// A per-pixel float mask with 1 to 4 interleaved channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelMask {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Channels per pixel.
    pub channels: u8,
    /// Interleaved values, nominally in the 0-255 range.
    pub data: Vec<f32>,
}

/// Domain-specific output of a model.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RawOutput {
    /// Segmentation-style pixel mask.
    Mask(PixelMask),
    /// Pose or landmark points.
    Keypoints(Vec<Keypoint>),
    /// Labels with confidences.
    Classifications(Vec<Classification>),
}

/// What a runtime hands back from one inference step.
#[derive(Debug)]
pub struct RawPrediction {
    /// The domain-specific output.
    pub output: RawOutput,
    /// The tensor the output was derived from, if any.
    ///
    /// It is released with the call's scope unless the caller asked for
    /// tensors to be returned.
    pub derived: Option<Tensor>,
}

impl RawPrediction {
    /// A prediction without a derived tensor.
    #[must_use]
    pub const fn new(output: RawOutput) -> Self {
        Self {
            output,
            derived: None,
        }
    }

    /// Attaches the tensor the output was derived from.
    #[must_use]
    pub fn with_tensor(mut self, tensor: Tensor) -> Self {
        self.derived = Some(tensor);
        self
    }
}

impl From<RawOutput> for RawPrediction {
    fn from(output: RawOutput) -> Self {
        Self::new(output)
    }
}

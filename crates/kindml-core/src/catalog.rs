//! Known model kinds, their default options and model references.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::ModelOptions;

/// A model family kindml ships defaults for.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Multi-person pose estimation.
    PoseNet,
    /// Person segmentation.
    BodyPix,
    /// Image-to-image segmentation.
    UNet,
    /// Face landmark detection.
    FaceMesh,
    /// Image classification (MobileNet).
    ImageClassifier,
    /// Clustering of tabular points.
    KMeans,
    /// Text toxicity classification.
    Toxicity,
}

/// What a model consumes at predict time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// An image, video frame or pixel buffer.
    Media,
    /// A text string.
    Text,
}

impl ModelKind {
    /// Every known kind.
    pub const ALL: [Self; 7] = [
        Self::PoseNet,
        Self::BodyPix,
        Self::UNet,
        Self::FaceMesh,
        Self::ImageClassifier,
        Self::KMeans,
        Self::Toxicity,
    ];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PoseNet => "posenet",
            Self::BodyPix => "bodypix",
            Self::UNet => "unet",
            Self::FaceMesh => "facemesh",
            Self::ImageClassifier => "image_classifier",
            Self::KMeans => "kmeans",
            Self::Toxicity => "toxicity",
        }
    }

    /// Looks a kind up by name, ignoring case. `mobilenet` names the
    /// image classifier.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase().replace('-', "_");
        match name.as_str() {
            "mobilenet" | "imageclassifier" => Some(Self::ImageClassifier),
            other => Self::ALL.into_iter().find(|k| k.name() == other),
        }
    }

    /// Input the model predicts on.
    #[must_use]
    pub const fn input(self) -> InputKind {
        match self {
            Self::Toxicity => InputKind::Text,
            _ => InputKind::Media,
        }
    }

    /// Option key a bare numeric predict argument sets, if any.
    #[must_use]
    pub const fn number_hint(self) -> Option<&'static str> {
        match self {
            Self::ImageClassifier => Some("topk"),
            Self::KMeans => Some("k"),
            Self::FaceMesh => Some("max_faces"),
            Self::PoseNet => Some("max_pose_detections"),
            Self::BodyPix | Self::UNet | Self::Toxicity => None,
        }
    }

    /// Default options for this kind.
    #[must_use]
    pub fn defaults(self) -> ModelOptions {
        match self {
            Self::PoseNet => ModelOptions::new()
                .with("architecture", "MobileNetV1")
                .with("image_scale_factor", 0.3)
                .with("output_stride", 16)
                .with("flip_horizontal", false)
                .with("min_confidence", 0.5)
                .with("max_pose_detections", 5)
                .with("score_threshold", 0.5)
                .with("nms_radius", 20)
                .with("detection_type", "multiple")
                .with("input_resolution", 513)
                .with("multiplier", 0.75)
                .with("quant_bytes", 2),
            Self::BodyPix => ModelOptions::new()
                .with("multiplier", 0.75)
                .with("output_stride", 16)
                .with("segmentation_threshold", 0.5)
                .with("return_tensors", false),
            Self::UNet => ModelOptions::new()
                .with("model_path", "face")
                .with("return_tensors", false),
            Self::FaceMesh => ModelOptions::new()
                .with("flip_horizontal", false)
                .with("max_continuous_checks", 5)
                .with("detection_confidence", 0.9)
                .with("max_faces", 10)
                .with("iou_threshold", 0.3)
                .with("score_threshold", 0.75),
            Self::ImageClassifier => ModelOptions::new()
                .with("version", 2)
                .with("alpha", 1.0)
                .with("topk", 3),
            Self::KMeans => ModelOptions::new()
                .with("k", 3)
                .with("max_iter", 4)
                .with("threshold", 0.5),
            Self::Toxicity => ModelOptions::new().with("threshold", 0.85).with(
                "labels",
                json!([
                    "identity_attack",
                    "insult",
                    "obscene",
                    "severe_toxicity",
                    "sexual_explicit",
                    "threat",
                    "toxicity"
                ]),
            ),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a model's weights come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    /// A known model, resolved by the runtime.
    Catalog(ModelKind),
    /// A local model file or directory.
    Path(PathBuf),
    /// A remote model URL.
    Url(String),
}

impl ModelRef {
    /// The catalog kind, when this reference names one.
    #[must_use]
    pub const fn kind(&self) -> Option<ModelKind> {
        match self {
            Self::Catalog(kind) => Some(*kind),
            Self::Path(_) | Self::Url(_) => None,
        }
    }
}

impl From<ModelKind> for ModelRef {
    fn from(kind: ModelKind) -> Self {
        Self::Catalog(kind)
    }
}

/// Parse error for an empty model reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("empty model reference")]
pub struct EmptyModelRef;

impl FromStr for ModelRef {
    type Err = EmptyModelRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EmptyModelRef);
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(Self::Url(s.to_string()));
        }
        Ok(ModelKind::from_name(s).map_or_else(|| Self::Path(PathBuf::from(s)), Self::Catalog))
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog(kind) => write!(f, "{kind}"),
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

//! Core domain types shared by every model wrapper.

mod envelope;
mod media;
mod options;
mod output;
mod state;

pub use envelope::{Overlay, ResultEnvelope};
pub use media::{FirstFrameNotifier, MediaHandle, MediaKind, PixelBuffer, PredictInput, VideoSource};
pub use options::{ModelOptions, RENDER_OVERLAY, RETURN_TENSORS};
pub use output::{Classification, Keypoint, PixelMask, RawOutput, RawPrediction};
pub use state::ModelState;

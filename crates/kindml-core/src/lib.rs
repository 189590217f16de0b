//! kindml Core - friendly wrappers around pluggable ML runtimes
//!
//! This crate contains the domain types, the ports to the ML runtime, frame
//! sources and drawing backends, and the machinery every model wrapper
//! shares: loose argument resolution, callback-or-future delivery, scoped
//! tensor cleanup and result normalization.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use kindml_core::{call_args, Model, ModelKind, ModelOptions, ModelRuntime};
//! # async fn demo<R: ModelRuntime>(runtime: Arc<R>, image: image::DynamicImage) -> kindml_core::Result<()> {
//! let model = Model::create(runtime, ModelKind::ImageClassifier, call_args![
//!     ModelOptions::new().with("topk", 5),
//! ]);
//! let envelope = model.predict(call_args![image]).await?;
//! println!("{:?}", envelope.raw());
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod catalog;
pub mod domain;
pub mod error;
pub mod inference;
pub mod ports;
pub mod resources;

pub use call::{ArgSeparator, ArgumentKind, CallArg, Callback, CallbackBridge, Field, Pending, ResolvedCall};
pub use catalog::{InputKind, ModelKind, ModelRef};
pub use domain::{
    Classification, FirstFrameNotifier, Keypoint, MediaHandle, MediaKind, ModelOptions, ModelState,
    Overlay, PixelBuffer, PixelMask, PredictInput, RawOutput, RawPrediction, ResultEnvelope,
    VideoSource,
};
pub use error::{Error, Result, RuntimeError};
pub use inference::{Model, ModelBuilder, ResultAdapter};
pub use ports::{DrawingSink, FrameProvider, ModelRuntime};
pub use resources::{ResourcePool, ResourceScope, Tensor};

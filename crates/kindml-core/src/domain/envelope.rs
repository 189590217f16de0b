//! The value every prediction resolves to.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::RawOutput;
use crate::resources::Tensor;

/// A drawable handle produced by a [`DrawingSink`](crate::ports::DrawingSink).
///
/// The concrete type belongs to the sink; callers recover it with
/// [`downcast_ref`](Self::downcast_ref).
#[derive(Clone)]
pub struct Overlay(Arc<dyn Any + Send + Sync>);

impl Overlay {
    /// Wraps a sink-specific drawable.
    pub fn new<T: Any + Send + Sync>(drawable: T) -> Self {
        Self(Arc::new(drawable))
    }

    /// Returns the drawable if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay").finish_non_exhaustive()
    }
}

/// The normalized result of one inference call.
///
/// Built once per call and never modified afterwards. The envelope is owned
/// by the caller, including the escaping tensor when one was requested.
#[derive(Debug)]
pub struct ResultEnvelope {
    raw: RawOutput,
    overlay: Option<Overlay>,
    tensor: Option<Tensor>,
}

impl ResultEnvelope {
    /// Assembles an envelope.
    #[must_use]
    pub const fn new(raw: RawOutput, overlay: Option<Overlay>, tensor: Option<Tensor>) -> Self {
        Self {
            raw,
            overlay,
            tensor,
        }
    }

    /// The domain-specific output.
    #[must_use]
    pub const fn raw(&self) -> &RawOutput {
        &self.raw
    }

    /// The drawable overlay, when a sink rendered one.
    #[must_use]
    pub const fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    /// The escaping tensor, when `return_tensors` was set.
    #[must_use]
    pub const fn tensor(&self) -> Option<&Tensor> {
        self.tensor.as_ref()
    }

    /// Splits the envelope into its parts.
    #[must_use]
    pub fn into_parts(self) -> (RawOutput, Option<Overlay>, Option<Tensor>) {
        (self.raw, self.overlay, self.tensor)
    }
}

//! Error types surfaced through every kindml call.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors delivered through the single error channel of a pending call.
///
/// `Error` is cheap to clone: external failures are shared behind an [`Arc`],
/// so the callback, the awaitable and every waiter of a shared model load
/// all observe the same underlying error object.
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A required call-time value could not be resolved from the arguments.
    #[error("missing argument: {0}")]
    MissingArgument(String),

    /// The resolved media handle cannot be used for inference.
    #[error("invalid media: {0}")]
    InvalidMedia(String),

    /// The external runtime failed to load the model.
    #[error("model load failed: {0}")]
    ModelLoad(#[source] RuntimeError),

    /// The external runtime failed while predicting.
    #[error("inference failed: {0}")]
    Inference(#[source] RuntimeError),

    /// Tensor data does not match its declared shape.
    #[error("shape mismatch: shape {shape:?} needs {expected} values, got {actual}")]
    Shape {
        /// Declared shape.
        shape: Vec<usize>,
        /// Number of elements implied by the shape.
        expected: usize,
        /// Number of elements supplied.
        actual: usize,
    },

    /// A tensor was read after its scope released it.
    #[error("tensor {0} has been released")]
    Released(u64),

    /// The task driving a pending call went away before it settled.
    #[error("operation abandoned before it settled")]
    Abandoned,
}

impl Error {
    /// Returns the runtime error behind a load or inference failure.
    #[must_use]
    pub const fn runtime(&self) -> Option<&RuntimeError> {
        match self {
            Self::ModelLoad(e) | Self::Inference(e) => Some(e),
            _ => None,
        }
    }
}

/// An error raised by the external model runtime, kept exactly as produced.
#[derive(Clone)]
pub struct RuntimeError(Arc<anyhow::Error>);

impl RuntimeError {
    /// Returns the original runtime error.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Attempts to downcast the original error to a concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Returns true when both values wrap the very same error object.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl From<anyhow::Error> for RuntimeError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl fmt::Debug for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let inner: &(dyn std::error::Error + Send + Sync + 'static) = &**self.0;
        inner.source()
    }
}

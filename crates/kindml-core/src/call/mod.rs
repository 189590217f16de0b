//! Call plumbing: argument resolution and result delivery.

mod args;
mod bridge;

pub use args::{classify, separate, ArgSeparator, ArgumentKind, CallArg, Field, ResolvedCall};
pub use bridge::{CallbackBridge, Pending};

use crate::error::{Error, Result};

/// Completion callback invoked once with a borrowed outcome.
pub type Callback<T> = Box<dyn FnOnce(Result<&T, &Error>) + Send + 'static>;

//! Lifecycle states of a model instance.

use serde::Serialize;

/// Where a model instance is in its lifecycle.
///
/// `Uninitialized -> Loading -> Ready <-> Predicting`, with `Error`
/// reachable when the load fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    /// Constructed; nothing fetched yet.
    Uninitialized,
    /// Weights are being fetched.
    Loading,
    /// Accepting predictions.
    Ready,
    /// At least one prediction is running.
    Predicting,
    /// The last load failed; the next call starts a new one.
    Error,
}

impl ModelState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Predicting => "predicting",
            Self::Error => "error",
        }
    }
}

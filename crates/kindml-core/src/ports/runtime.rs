//! Model runtime port.

use async_trait::async_trait;

use crate::catalog::ModelRef;
use crate::domain::{ModelOptions, PredictInput, RawPrediction};
use crate::resources::ResourceScope;

/// Port for the external ML runtime that owns weights and tensor math.
///
/// Both calls are asynchronous and may fail with runtime-specific errors;
/// kindml surfaces those errors unchanged.
#[async_trait]
pub trait ModelRuntime: Send + Sync + 'static {
    /// Loaded model state handed back to [`predict`](Self::predict).
    type Handle: Send + Sync + 'static;

    /// Fetches and initializes a model.
    ///
    /// # Errors
    ///
    /// Returns an error if weights cannot be fetched or parsed.
    async fn load(&self, model: &ModelRef, params: &ModelOptions) -> anyhow::Result<Self::Handle>;

    /// Runs a single inference step.
    ///
    /// Every intermediate tensor should be allocated through `scope`, so it
    /// is released when the call finishes whether it succeeds or not.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    async fn predict(
        &self,
        handle: &Self::Handle,
        input: &PredictInput,
        params: &ModelOptions,
        scope: &ResourceScope,
    ) -> anyhow::Result<RawPrediction>;
}

//! Model instances: shared loading, per-call prediction, dual delivery.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::ResultAdapter;
use crate::call::{ArgSeparator, CallArg, Callback, CallbackBridge, Field, Pending, ResolvedCall};
use crate::catalog::{InputKind, ModelKind, ModelRef};
use crate::domain::{MediaHandle, ModelOptions, ModelState, PredictInput, ResultEnvelope};
use crate::error::{Error, Result, RuntimeError};
use crate::ports::{DrawingSink, ModelRuntime};
use crate::resources::ResourcePool;

type SharedLoad<H> = Shared<BoxFuture<'static, Result<Arc<H>>>>;

enum LoadState<H> {
    Idle,
    Loading(SharedLoad<H>),
    Ready(Arc<H>),
    Failed(Error),
}

/// Configures and creates a [`Model`].
pub struct ModelBuilder<R: ModelRuntime> {
    runtime: Arc<R>,
    model_ref: ModelRef,
    kind: Option<ModelKind>,
    sink: Option<Arc<dyn DrawingSink>>,
    pool: Option<ResourcePool>,
    options: ModelOptions,
}

impl<R: ModelRuntime> ModelBuilder<R> {
    /// Starts a builder for `model_ref` on `runtime`.
    ///
    /// A catalog reference also fixes the model kind. For a path or URL,
    /// set the kind with [`ModelBuilder::kind`].
    #[must_use]
    pub fn new(runtime: Arc<R>, model_ref: impl Into<ModelRef>) -> Self {
        let model_ref = model_ref.into();
        Self {
            runtime,
            kind: model_ref.kind(),
            model_ref,
            sink: None,
            pool: None,
            options: ModelOptions::new(),
        }
    }

    /// Sets which kind of model the weights are, e.g. for a local copy.
    #[must_use]
    pub fn kind(mut self, kind: ModelKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Injects a drawing sink for mask overlays.
    #[must_use]
    pub fn drawing_sink(mut self, sink: Arc<dyn DrawingSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Shares a resource pool, e.g. to observe live tensors from outside.
    #[must_use]
    pub fn resource_pool(mut self, pool: ResourcePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Options layered over the kind defaults, below call-site options.
    #[must_use]
    pub fn options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// Creates the instance and starts loading it.
    ///
    /// Arguments are resolved like predict arguments: media becomes the
    /// default media for later predicts, an options mapping is layered over
    /// the builder's options, a string replaces the model reference, and a
    /// callback receives the ready instance (or the load error).
    ///
    /// A string naming a catalog model switches to that kind. A path or URL
    /// only changes where the weights come from; the kind stays.
    ///
    /// Inside a tokio runtime the load starts immediately. Outside one it
    /// starts on the first [`Model::ready`] or [`Model::predict`], and the
    /// callback fires when that load settles.
    pub fn create(self, args: impl IntoIterator<Item = CallArg<Arc<Model<R>>>>) -> Arc<Model<R>> {
        let ResolvedCall {
            media,
            options,
            callback,
            extra_string,
            ..
        } = ArgSeparator::new().separate(args);

        let (model_ref, kind) = match extra_string.as_deref().map(str::parse::<ModelRef>) {
            Some(Ok(named)) => {
                debug!("Model reference '{named}' overrides '{}'", self.model_ref);
                let kind = named.kind().or(self.kind);
                (named, kind)
            }
            Some(Err(e)) => {
                warn!("Ignoring model name argument: {e}");
                (self.model_ref, self.kind)
            }
            None => (self.model_ref, self.kind),
        };

        let layered =
            ModelOptions::for_kind(kind, std::iter::once(&self.options).chain(options.as_ref()));

        let model = Arc::new(Model {
            runtime: self.runtime,
            model_ref,
            kind,
            options: RwLock::new(layered),
            default_media: media,
            pool: self.pool.unwrap_or_default(),
            adapter: ResultAdapter::new(self.sink),
            load: Mutex::new(LoadState::Idle),
            on_ready: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
        });

        if Handle::try_current().is_ok() {
            let instance = Arc::clone(&model);
            // detached; the callback and `ready()` observe the outcome
            drop(CallbackBridge::run(
                async move { instance.ready().await },
                callback,
            ));
        } else {
            debug!("No tokio runtime; model load deferred until first use");
            *model.on_ready.lock() = callback;
        }

        model
    }
}

impl<R: ModelRuntime> fmt::Debug for ModelBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBuilder")
            .field("model_ref", &self.model_ref)
            .field("kind", &self.kind)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A wrapped model.
///
/// Created synchronously; the load runs in the background and is shared by
/// every caller that needs it. Predictions may overlap and are not
/// serialized: each gets its own merged options and resource scope.
pub struct Model<R: ModelRuntime> {
    runtime: Arc<R>,
    model_ref: ModelRef,
    kind: Option<ModelKind>,
    options: RwLock<ModelOptions>,
    default_media: Option<MediaHandle>,
    pool: ResourcePool,
    adapter: ResultAdapter,
    load: Mutex<LoadState<R::Handle>>,
    on_ready: Mutex<Option<Callback<Arc<Self>>>>,
    in_flight: AtomicUsize,
}

impl<R: ModelRuntime> Model<R> {
    /// Creates a model with default builder settings.
    ///
    /// See [`ModelBuilder::create`].
    pub fn create(
        runtime: Arc<R>,
        model_ref: impl Into<ModelRef>,
        args: impl IntoIterator<Item = CallArg<Arc<Self>>>,
    ) -> Arc<Self> {
        ModelBuilder::new(runtime, model_ref).create(args)
    }

    /// Waits for the model to load and returns this instance.
    ///
    /// Concurrent callers share one load, and every waiter of a failed load
    /// gets the same error. A failure is not sticky: the next call after it
    /// settles starts a fresh load.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelLoad`] if the runtime failed to load the model.
    pub async fn ready(self: &Arc<Self>) -> Result<Arc<Self>> {
        let outcome = self.load_handle().await.map(|_| Arc::clone(self));
        let deferred = self.on_ready.lock().take();
        if let Some(callback) = deferred {
            callback(outcome.as_ref());
        }
        outcome
    }

    /// Runs one prediction.
    ///
    /// Arguments may come in any order: media (falls back to the default
    /// media), an options mapping merged over the instance options for this
    /// call only, a callback, a number for the kind's hint option (e.g.
    /// `topk`), and a string as the input of text models.
    ///
    /// Missing input is rejected before the model is touched. The outcome
    /// is delivered to the callback, if any, and to the returned future.
    pub fn predict(
        self: &Arc<Self>,
        args: impl IntoIterator<Item = CallArg<ResultEnvelope>>,
    ) -> Pending<ResultEnvelope> {
        let separator = ArgSeparator::new().with_default_media(self.default_media.clone());
        let mut call = separator.separate(args);
        let callback = call.callback.take();

        let input = match self.input_kind() {
            InputKind::Media => call
                .require_media(format!("{} predict requires an image or video", self.name()))
                .cloned()
                .map(PredictInput::Media),
            InputKind::Text => call
                .require(Field::ExtraString, format!("{} predict requires text", self.name()))
                .map(|()| PredictInput::Text(call.extra_string.take().unwrap_or_default())),
        };
        let input = match input {
            Ok(input) => input,
            Err(e) => {
                debug!("Rejecting predict: {e}");
                return CallbackBridge::ready(Err(e), callback);
            }
        };

        let overrides = self.call_overrides(&mut call);
        let this = Arc::clone(self);
        CallbackBridge::run(
            async move { this.run_predict(input, overrides).await },
            callback,
        )
    }

    /// Snapshot of the instance options.
    #[must_use]
    pub fn options(&self) -> ModelOptions {
        self.options.read().clone()
    }

    /// Sets an instance option, affecting later predicts.
    pub fn set_option(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.options.write().insert(key, value)
    }

    /// Current lifecycle state.
    ///
    /// `Error` means the last load failed; it lasts until a call retries.
    #[must_use]
    pub fn state(&self) -> ModelState {
        match &*self.load.lock() {
            LoadState::Idle => ModelState::Uninitialized,
            LoadState::Loading(_) => ModelState::Loading,
            LoadState::Failed(_) => ModelState::Error,
            LoadState::Ready(_) if self.in_flight.load(Ordering::SeqCst) > 0 => {
                ModelState::Predicting
            }
            LoadState::Ready(_) => ModelState::Ready,
        }
    }

    /// Media bound at construction, used when a predict supplies none.
    #[must_use]
    pub const fn default_media(&self) -> Option<&MediaHandle> {
        self.default_media.as_ref()
    }

    /// The model this instance loads.
    #[must_use]
    pub const fn model_ref(&self) -> &ModelRef {
        &self.model_ref
    }

    /// Kind of model, when known from the reference or the builder.
    #[must_use]
    pub const fn kind(&self) -> Option<ModelKind> {
        self.kind
    }

    /// Tensors currently alive in this instance's pool.
    #[must_use]
    pub fn live_resources(&self) -> usize {
        self.pool.live()
    }

    fn name(&self) -> String {
        self.model_ref.to_string()
    }

    fn input_kind(&self) -> InputKind {
        self.kind.map_or(InputKind::Media, ModelKind::input)
    }

    /// Per-call options: the mapping argument plus the numeric hint.
    fn call_overrides(&self, call: &mut ResolvedCall<ResultEnvelope>) -> ModelOptions {
        let mut overrides = call.options.take().unwrap_or_default();
        let hint = self.kind.and_then(ModelKind::number_hint);
        match (call.extra_number, hint) {
            (Some(n), Some(key)) if !overrides.contains(key) => {
                overrides.insert(key, hint_value(n));
            }
            (Some(n), None) => debug!("Ignoring numeric argument {n} for {}", self.name()),
            _ => {}
        }
        overrides
    }

    async fn run_predict(
        self: &Arc<Self>,
        input: PredictInput,
        overrides: ModelOptions,
    ) -> Result<ResultEnvelope> {
        // settles a deferred create callback, then hits the cached handle
        self.ready().await?;
        let handle = self.load_handle().await?;
        input.ready().await?;

        let params = self.options.read().merged(&overrides);
        let _in_flight = InFlight::enter(&self.in_flight);
        let scope = self.pool.scope();

        let prediction = self
            .runtime
            .predict(&handle, &input, &params, &scope)
            .await
            .map_err(|e| {
                let e = Error::Inference(RuntimeError::from(e));
                warn!("Prediction failed for {}: {e}", self.name());
                e
            })?;

        let envelope = self.adapter.adapt(prediction, &params, &scope);
        let released = scope.close();
        debug!("Prediction done, released {released} transient tensor(s)");
        Ok(envelope)
    }

    async fn load_handle(&self) -> Result<Arc<R::Handle>> {
        let load = {
            let mut state = self.load.lock();
            let load = match std::mem::replace(&mut *state, LoadState::Idle) {
                LoadState::Idle => self.start_load(),
                LoadState::Failed(e) => {
                    debug!("Retrying load of {} after: {e}", self.name());
                    self.start_load()
                }
                LoadState::Loading(load) => load,
                LoadState::Ready(handle) => {
                    *state = LoadState::Ready(Arc::clone(&handle));
                    return Ok(handle);
                }
            };
            *state = LoadState::Loading(load.clone());
            load
        };

        let outcome = load.clone().await;

        let mut state = self.load.lock();
        // a retry may already have replaced this load
        if matches!(&*state, LoadState::Loading(current) if current.ptr_eq(&load)) {
            *state = match &outcome {
                Ok(handle) => LoadState::Ready(Arc::clone(handle)),
                Err(e) => LoadState::Failed(e.clone()),
            };
        }
        outcome
    }

    fn start_load(&self) -> SharedLoad<R::Handle> {
        let runtime = Arc::clone(&self.runtime);
        let model_ref = self.model_ref.clone();
        let params = self.options();

        async move {
            info!("Loading model {model_ref}");
            let started = Instant::now();
            match runtime.load(&model_ref, &params).await {
                Ok(handle) => {
                    info!("Model {model_ref} loaded in {:?}", started.elapsed());
                    Ok(Arc::new(handle))
                }
                Err(e) => {
                    let e = Error::ModelLoad(RuntimeError::from(e));
                    warn!("{e}");
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl<R: ModelRuntime> fmt::Debug for Model<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("model_ref", &self.model_ref)
            .field("state", &self.state())
            .field("default_media", &self.default_media)
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

/// Counts a running prediction for as long as it lives.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Whole non-negative numbers become integers, e.g. `topk = 5`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hint_value(n: f64) -> Value {
    if n.fract().abs() < f64::EPSILON && (0.0..=f64::from(u32::MAX)).contains(&n) {
        Value::from(n as u64)
    } else {
        Value::from(n)
    }
}

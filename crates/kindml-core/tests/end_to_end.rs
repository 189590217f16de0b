//! End-to-end tests driving `Model` through the mock runtime.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::missing_panics_doc
)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kindml_core::{
    call_args, CallArg, Error, MediaKind, Model, ModelBuilder, ModelKind, ModelOptions, ModelRef,
    ModelState, PixelMask, RawOutput, ResourcePool, ResultEnvelope, RuntimeError,
};
use kindml_test_support::{MaskBuilder, MediaBuilder, MockDrawingSink, MockRuntime};
use tokio::sync::oneshot;

type TestModel = Model<MockRuntime>;

fn on_ready<F>(f: F) -> CallArg<Arc<TestModel>>
where
    F: FnOnce(Result<&Arc<TestModel>, &Error>) + Send + 'static,
{
    CallArg::callback(f)
}

fn on_result<F>(f: F) -> CallArg<ResultEnvelope>
where
    F: FnOnce(Result<&ResultEnvelope, &Error>) + Send + 'static,
{
    CallArg::callback(f)
}

fn label(envelope: &ResultEnvelope) -> String {
    match envelope.raw() {
        RawOutput::Classifications(c) => c[0].label.clone(),
        other => panic!("unexpected output {other:?}"),
    }
}

fn threshold(value: f64) -> ModelOptions {
    ModelOptions::new().with("threshold", value)
}

// === Construction ===

#[tokio::test]
async fn test_create_with_video_then_predict_uses_video() {
    let runtime = Arc::new(MockRuntime::new());
    let video = MediaBuilder::ready_video(32, 24);
    let model = Model::create(
        Arc::clone(&runtime),
        ModelKind::PoseNet,
        call_args![video, threshold(0.3)],
    );

    let envelope = model.predict(call_args![]).await.unwrap();

    assert_eq!(label(&envelope), "32x24");
    let recorded = runtime.recorded();
    assert_eq!(recorded[0].media, Some(MediaKind::VideoFrame));
    assert_eq!(recorded[0].params.get_f64("threshold"), Some(0.3));
    assert_eq!(model.options().get_f64("threshold"), Some(0.3));
}

#[tokio::test]
async fn test_create_returns_instance_before_callback_delivers_it() {
    let runtime = Arc::new(MockRuntime::new().with_load_delay(Duration::from_millis(20)));
    let (tx, rx) = oneshot::channel();

    let model = Model::create(
        runtime,
        ModelKind::BodyPix,
        call_args![
            threshold(0.3),
            on_ready(move |result| {
                let _ = tx.send(result.map(Arc::clone).map_err(Clone::clone));
            }),
        ],
    );
    assert_ne!(model.state(), ModelState::Ready);

    let delivered = rx.await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&delivered, &model));
    assert_eq!(model.state(), ModelState::Ready);
}

#[tokio::test]
async fn test_string_argument_names_the_model() {
    let runtime = Arc::new(MockRuntime::new());
    let model = Model::create(runtime, ModelKind::PoseNet, call_args!["mobilenet"]);

    assert_eq!(model.kind(), Some(ModelKind::ImageClassifier));
    assert_eq!(model.model_ref(), &ModelRef::Catalog(ModelKind::ImageClassifier));
    assert_eq!(model.options().get_u64("topk"), Some(3));
    assert!(model.options().get("nms_radius").is_none());
}

#[tokio::test]
async fn test_path_argument_keeps_the_kind() {
    let runtime = Arc::new(MockRuntime::new());
    let model = Model::create(
        Arc::clone(&runtime),
        ModelKind::Toxicity,
        call_args!["./my/toxicity/model.json"],
    );

    assert_eq!(model.kind(), Some(ModelKind::Toxicity));
    assert_eq!(
        model.model_ref(),
        &ModelRef::Path("./my/toxicity/model.json".into())
    );
    assert_eq!(model.options().get_f64("threshold"), Some(0.85));

    let envelope = model.predict(call_args!["you are great"]).await.unwrap();
    assert_eq!(label(&envelope), "you are great");

    assert_eq!(runtime.recorded()[0].text.as_deref(), Some("you are great"));
}

#[tokio::test]
async fn test_builder_kind_for_local_weights() {
    let runtime = Arc::new(MockRuntime::new());
    let url = ModelRef::Url("https://models.test/mobilenet.json".into());
    let model = ModelBuilder::new(Arc::clone(&runtime), url)
        .kind(ModelKind::ImageClassifier)
        .create(call_args![]);

    assert_eq!(model.kind(), Some(ModelKind::ImageClassifier));
    model.predict(call_args![MediaBuilder::still(2, 2), 7]).await.unwrap();
    assert_eq!(runtime.recorded()[0].params.get_u64("topk"), Some(7));
    assert_eq!(model.options().get_u64("topk"), Some(3));
}

#[tokio::test]
async fn test_option_layers() {
    let runtime = Arc::new(MockRuntime::new());
    let model = ModelBuilder::new(runtime, ModelKind::PoseNet)
        .options(ModelOptions::new().with("min_confidence", 0.2).with("flip_horizontal", true))
        .create(call_args![ModelOptions::new().with("min_confidence", 0.7)]);

    let options = model.options();
    assert_eq!(options.get_f64("min_confidence"), Some(0.7));
    assert_eq!(options.get_bool("flip_horizontal"), Some(true));
    assert_eq!(options.get_u64("output_stride"), Some(16));
    assert_eq!(options.get_bool("return_tensors"), Some(false));
    assert_eq!(options.get_bool("render_overlay"), Some(true));
}

// === Loading ===

#[tokio::test]
async fn test_concurrent_waiters_share_one_load() {
    let runtime = Arc::new(MockRuntime::new().with_load_delay(Duration::from_millis(30)));
    let model = Model::create(Arc::clone(&runtime), ModelKind::FaceMesh, call_args![]);

    tokio::task::yield_now().await;
    assert_eq!(model.state(), ModelState::Loading);

    let waiters: Vec<_> = (0..5).map(|_| model.ready()).collect();
    let outcomes = futures::future::join_all(waiters).await;

    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(runtime.load_calls(), 1);
    assert_eq!(model.state(), ModelState::Ready);

    model.predict(call_args![MediaBuilder::still(4, 4)]).await.unwrap();
    assert_eq!(runtime.load_calls(), 1);
}

#[tokio::test]
async fn test_failed_load_reaches_every_waiter_with_the_same_error() {
    let runtime = Arc::new(
        MockRuntime::new()
            .with_load_delay(Duration::from_millis(10))
            .failing_load("weights missing"),
    );
    let model = Model::create(Arc::clone(&runtime), ModelKind::UNet, call_args![]);

    let (a, b) = tokio::join!(model.ready(), model.ready());
    let a = a.unwrap_err();
    let b = b.unwrap_err();
    assert!(matches!(a, Error::ModelLoad(_)));
    assert!(RuntimeError::ptr_eq(a.runtime().unwrap(), b.runtime().unwrap()));
    assert_eq!(model.state(), ModelState::Error);

    assert_eq!(runtime.load_calls(), 1);

    // a later call retries instead of replaying the old failure
    let later = model
        .predict(call_args![MediaBuilder::still(2, 2)])
        .await
        .unwrap_err();
    assert!(matches!(later, Error::ModelLoad(_)));
    assert!(!RuntimeError::ptr_eq(a.runtime().unwrap(), later.runtime().unwrap()));
    assert_eq!(runtime.load_calls(), 2);
    assert_eq!(runtime.predict_calls(), 0);
    assert!(a.to_string().contains("weights missing"));
}

#[tokio::test]
async fn test_load_retried_after_failure() {
    let runtime = Arc::new(MockRuntime::new().failing_first_loads(1, "network blip"));
    let model = Model::create(Arc::clone(&runtime), ModelKind::PoseNet, call_args![]);

    let err = model.ready().await.unwrap_err();
    assert!(err.to_string().contains("network blip"));
    assert_eq!(model.state(), ModelState::Error);

    let envelope = model
        .predict(call_args![MediaBuilder::still(3, 3)])
        .await
        .unwrap();
    assert_eq!(label(&envelope), "3x3");
    assert_eq!(runtime.load_calls(), 2);
    assert_eq!(model.state(), ModelState::Ready);

    model.ready().await.unwrap();
    assert_eq!(runtime.load_calls(), 2);
}

#[test]
fn test_create_outside_runtime_defers_load_and_callback() {
    let runtime = Arc::new(MockRuntime::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    let model = Model::create(
        Arc::clone(&runtime),
        ModelKind::KMeans,
        call_args![on_ready(move |result| {
            assert!(result.is_ok());
            counter.fetch_add(1, Ordering::SeqCst);
        })],
    );
    assert_eq!(model.state(), ModelState::Uninitialized);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    futures::executor::block_on(model.ready()).unwrap();
    futures::executor::block_on(model.ready()).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.load_calls(), 1);
}

// === Prediction ===

#[tokio::test]
async fn test_overlapping_predicts_resolve_independently() {
    let runtime = Arc::new(MockRuntime::new().with_predict_delay(Duration::from_millis(20)));
    let model = Model::create(Arc::clone(&runtime), ModelKind::ImageClassifier, call_args![]);
    model.ready().await.unwrap();

    let first = model.predict(call_args![MediaBuilder::still(10, 10), threshold(0.1)]);
    let second = model.predict(call_args![threshold(0.9), MediaBuilder::still(20, 5)]);
    tokio::task::yield_now().await;
    assert_eq!(model.state(), ModelState::Predicting);

    let (first, second) = tokio::join!(first, second);
    assert_eq!(label(&first.unwrap()), "10x10");
    assert_eq!(label(&second.unwrap()), "20x5");
    assert_eq!(runtime.max_concurrent_predicts(), 2);
    assert_eq!(model.state(), ModelState::Ready);

    let mut seen: Vec<f64> = runtime
        .recorded()
        .iter()
        .filter_map(|r| r.params.get_f64("threshold"))
        .collect();
    seen.sort_by(f64::total_cmp);
    assert_eq!(seen, vec![0.1, 0.9]);
    assert!(model.options().get("threshold").is_none());
}

#[tokio::test]
async fn test_still_image_predict_does_not_wait_for_default_video() {
    let runtime = Arc::new(MockRuntime::new());
    let (video, _first_frame) = MediaBuilder::pending_video(64, 64);
    let model = Model::create(Arc::clone(&runtime), ModelKind::PoseNet, call_args![video]);

    let envelope = tokio::time::timeout(
        Duration::from_secs(1),
        model.predict(call_args![MediaBuilder::still(8, 6)]),
    )
    .await
    .expect("predict on a still image must not wait for the video")
    .unwrap();

    assert_eq!(label(&envelope), "8x6");
    assert_eq!(runtime.recorded()[0].media, Some(MediaKind::StillImage));
}

#[tokio::test]
async fn test_predict_on_video_waits_for_first_frame() {
    let runtime = Arc::new(MockRuntime::new());
    let (video, first_frame) = MediaBuilder::pending_video(16, 9);
    let model = Model::create(Arc::clone(&runtime), ModelKind::PoseNet, call_args![video]);

    let pending = model.predict(call_args![]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(runtime.predict_calls(), 0);

    first_frame.notify();
    let envelope = pending.await.unwrap();
    assert_eq!(label(&envelope), "16x9");
}

#[tokio::test]
async fn test_video_closed_before_first_frame_is_invalid_media() {
    let runtime = Arc::new(MockRuntime::new());
    let (video, first_frame) = MediaBuilder::pending_video(16, 9);
    let model = Model::create(Arc::clone(&runtime), ModelKind::PoseNet, call_args![video]);

    let pending = model.predict(call_args![]);
    drop(first_frame);

    assert!(matches!(pending.await, Err(Error::InvalidMedia(_))));
    assert_eq!(runtime.predict_calls(), 0);
}

#[tokio::test]
async fn test_missing_media_rejects_before_runtime() {
    let runtime = Arc::new(MockRuntime::new());
    let model = Model::create(Arc::clone(&runtime), ModelKind::BodyPix, call_args![]);

    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    let err = model
        .predict(call_args![
            threshold(0.5),
            on_result(move |result| {
                *slot.lock().unwrap() = result.err().cloned();
            }),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingArgument(_)));
    assert!(matches!(*seen.lock().unwrap(), Some(Error::MissingArgument(_))));
    assert_eq!(runtime.predict_calls(), 0);
}

#[tokio::test]
async fn test_text_model_takes_string_input() {
    let runtime = Arc::new(MockRuntime::new());
    let model = Model::create(Arc::clone(&runtime), ModelKind::Toxicity, call_args![]);

    let envelope = model.predict(call_args!["you are great"]).await.unwrap();
    assert_eq!(label(&envelope), "you are great");
    assert_eq!(runtime.recorded()[0].text.as_deref(), Some("you are great"));
    assert_eq!(runtime.recorded()[0].params.get_f64("threshold"), Some(0.85));

    let err = model
        .predict(call_args![MediaBuilder::still(2, 2)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingArgument(_)));
}

#[tokio::test]
async fn test_number_argument_sets_kind_hint() {
    let runtime = Arc::new(MockRuntime::new());
    let model = Model::create(Arc::clone(&runtime), ModelKind::ImageClassifier, call_args![]);

    model.predict(call_args![MediaBuilder::still(2, 2), 5]).await.unwrap();
    model
        .predict(call_args![5, ModelOptions::new().with("topk", 2), MediaBuilder::still(2, 2)])
        .await
        .unwrap();

    let recorded = runtime.recorded();
    assert_eq!(recorded[0].params.get_u64("topk"), Some(5));
    assert_eq!(recorded[1].params.get_u64("topk"), Some(2));
    assert_eq!(model.options().get_u64("topk"), Some(3));
}

#[tokio::test]
async fn test_set_option_affects_later_predicts() {
    let runtime = Arc::new(MockRuntime::new());
    let model = Model::create(Arc::clone(&runtime), ModelKind::KMeans, call_args![]);

    model.set_option("max_iter", 10);
    model.predict(call_args![MediaBuilder::still(2, 2)]).await.unwrap();
    assert_eq!(runtime.recorded()[0].params.get_u64("max_iter"), Some(10));
}

// === Delivery ===

#[tokio::test]
async fn test_callback_sees_the_value_the_future_yields() {
    let runtime = Arc::new(MockRuntime::new());
    let model = Model::create(runtime, ModelKind::PoseNet, call_args![]);

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(String::new()));
    let (counter, slot) = (Arc::clone(&calls), Arc::clone(&seen));

    let envelope = model
        .predict(call_args![
            on_result(move |result| {
                counter.fetch_add(1, Ordering::SeqCst);
                *slot.lock().unwrap() = label(result.unwrap());
            }),
            MediaBuilder::still(3, 7),
        ])
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), label(&envelope));
}

#[tokio::test]
async fn test_inference_failure_is_the_same_error_on_both_paths() {
    let runtime = Arc::new(MockRuntime::new().failing_predict("out of memory"));
    let model = Model::create(runtime, ModelKind::BodyPix, call_args![]);

    let from_callback = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&from_callback);
    let awaited = model
        .predict(call_args![
            MediaBuilder::still(4, 4),
            on_result(move |result| {
                *slot.lock().unwrap() = result.err().cloned();
            }),
        ])
        .await
        .unwrap_err();

    let called = from_callback.lock().unwrap().clone().unwrap();
    assert!(matches!(awaited, Error::Inference(_)));
    assert!(RuntimeError::ptr_eq(
        awaited.runtime().unwrap(),
        called.runtime().unwrap()
    ));
    assert_eq!(model.state(), ModelState::Ready);
}

#[tokio::test]
async fn test_failed_predict_does_not_block_the_next() {
    let runtime = Arc::new(MockRuntime::new().failing_first_predicts(1, "transient"));
    let model = Model::create(Arc::clone(&runtime), ModelKind::ImageClassifier, call_args![]);

    let err = model
        .predict(call_args![MediaBuilder::still(4, 4)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(_)));

    let envelope = model
        .predict(call_args![MediaBuilder::still(6, 2)])
        .await
        .unwrap();
    assert_eq!(label(&envelope), "6x2");
    assert_eq!(runtime.predict_calls(), 2);
    assert_eq!(runtime.load_calls(), 1);
    assert_eq!(model.state(), ModelState::Ready);
}

#[tokio::test]
async fn test_dropped_future_still_runs_callback() {
    let runtime = Arc::new(MockRuntime::new());
    let model = Model::create(Arc::clone(&runtime), ModelKind::PoseNet, call_args![]);
    let (tx, rx) = oneshot::channel();

    drop(model.predict(call_args![
        MediaBuilder::still(5, 5),
        on_result(move |result| {
            let _ = tx.send(result.map(label).map_err(Clone::clone));
        }),
    ]));

    assert_eq!(rx.await.unwrap().unwrap(), "5x5");
}

// === Resources ===

#[tokio::test]
async fn test_transient_tensors_released_after_success_and_failure() {
    let pool = ResourcePool::new();

    let ok_runtime = Arc::new(MockRuntime::new().with_transient_tensors(3).with_derived_tensor());
    let model = ModelBuilder::new(ok_runtime, ModelKind::BodyPix)
        .resource_pool(pool.clone())
        .create(call_args![]);
    let envelope = model.predict(call_args![MediaBuilder::still(4, 4)]).await.unwrap();
    assert!(envelope.tensor().is_none());
    assert_eq!(pool.live(), 0);
    assert_eq!(model.live_resources(), 0);

    let failing = Arc::new(
        MockRuntime::new()
            .with_transient_tensors(3)
            .failing_predict("kernel panic"),
    );
    let model = ModelBuilder::new(failing, ModelKind::BodyPix)
        .resource_pool(pool.clone())
        .create(call_args![]);
    assert!(model.predict(call_args![MediaBuilder::still(4, 4)]).await.is_err());
    assert_eq!(pool.live(), 0);
}

#[tokio::test]
async fn test_return_tensors_hands_derived_tensor_to_caller() {
    let pool = ResourcePool::new();
    let runtime = Arc::new(MockRuntime::new().with_transient_tensors(2).with_derived_tensor());
    let model = ModelBuilder::new(runtime, ModelKind::UNet)
        .resource_pool(pool.clone())
        .create(call_args![]);

    let envelope = model
        .predict(call_args![
            MediaBuilder::still(4, 4),
            ModelOptions::new().with("return_tensors", true),
        ])
        .await
        .unwrap();

    assert_eq!(pool.live(), 1);
    let tensor = envelope.tensor().unwrap();
    assert_eq!(tensor.shape(), &[1, 3]);
    assert_eq!(tensor.to_vec().unwrap(), vec![1.0, 2.0, 3.0]);

    drop(envelope);
    assert_eq!(pool.live(), 0);
}

#[tokio::test]
async fn test_overlapping_predicts_keep_their_own_tensors() {
    let pool = ResourcePool::new();
    let runtime = Arc::new(
        MockRuntime::new()
            .with_transient_tensors(3)
            .with_derived_tensor()
            .with_predict_delay(Duration::from_millis(20)),
    );
    let model = ModelBuilder::new(Arc::clone(&runtime), ModelKind::BodyPix)
        .resource_pool(pool.clone())
        .create(call_args![]);
    model.ready().await.unwrap();

    let kept = model.predict(call_args![
        MediaBuilder::still(4, 4),
        ModelOptions::new().with("return_tensors", true),
    ]);
    let plain = model.predict(call_args![MediaBuilder::still(8, 8)]);
    tokio::task::yield_now().await;

    let (kept, plain) = tokio::join!(kept, plain);
    let (kept, plain) = (kept.unwrap(), plain.unwrap());
    assert_eq!(runtime.max_concurrent_predicts(), 2);

    assert_eq!(pool.live(), 1);
    let tensor = kept.tensor().unwrap();
    assert!(!tensor.is_released());
    assert_eq!(tensor.to_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    assert!(plain.tensor().is_none());

    drop(kept);
    assert_eq!(pool.live(), 0);
}

// === Overlays ===

#[tokio::test]
async fn test_mask_overlay_only_with_sink() {
    let mask: PixelMask = MaskBuilder::horizontal_gradient(6, 2);
    let runtime = Arc::new(MockRuntime::new().with_output(RawOutput::Mask(mask)));

    let plain = Model::create(Arc::clone(&runtime), ModelKind::BodyPix, call_args![]);
    let envelope = plain.predict(call_args![MediaBuilder::still(6, 2)]).await.unwrap();
    assert!(envelope.overlay().is_none());
    assert!(matches!(envelope.raw(), RawOutput::Mask(_)));

    let sink = Arc::new(MockDrawingSink::new());
    let drawing = ModelBuilder::new(Arc::clone(&runtime), ModelKind::BodyPix)
        .drawing_sink(sink.clone())
        .create(call_args![]);
    let envelope = drawing.predict(call_args![MediaBuilder::still(6, 2)]).await.unwrap();
    assert!(envelope.overlay().is_some());
    assert_eq!(sink.renders(), vec![(6, 2)]);

    let failing = ModelBuilder::new(runtime, ModelKind::BodyPix)
        .drawing_sink(Arc::new(MockDrawingSink::failing()))
        .create(call_args![]);
    let envelope = failing.predict(call_args![MediaBuilder::still(6, 2)]).await.unwrap();
    assert!(envelope.overlay().is_none());
}

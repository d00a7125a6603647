//! Capture session binder behaviour against a fake provider.

mod common;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use common::{counting_slot, gated_slot, within, CountingSurface, FakeProvider};
use facecam::camera::{
    CameraProvider, DeviceMap, LensFacing, Lifecycle, Outputs, PreviewOutput, ProviderSlot,
    ZoomRatio,
};
use facecam::errors::BindError;
use facecam::session::{BindRequest, BinderState, CaptureSessionBinder};

fn request(lens: LensFacing, zoom: f32) -> BindRequest {
    BindRequest {
        lens,
        zoom: ZoomRatio::clamped(zoom),
    }
}

fn started() -> Lifecycle {
    let lifecycle = Lifecycle::new();
    lifecycle.start();
    lifecycle
}

fn binder_with(slot: Arc<ProviderSlot>) -> Arc<CaptureSessionBinder> {
    Arc::new(CaptureSessionBinder::new(
        slot,
        DeviceMap::default(),
        Arc::new(CountingSurface::default()),
    ))
}

#[tokio::test]
async fn test_bind_wires_preview_and_applies_zoom() {
    let provider = FakeProvider::new();
    let binder = binder_with(counting_slot(provider.clone()));
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    let session = binder
        .bind(request(LensFacing::Back, 2.0), &lifecycle, &outputs)
        .await
        .unwrap();

    assert_eq!(session.lens, LensFacing::Back);
    assert_eq!(session.zoom.value(), 2.0);
    assert_eq!(session.camera.index, 1);
    assert_eq!(outputs.preview.wired_generation(), Some(session.generation));
    assert_eq!(provider.bound_count(&lifecycle), 1);
    assert_eq!(binder.state(), BinderState::Bound);
    assert!(binder.is_streaming().await);
}

#[tokio::test]
async fn test_sequential_rebinds_leave_one_session() {
    let provider = FakeProvider::new();
    let binder = binder_with(counting_slot(provider.clone()));
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    let changes = [
        (LensFacing::Front, 1.0),
        (LensFacing::Back, 1.0),
        (LensFacing::Back, 2.5),
        (LensFacing::Front, 3.0),
    ];
    for (lens, zoom) in changes {
        binder
            .bind(request(lens, zoom), &lifecycle, &outputs)
            .await
            .unwrap();
        assert_eq!(provider.bound_count(&lifecycle), 1);
    }

    let active = binder.active_session().await.unwrap();
    assert_eq!(active.lens, LensFacing::Front);
    assert_eq!(active.zoom.value(), 3.0);
}

#[tokio::test]
async fn test_concurrent_requests_settle_on_newest() {
    let provider = FakeProvider::new();
    let binder = binder_with(counting_slot(provider.clone()));
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    let mut tasks = Vec::new();
    let mut last = 0;
    for i in 0..10 {
        let lens = if i % 2 == 0 {
            LensFacing::Front
        } else {
            LensFacing::Back
        };
        let generation = binder.next_generation();
        last = generation;
        let binder = binder.clone();
        let lifecycle = lifecycle.clone();
        let outputs = outputs.clone();
        let req = request(lens, 1.0 + 0.2 * i as f32);
        tasks.push(tokio::spawn(async move {
            binder
                .bind_generation(generation, req, &lifecycle, &outputs)
                .await
        }));
    }
    for task in tasks {
        let _ = within(task).await.unwrap();
    }

    assert_eq!(provider.bound_generations(&lifecycle), vec![last]);
    assert_eq!(outputs.preview.wired_generation(), Some(last));
    let active = binder.active_session().await.unwrap();
    assert_eq!(active.generation, last);
    assert_eq!(active.lens, LensFacing::Back);
}

#[tokio::test]
async fn test_late_request_wins_while_provider_pending() {
    let provider = FakeProvider::new();
    let (slot, release) = gated_slot(provider.clone());
    let binder = binder_with(slot);
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    let back = binder.next_generation();
    let front = binder.next_generation();

    let spawn_bind = |generation, req| {
        let binder = binder.clone();
        let lifecycle = lifecycle.clone();
        let outputs = outputs.clone();
        tokio::spawn(async move {
            binder
                .bind_generation(generation, req, &lifecycle, &outputs)
                .await
        })
    };
    let back_task = spawn_bind(back, request(LensFacing::Back, 1.0));
    let front_task = spawn_bind(front, request(LensFacing::Front, 2.5));

    tokio::task::yield_now().await;
    assert_eq!(provider.bind_calls(), 0);
    release();

    let back_result = within(back_task).await.unwrap();
    let front_result = within(front_task).await.unwrap();

    assert_eq!(back_result, Err(BindError::Superseded(back)));
    let session = front_result.unwrap();
    assert_eq!(session.lens, LensFacing::Front);
    assert_eq!(session.zoom.value(), 2.5);

    assert_eq!(provider.bind_calls(), 1);
    assert_eq!(provider.bound_generations(&lifecycle), vec![front]);
    assert_eq!(outputs.preview.wired_generation(), Some(front));
}

#[tokio::test]
async fn test_bind_overtaken_mid_bind_releases_its_session() {
    let provider = FakeProvider::new();
    let binder = binder_with(counting_slot(provider.clone()));
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    let racing = binder.clone();
    provider.set_on_bind(move |_| {
        racing.next_generation();
    });

    let result = binder
        .bind(request(LensFacing::Back, 1.0), &lifecycle, &outputs)
        .await;
    assert!(matches!(result, Err(BindError::Superseded(_))));
    assert_eq!(provider.bound_count(&lifecycle), 0);
    assert_eq!(outputs.preview.wired_generation(), None);
    assert!(binder.active_session().await.is_none());

    provider.clear_on_bind();
    let session = binder
        .bind(request(LensFacing::Front, 1.0), &lifecycle, &outputs)
        .await
        .unwrap();
    assert_eq!(provider.bound_generations(&lifecycle), vec![session.generation]);
}

#[tokio::test]
async fn test_provider_acquired_once() {
    let provider = FakeProvider::new();
    let slot = counting_slot(provider.clone());
    let binder = binder_with(slot.clone());
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    for _ in 0..5 {
        binder
            .bind(request(LensFacing::Front, 1.0), &lifecycle, &outputs)
            .await
            .unwrap();
    }
    assert_eq!(slot.attempts(), 1);
    assert_eq!(provider.bind_calls(), 5);
}

#[tokio::test]
async fn test_failed_acquisition_is_retried() {
    let provider = FakeProvider::new();
    let calls = Arc::new(AtomicU64::new(0));
    let factory_calls = calls.clone();
    let factory_provider = provider.clone();
    let slot = Arc::new(ProviderSlot::new(move || {
        let attempt = factory_calls.fetch_add(1, Ordering::SeqCst);
        let provider: Arc<dyn CameraProvider> = factory_provider.clone();
        async move {
            if attempt == 0 {
                Err(BindError::ProviderUnavailable("camera service starting".into()))
            } else {
                Ok(provider)
            }
        }
    }));
    let binder = binder_with(slot.clone());
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    let first = binder
        .bind(request(LensFacing::Front, 1.0), &lifecycle, &outputs)
        .await;
    assert!(matches!(first, Err(BindError::ProviderUnavailable(_))));
    assert_eq!(binder.state(), BinderState::Unbound);

    binder
        .bind(request(LensFacing::Front, 1.0), &lifecycle, &outputs)
        .await
        .unwrap();
    assert_eq!(slot.attempts(), 2);
    assert_eq!(provider.bound_count(&lifecycle), 1);
}

#[tokio::test]
async fn test_inactive_lifecycle_rejects_bind() {
    let provider = FakeProvider::new();
    let binder = binder_with(counting_slot(provider.clone()));
    let lifecycle = Lifecycle::new();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    let result = binder
        .bind(request(LensFacing::Front, 1.0), &lifecycle, &outputs)
        .await;
    assert_eq!(result, Err(BindError::LifecycleInactive));
    assert_eq!(provider.bind_calls(), 0);
}

#[tokio::test]
async fn test_permission_denied_leaves_nothing_bound() {
    let provider = FakeProvider::new();
    let binder = binder_with(counting_slot(provider.clone()));
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    binder
        .bind(request(LensFacing::Front, 1.0), &lifecycle, &outputs)
        .await
        .unwrap();
    provider.fail_next(BindError::PermissionDenied);

    let result = binder
        .bind(request(LensFacing::Back, 1.0), &lifecycle, &outputs)
        .await;
    assert_eq!(result, Err(BindError::PermissionDenied));
    assert_eq!(provider.bound_count(&lifecycle), 0);
    assert_eq!(outputs.preview.wired_generation(), None);
    assert_eq!(binder.state(), BinderState::Unbound);
}

#[tokio::test]
async fn test_refused_access_keeps_current_session() {
    let provider = FakeProvider::new();
    let binder = binder_with(counting_slot(provider.clone()));
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    let front = binder
        .bind(request(LensFacing::Front, 1.0), &lifecycle, &outputs)
        .await
        .unwrap();
    provider.deny_access(true);

    let result = binder
        .bind(request(LensFacing::Back, 1.0), &lifecycle, &outputs)
        .await;
    assert_eq!(result, Err(BindError::PermissionDenied));
    assert_eq!(provider.bind_calls(), 1);
    assert_eq!(provider.bound_generations(&lifecycle), vec![front.generation]);
    assert_eq!(outputs.preview.wired_generation(), Some(front.generation));
    assert_eq!(binder.state(), BinderState::Bound);

    provider.deny_access(false);
    let back = binder
        .bind(request(LensFacing::Back, 1.0), &lifecycle, &outputs)
        .await
        .unwrap();
    assert_eq!(provider.bound_generations(&lifecycle), vec![back.generation]);
}

#[tokio::test]
async fn test_slow_provider_does_not_stall_the_runtime() {
    let provider = FakeProvider::new();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let released = Arc::new(AtomicBool::new(false));
    let seen = released.clone();
    // Holds the bind until this test's task, on the same single-threaded
    // runtime, gets to run and let it go.
    provider.set_on_bind(move |_| {
        let ok = release_rx
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(2))
            .is_ok();
        seen.store(ok, Ordering::SeqCst);
    });
    let binder = binder_with(counting_slot(provider.clone()));
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    let task = {
        let binder = binder.clone();
        let lifecycle = lifecycle.clone();
        let outputs = outputs.clone();
        tokio::spawn(async move {
            binder
                .bind(request(LensFacing::Front, 1.0), &lifecycle, &outputs)
                .await
        })
    };

    while provider.bind_calls() == 0 {
        tokio::task::yield_now().await;
    }
    release_tx.send(()).unwrap();

    within(task).await.unwrap().unwrap();
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(provider.bound_count(&lifecycle), 1);
}

#[tokio::test]
async fn test_missing_lens_reports_no_matching_camera() {
    let provider = FakeProvider::new();
    let binder = Arc::new(CaptureSessionBinder::new(
        counting_slot(provider.clone()),
        DeviceMap::default(),
        Arc::new(CountingSurface::default()),
    ));
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    // The fake reports facing for both cameras, so both lenses bind.
    assert!(binder
        .bind(request(LensFacing::Back, 1.0), &lifecycle, &outputs)
        .await
        .is_ok());
    provider.fail_next(BindError::NoMatchingCamera(LensFacing::Back));
    assert_eq!(
        binder
            .bind(request(LensFacing::Back, 1.0), &lifecycle, &outputs)
            .await,
        Err(BindError::NoMatchingCamera(LensFacing::Back))
    );
}

#[tokio::test]
async fn test_unbind_releases_everything() {
    let provider = FakeProvider::new();
    let binder = binder_with(counting_slot(provider.clone()));
    let lifecycle = started();
    let outputs = Outputs::preview_only(PreviewOutput::new());

    binder
        .bind(request(LensFacing::Front, 1.0), &lifecycle, &outputs)
        .await
        .unwrap();
    binder.unbind(&lifecycle, &outputs).await;

    assert_eq!(provider.bound_count(&lifecycle), 0);
    assert_eq!(outputs.preview.wired_generation(), None);
    assert!(binder.active_session().await.is_none());
    assert_eq!(binder.state(), BinderState::Unbound);
}

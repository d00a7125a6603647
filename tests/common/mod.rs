//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use facecam::camera::{
    BoundCamera, CameraError, CameraInfo, CameraProvider, FrameImage, LensFacing, LensSelector,
    Lifecycle, Outputs, PreviewSurface, ProviderSlot, ZoomRatio,
};
use facecam::errors::{BindError, TorchError};
use facecam::torch::TorchService;

pub fn camera(index: u32, facing: LensFacing) -> CameraInfo {
    CameraInfo {
        index,
        name: format!("{} camera", facing),
        description: "fake".to_string(),
        facing: Some(facing),
    }
}

type BindHook = Box<dyn Fn(u64) + Send + Sync>;

/// Provider that records binds instead of opening hardware.
#[derive(Default)]
pub struct FakeProvider {
    bound: Mutex<HashMap<u64, Vec<(u64, Arc<AtomicBool>)>>>,
    bind_calls: AtomicU64,
    fail_next: Mutex<Option<BindError>>,
    on_bind: Mutex<Option<BindHook>>,
    access_denied: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bound_count(&self, lifecycle: &Lifecycle) -> usize {
        self.bound
            .lock()
            .unwrap()
            .get(&lifecycle.id())
            .map_or(0, Vec::len)
    }

    /// Generations of the sessions currently bound to `lifecycle`.
    pub fn bound_generations(&self, lifecycle: &Lifecycle) -> Vec<u64> {
        self.bound
            .lock()
            .unwrap()
            .get(&lifecycle.id())
            .map(|v| v.iter().map(|(g, _)| *g).collect())
            .unwrap_or_default()
    }

    pub fn bind_calls(&self) -> u64 {
        self.bind_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, error: BindError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// Run `hook` with the generation inside every bind.
    pub fn set_on_bind(&self, hook: impl Fn(u64) + Send + Sync + 'static) {
        *self.on_bind.lock().unwrap() = Some(Box::new(hook));
    }

    /// Make the access check refuse (or allow) every camera.
    pub fn deny_access(&self, denied: bool) {
        self.access_denied.store(denied, Ordering::SeqCst);
    }

    pub fn clear_on_bind(&self) {
        *self.on_bind.lock().unwrap() = None;
    }
}

impl CameraProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn cameras(&self) -> Result<Vec<CameraInfo>, CameraError> {
        Ok(vec![
            camera(0, LensFacing::Front),
            camera(1, LensFacing::Back),
        ])
    }

    fn unbind_all(&self, lifecycle: &Lifecycle) {
        if let Some(sessions) = self.bound.lock().unwrap().remove(&lifecycle.id()) {
            for (_, running) in sessions {
                running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn check_access(&self, _selector: &LensSelector) -> Result<(), BindError> {
        if self.access_denied.load(Ordering::SeqCst) {
            return Err(BindError::PermissionDenied);
        }
        Ok(())
    }

    fn bind_to_lifecycle(
        &self,
        lifecycle: &Lifecycle,
        selector: &LensSelector,
        _outputs: &Outputs,
        generation: u64,
    ) -> Result<Box<dyn BoundCamera>, BindError> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        let cameras = self.cameras().unwrap();
        let info = selector
            .select(&cameras)
            .cloned()
            .ok_or(BindError::NoMatchingCamera(selector.facing))?;

        let running = Arc::new(AtomicBool::new(true));
        self.bound
            .lock()
            .unwrap()
            .entry(lifecycle.id())
            .or_default()
            .push((generation, running.clone()));

        if let Some(hook) = self.on_bind.lock().unwrap().as_ref() {
            hook(generation);
        }

        Ok(Box::new(FakeCamera {
            info,
            zoom: Mutex::new(ZoomRatio::NONE),
            running,
        }))
    }
}

pub struct FakeCamera {
    info: CameraInfo,
    zoom: Mutex<ZoomRatio>,
    running: Arc<AtomicBool>,
}

impl BoundCamera for FakeCamera {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    fn set_zoom_ratio(&self, zoom: ZoomRatio) -> Result<(), BindError> {
        *self.zoom.lock().unwrap() = zoom;
        Ok(())
    }

    fn zoom_ratio(&self) -> ZoomRatio {
        *self.zoom.lock().unwrap()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Slot whose factory counts calls and hands out `provider`.
pub fn counting_slot(provider: Arc<FakeProvider>) -> Arc<ProviderSlot> {
    Arc::new(ProviderSlot::new(move || {
        let provider: Arc<dyn CameraProvider> = provider.clone();
        async move { Ok(provider) }
    }))
}

/// Slot whose first acquisition waits until `release` is called.
pub fn gated_slot(provider: Arc<FakeProvider>) -> (Arc<ProviderSlot>, impl FnOnce()) {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(rx)));
    let slot = Arc::new(ProviderSlot::new(move || {
        let rx = gate.lock().unwrap().take();
        let provider: Arc<dyn CameraProvider> = provider.clone();
        async move {
            if let Some(rx) = rx {
                let _ = rx.await;
            }
            Ok(provider)
        }
    }));
    let release = move || {
        let _ = tx.send(());
    };
    (slot, release)
}

/// Surface that counts rendered frames.
#[derive(Default)]
pub struct CountingSurface {
    pub frames: AtomicU64,
}

impl PreviewSurface for CountingSurface {
    fn render(&self, _image: &FrameImage) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}

/// Torch service backed by fixed lists.
#[derive(Default)]
pub struct FakeTorch {
    pub ids: Vec<String>,
    pub torches: Vec<String>,
    pub calls: Arc<Mutex<Vec<(String, bool)>>>,
    /// Error every `set_torch_mode` call returns after recording itself
    pub fail: Option<TorchError>,
}

impl FakeTorch {
    pub fn with_ids(ids: &[&str], torches: &[&str]) -> Self {
        Self {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            torches: torches.iter().map(|s| s.to_string()).collect(),
            calls: Arc::default(),
            fail: None,
        }
    }

    /// A single torch-capable camera whose hardware call always fails.
    pub fn failing(error: TorchError) -> Self {
        Self {
            fail: Some(error),
            ..Self::with_ids(&["0"], &["0"])
        }
    }
}

impl TorchService for FakeTorch {
    fn camera_ids(&self) -> Result<Vec<String>, TorchError> {
        Ok(self.ids.clone())
    }

    fn has_torch(&self, id: &str) -> bool {
        self.torches.iter().any(|t| t == id)
    }

    fn set_torch_mode(&self, id: &str, enabled: bool) -> Result<(), TorchError> {
        self.calls.lock().unwrap().push((id.to_string(), enabled));
        match &self.fail {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Fail the test instead of hanging when `fut` does not finish in time.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

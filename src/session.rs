//! Capture session binder.
//!
//! Binds a session for a requested lens and zoom:
//!
//! 1. acquire the provider (async, cached after the first success)
//! 2. check the selected camera may be opened at all
//! 3. unbind everything previously bound to the lifecycle
//! 4. bind preview (and analysis, when configured) for the selected lens
//! 5. apply the zoom ratio
//! 6. wire the preview output to the UI surface
//!
//! Provider calls open and close devices, so they run on tokio's blocking
//! pool; the binder's own task only awaits them.
//!
//! Binds are serialized. Every request takes a generation number; a
//! request that is no longer the newest when it gets its turn is skipped,
//! and one that is overtaken while binding tears its session down without
//! touching the surface. Once requests settle exactly one session is bound,
//! the one for the newest request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::camera::{
    BoundCamera, CameraInfo, CameraProvider, DeviceMap, LensFacing, Lifecycle, Outputs,
    PreviewSurface, ProviderSlot, ZoomRatio,
};
use crate::errors::BindError;

/// Lens and zoom wanted for the session. Together they form the rebind key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindRequest {
    pub lens: LensFacing,
    pub zoom: ZoomRatio,
}

/// Where the binder is in its bind sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderState {
    Unbound,
    AcquiringProvider,
    Binding,
    Bound,
}

/// The active bound session.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSession {
    pub generation: u64,
    pub lens: LensFacing,
    pub zoom: ZoomRatio,
    pub camera: CameraInfo,
}

struct ActiveBinding {
    session: CameraSession,
    camera: Box<dyn BoundCamera>,
}

#[derive(Default)]
struct BinderInner {
    active: Option<ActiveBinding>,
}

/// Binds capture sessions to a lifecycle on behalf of the UI.
pub struct CaptureSessionBinder {
    provider: Arc<ProviderSlot>,
    devices: DeviceMap,
    surface: Arc<dyn PreviewSurface>,
    latest: AtomicU64,
    inner: Mutex<BinderInner>,
    state: watch::Sender<BinderState>,
}

impl CaptureSessionBinder {
    pub fn new(
        provider: Arc<ProviderSlot>,
        devices: DeviceMap,
        surface: Arc<dyn PreviewSurface>,
    ) -> Self {
        let (state, _) = watch::channel(BinderState::Unbound);
        Self {
            provider,
            devices,
            surface,
            latest: AtomicU64::new(0),
            inner: Mutex::new(BinderInner::default()),
            state,
        }
    }

    /// Reserve a generation for a new request. Any bind holding an older
    /// generation becomes stale.
    pub fn next_generation(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Newest generation handed out so far.
    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    fn is_stale(&self, generation: u64) -> bool {
        generation != self.latest_generation()
    }

    pub fn state(&self) -> BinderState {
        *self.state.borrow()
    }

    fn set_state(&self, state: BinderState) {
        self.state.send_replace(state);
    }

    /// Bind a session for `request` under a fresh generation.
    pub async fn bind(
        &self,
        request: BindRequest,
        lifecycle: &Lifecycle,
        outputs: &Outputs,
    ) -> Result<CameraSession, BindError> {
        let generation = self.next_generation();
        self.bind_generation(generation, request, lifecycle, outputs)
            .await
    }

    /// Bind a session for `request` under a generation previously reserved
    /// with [`next_generation`](Self::next_generation).
    pub async fn bind_generation(
        &self,
        generation: u64,
        request: BindRequest,
        lifecycle: &Lifecycle,
        outputs: &Outputs,
    ) -> Result<CameraSession, BindError> {
        log::debug!(
            "Bind {} requested: lens={} zoom={}",
            generation,
            request.lens,
            request.zoom
        );

        if self.provider.get_if_ready().is_none() {
            self.set_state(BinderState::AcquiringProvider);
        }
        let provider = match self.provider.get().await {
            Ok(provider) => provider,
            Err(e) => {
                self.settle_state().await;
                return Err(e);
            }
        };

        let mut inner = self.inner.lock().await;
        if self.is_stale(generation) {
            log::debug!("Bind {} skipped, superseded", generation);
            return Err(BindError::Superseded(generation));
        }
        if !lifecycle.is_active() {
            self.set_state(state_of(&inner));
            return Err(BindError::LifecycleInactive);
        }

        let selector = self.devices.selector(request.lens);
        let access = {
            let provider = Arc::clone(&provider);
            blocking(move || provider.check_access(&selector)).await
        };
        if let Err(e) = access {
            log::warn!("Bind {} refused: {}", generation, e);
            self.set_state(state_of(&inner));
            return Err(e);
        }

        self.set_state(BinderState::Binding);

        outputs.preview.clear_surface();
        inner.active = None;

        let bound = {
            let provider = Arc::clone(&provider);
            let lifecycle = lifecycle.clone();
            let outputs = outputs.clone();
            blocking(move || {
                provider.unbind_all(&lifecycle);
                provider.bind_to_lifecycle(&lifecycle, &selector, &outputs, generation)
            })
            .await
        };
        let camera = match bound {
            Ok(camera) => camera,
            Err(e) => {
                log::warn!("Bind {} failed: {}", generation, e);
                self.set_state(BinderState::Unbound);
                return Err(e);
            }
        };

        if let Err(e) = camera.set_zoom_ratio(request.zoom) {
            log::warn!("Bind {} could not apply zoom: {}", generation, e);
            release(&provider, lifecycle).await;
            self.set_state(BinderState::Unbound);
            return Err(e);
        }

        if self.is_stale(generation) {
            log::debug!("Bind {} overtaken after binding, releasing it", generation);
            release(&provider, lifecycle).await;
            self.set_state(BinderState::Unbound);
            return Err(BindError::Superseded(generation));
        }

        outputs.preview.set_surface(generation, Arc::clone(&self.surface));

        let session = CameraSession {
            generation,
            lens: request.lens,
            zoom: camera.zoom_ratio(),
            camera: camera.info().clone(),
        };
        log::info!(
            "Bound {} camera '{}' at {} (session {})",
            session.lens,
            session.camera.name,
            session.zoom,
            generation
        );
        inner.active = Some(ActiveBinding {
            session: session.clone(),
            camera,
        });
        self.set_state(BinderState::Bound);
        Ok(session)
    }

    /// Unbind everything bound to `lifecycle`. In-flight binds become stale.
    pub async fn unbind(&self, lifecycle: &Lifecycle, outputs: &Outputs) {
        self.next_generation();
        let mut inner = self.inner.lock().await;
        if let Some(provider) = self.provider.get_if_ready() {
            release(&provider, lifecycle).await;
        }
        outputs.preview.clear_surface();
        if let Some(active) = inner.active.take() {
            log::info!("Unbound session {}", active.session.generation);
        }
        self.set_state(BinderState::Unbound);
    }

    /// The currently bound session, if any.
    pub async fn active_session(&self) -> Option<CameraSession> {
        let inner = self.inner.lock().await;
        inner.active.as_ref().map(|a| a.session.clone())
    }

    /// Whether the active session's capture is still running.
    pub async fn is_streaming(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.active.as_ref().is_some_and(|a| a.camera.is_running())
    }

    async fn settle_state(&self) {
        let inner = self.inner.lock().await;
        self.set_state(state_of(&inner));
    }
}

/// Run a provider call on the blocking pool.
async fn blocking<T, F>(call: F) -> Result<T, BindError>
where
    F: FnOnce() -> Result<T, BindError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| BindError::Backend(format!("Provider call did not finish: {}", e)))?
}

async fn release(provider: &Arc<dyn CameraProvider>, lifecycle: &Lifecycle) {
    let provider = Arc::clone(provider);
    let lifecycle = lifecycle.clone();
    let result = blocking(move || {
        provider.unbind_all(&lifecycle);
        Ok(())
    })
    .await;
    if let Err(e) = result {
        log::warn!("Unbind failed: {}", e);
    }
}

fn state_of(inner: &BinderInner) -> BinderState {
    if inner.active.is_some() {
        BinderState::Bound
    } else {
        BinderState::Unbound
    }
}

//! Camera provider seam: the backend a session binder talks to.
//!
//! A provider is obtained once per process through a [`ProviderSlot`]
//! (an async one-shot singleton) and binds sessions made of a preview
//! output and an optional analysis output to a [`Lifecycle`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::OnceCell;

use super::frame::{Frame, FrameImage, FrameLedger, Rotation};
use super::lifecycle::Lifecycle;
use super::types::{CameraError, CameraInfo, LensFacing, Resolution, ZoomRatio};
use crate::analysis::LatestFrameSlot;
use crate::errors::BindError;

/// Camera backend able to bind capture sessions to a lifecycle.
pub trait CameraProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// List the cameras this provider can bind.
    fn cameras(&self) -> Result<Vec<CameraInfo>, CameraError>;

    /// Stop every session bound to `lifecycle`. No-op if nothing is bound.
    fn unbind_all(&self, lifecycle: &Lifecycle);

    /// Check that the camera matched by `selector` may be opened at all.
    /// Runs before anything bound is torn down.
    fn check_access(&self, _selector: &LensSelector) -> Result<(), BindError> {
        Ok(())
    }

    /// Open the camera matched by `selector` and start feeding `outputs`.
    ///
    /// Frames produced by the session are stamped with `generation`.
    fn bind_to_lifecycle(
        &self,
        lifecycle: &Lifecycle,
        selector: &LensSelector,
        outputs: &Outputs,
        generation: u64,
    ) -> Result<Box<dyn BoundCamera>, BindError>;
}

/// Control surface of a bound session.
pub trait BoundCamera: Send + Sync {
    fn info(&self) -> &CameraInfo;

    fn set_zoom_ratio(&self, zoom: ZoomRatio) -> Result<(), BindError>;

    fn zoom_ratio(&self) -> ZoomRatio;

    fn is_running(&self) -> bool;
}

/// Where the UI shows preview frames.
pub trait PreviewSurface: Send + Sync {
    fn render(&self, image: &FrameImage);
}

/// Maps lens facings to device indices for backends that don't report facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMap {
    pub front: Option<u32>,
    pub back: Option<u32>,
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self {
            front: Some(0),
            back: Some(1),
        }
    }
}

impl DeviceMap {
    pub fn selector(&self, facing: LensFacing) -> LensSelector {
        let fallback_index = match facing {
            LensFacing::Front => self.front,
            LensFacing::Back => self.back,
        };
        LensSelector {
            facing,
            fallback_index,
        }
    }
}

/// Chooses which camera to bind for a lens facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LensSelector {
    pub facing: LensFacing,
    /// Device index used when no camera reports its facing
    pub fallback_index: Option<u32>,
}

impl LensSelector {
    /// Pick a camera: first one reporting the requested facing, otherwise the
    /// fallback device index.
    pub fn select<'a>(&self, cameras: &'a [CameraInfo]) -> Option<&'a CameraInfo> {
        cameras
            .iter()
            .find(|c| c.facing == Some(self.facing))
            .or_else(|| {
                let index = self.fallback_index?;
                cameras
                    .iter()
                    .find(|c| c.index == index && c.facing.is_none())
            })
    }
}

/// Preview output of a session. Frames are only shown on the surface wired
/// to the session generation that produced them.
#[derive(Default)]
pub struct PreviewOutput {
    surface: Mutex<Option<(u64, Arc<dyn PreviewSurface>)>>,
    rendered: AtomicU64,
}

impl PreviewOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wire this output to `surface` for frames of `generation`.
    pub fn set_surface(&self, generation: u64, surface: Arc<dyn PreviewSurface>) {
        let mut slot = self.surface.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some((generation, surface));
    }

    pub fn clear_surface(&self) {
        let mut slot = self.surface.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    /// Generation whose frames currently reach the surface.
    pub fn wired_generation(&self) -> Option<u64> {
        let slot = self.surface.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|(generation, _)| *generation)
    }

    /// Show a frame produced by session `generation`. Returns `false` when
    /// the frame was discarded because another generation is wired.
    pub fn publish(&self, generation: u64, image: &FrameImage) -> bool {
        let surface = {
            let slot = self.surface.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some((wired, surface)) if *wired == generation => surface.clone(),
                _ => return false,
            }
        };
        surface.render(image);
        self.rendered.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn rendered_frames(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }
}

/// How frames are handed to the analyzer when it falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureStrategy {
    /// Keep only the newest undelivered frame
    #[default]
    KeepOnlyLatest,
}

/// Analysis output configuration, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub backpressure: BackpressureStrategy,
    /// Frames larger than this are downscaled before detection
    pub target_resolution: Resolution,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            backpressure: BackpressureStrategy::KeepOnlyLatest,
            target_resolution: Resolution::LOW,
        }
    }
}

/// Analysis output of a session: turns captured images into [`Frame`]s and
/// offers them to the analyzer's mailbox.
pub struct AnalysisOutput {
    config: AnalysisConfig,
    slot: Arc<LatestFrameSlot>,
    ledger: Arc<FrameLedger>,
    sequence: AtomicU64,
}

impl AnalysisOutput {
    pub fn new(config: AnalysisConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            slot: Arc::new(LatestFrameSlot::new()),
            ledger: FrameLedger::new(),
            sequence: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn slot(&self) -> &Arc<LatestFrameSlot> {
        &self.slot
    }

    pub fn ledger(&self) -> &Arc<FrameLedger> {
        &self.ledger
    }

    /// Hand a captured image to the analyzer. Never blocks.
    ///
    /// `None` stands for a frame whose buffer could not be read.
    pub fn submit(&self, generation: u64, image: Option<FrameImage>, rotation: Rotation) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = Frame::new(image, rotation, sequence, generation, self.ledger.clone());
        match self.config.backpressure {
            BackpressureStrategy::KeepOnlyLatest => {
                if self.slot.offer(frame) {
                    log::trace!("Analyzer busy, dropped frame before {}", sequence);
                }
            }
        }
    }
}

/// Outputs bound together as one session.
#[derive(Clone)]
pub struct Outputs {
    pub preview: Arc<PreviewOutput>,
    pub analysis: Option<Arc<AnalysisOutput>>,
}

impl Outputs {
    pub fn preview_only(preview: Arc<PreviewOutput>) -> Self {
        Self {
            preview,
            analysis: None,
        }
    }

    pub fn with_analysis(preview: Arc<PreviewOutput>, analysis: Arc<AnalysisOutput>) -> Self {
        Self {
            preview,
            analysis: Some(analysis),
        }
    }
}

type ProviderFuture = BoxFuture<'static, Result<Arc<dyn CameraProvider>, BindError>>;

/// Process-wide camera provider, acquired asynchronously on first use.
///
/// The first caller pays the acquisition latency; later callers get the
/// cached provider. A failed acquisition is not cached.
pub struct ProviderSlot {
    cell: OnceCell<Arc<dyn CameraProvider>>,
    factory: Box<dyn Fn() -> ProviderFuture + Send + Sync>,
    attempts: AtomicU64,
}

impl ProviderSlot {
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn CameraProvider>, BindError>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(move || factory().boxed()),
            attempts: AtomicU64::new(0),
        }
    }

    /// A slot whose provider is already available.
    pub fn ready(provider: Arc<dyn CameraProvider>) -> Self {
        Self {
            cell: OnceCell::from(provider),
            factory: Box::new(|| {
                futures_util::future::ready(Err(BindError::ProviderUnavailable(
                    "provider already acquired".to_string(),
                )))
                .boxed()
            }),
            attempts: AtomicU64::new(0),
        }
    }

    /// Get the provider, acquiring it on first call.
    pub async fn get(&self) -> Result<Arc<dyn CameraProvider>, BindError> {
        self.cell
            .get_or_try_init(|| {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                (self.factory)()
            })
            .await
            .cloned()
    }

    /// The provider if it has been acquired already.
    pub fn get_if_ready(&self) -> Option<Arc<dyn CameraProvider>> {
        self.cell.get().cloned()
    }

    /// Number of acquisition attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

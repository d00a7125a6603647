//! Presentation layer.
//!
//! A [`Screen`] is an actor: one task owns the [`UiState`] and applies
//! user commands and background results (bind completions, detection
//! reports, torch results) in the order they arrive on its channel.
//! Snapshots of the state are published on a `watch` channel for rendering.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::analysis::{classify, AnalysisReport, Highlight};
use crate::camera::{LensFacing, Lifecycle, Outputs, ZoomRatio};
use crate::errors::{BindError, TorchError};
use crate::session::{BindRequest, CameraSession, CaptureSessionBinder};
use crate::torch::TorchController;

/// Shown when the camera cannot be opened for lack of permission.
pub const CAMERA_DENIED_TOAST: &str = "Cannot open camera";

/// Session status as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BindStatus {
    #[default]
    Unbound,
    Binding,
    Bound { camera: String },
    Failed(String),
}

impl fmt::Display for BindStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindStatus::Unbound => write!(f, "no camera"),
            BindStatus::Binding => write!(f, "opening camera"),
            BindStatus::Bound { camera } => write!(f, "{}", camera),
            BindStatus::Failed(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Everything the screen shows.
#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    pub lens: LensFacing,
    pub zoom: ZoomRatio,
    pub torch_on: bool,
    pub highlight: Highlight,
    pub progress_visible: bool,
    /// Faces in the latest analyzed frame of the active session
    pub face_count: Option<usize>,
    pub bind_status: BindStatus,
    /// One-shot notification, cleared by the next user command
    pub toast: Option<String>,
    /// Generation of the bound session, if any
    pub session_generation: Option<u64>,
    pub lifecycle_active: bool,
}

impl UiState {
    pub fn new(lens: LensFacing, zoom: ZoomRatio) -> Self {
        Self {
            lens,
            zoom,
            torch_on: false,
            highlight: Highlight::Neutral,
            progress_visible: false,
            face_count: None,
            bind_status: BindStatus::Unbound,
            toast: None,
            session_generation: None,
            lifecycle_active: false,
        }
    }

    /// The (lens, zoom) pair a session should be bound for.
    pub fn bind_request(&self) -> BindRequest {
        BindRequest {
            lens: self.lens,
            zoom: self.zoom,
        }
    }

    fn reset_detection(&mut self) {
        self.highlight = Highlight::Neutral;
        self.progress_visible = false;
        self.face_count = None;
    }

    /// Apply a detection report. Reports from any session other than the
    /// bound one are ignored. Returns whether the report was applied.
    pub fn apply_detection(&mut self, report: &AnalysisReport) -> bool {
        if self.session_generation != Some(report.generation) {
            log::trace!(
                "Ignoring detection from session {} (active {:?})",
                report.generation,
                self.session_generation
            );
            return false;
        }
        match &report.outcome {
            Ok(count) => {
                let state = classify(*count);
                self.highlight = state.highlight;
                self.progress_visible = state.progress_visible;
                self.face_count = Some(*count);
                true
            }
            Err(e) => {
                log::debug!("Detection failed on frame {}: {}", report.sequence, e);
                false
            }
        }
    }

    /// Apply a bind completion that is known to be current.
    pub fn apply_bind_result(&mut self, result: Result<CameraSession, BindError>) {
        match result {
            Ok(session) => {
                self.session_generation = Some(session.generation);
                self.bind_status = BindStatus::Bound {
                    camera: session.camera.name,
                };
                self.reset_detection();
            }
            Err(BindError::Superseded(generation)) => {
                log::debug!("Bind {} superseded", generation);
            }
            Err(e) => {
                log::error!("Camera bind failed: {}", e);
                self.session_generation = None;
                self.reset_detection();
                self.toast = Some(match e {
                    BindError::PermissionDenied => CAMERA_DENIED_TOAST.to_string(),
                    ref other => other.to_string(),
                });
                self.bind_status = BindStatus::Failed(e.to_string());
            }
        }
    }

    /// The flag keeps the requested value whether or not the hardware
    /// call worked; a failure only surfaces as a toast.
    fn apply_torch_result(&mut self, enabled: bool, result: Result<String, TorchError>) {
        self.torch_on = enabled;
        match result {
            Ok(_) => {
                self.toast = Some(if enabled {
                    "Torch turned on".to_string()
                } else {
                    "Torch turned off".to_string()
                });
            }
            Err(e) => {
                log::warn!("Torch toggle failed: {}", e);
                self.toast = Some(format!("Torch: {}", e));
            }
        }
    }
}

/// User-facing commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScreenCommand {
    FlipLens,
    SelectLens(LensFacing),
    SetZoom(ZoomRatio),
    ZoomIn,
    ZoomOut,
    ToggleTorch,
    LifecycleStarted,
    LifecycleStopped,
    Quit,
}

enum ScreenEvent {
    Command(ScreenCommand),
    BindFinished {
        generation: u64,
        result: Result<CameraSession, BindError>,
    },
    Detection(AnalysisReport),
    TorchFinished {
        enabled: bool,
        result: Result<String, TorchError>,
    },
}

/// Cloneable sender for a running [`Screen`].
#[derive(Clone)]
pub struct ScreenHandle {
    tx: mpsc::UnboundedSender<ScreenEvent>,
}

impl ScreenHandle {
    /// Send a command. Returns `false` once the screen has stopped.
    pub fn send(&self, command: ScreenCommand) -> bool {
        self.tx.send(ScreenEvent::Command(command)).is_ok()
    }

    /// Forward an analysis report. Safe to call from any thread.
    pub fn report_analysis(&self, report: AnalysisReport) -> bool {
        self.tx.send(ScreenEvent::Detection(report)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The screen actor.
pub struct Screen {
    binder: Arc<CaptureSessionBinder>,
    lifecycle: Lifecycle,
    outputs: Outputs,
    torch: Arc<TorchController>,
    rx: mpsc::UnboundedReceiver<ScreenEvent>,
    tx: mpsc::WeakUnboundedSender<ScreenEvent>,
    ui: watch::Sender<UiState>,
    state: UiState,
    /// Request behind the latest bind started, used to skip no-op rebinds
    requested: Option<BindRequest>,
    torch_pending: bool,
}

impl Screen {
    pub fn new(
        binder: Arc<CaptureSessionBinder>,
        lifecycle: Lifecycle,
        outputs: Outputs,
        torch: Arc<TorchController>,
        initial: BindRequest,
    ) -> (Self, ScreenHandle, watch::Receiver<UiState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = UiState::new(initial.lens, initial.zoom);
        state.lifecycle_active = lifecycle.is_active();
        let (ui, ui_rx) = watch::channel(state.clone());

        let screen = Self {
            binder,
            lifecycle,
            outputs,
            torch,
            rx,
            tx: tx.downgrade(),
            ui,
            state,
            requested: None,
            torch_pending: false,
        };
        (screen, ScreenHandle { tx }, ui_rx)
    }

    /// Current state, as last applied by the actor.
    pub fn state(&self) -> &UiState {
        &self.state
    }

    /// Process events until `Quit` or until every sender is gone.
    ///
    /// Unbinds the camera before returning the final state.
    pub async fn run(mut self) -> UiState {
        if self.state.lifecycle_active {
            self.request_bind();
            self.publish();
        }

        while let Some(event) = self.rx.recv().await {
            let keep_running = self.handle(event).await;
            self.publish();
            if !keep_running {
                break;
            }
        }

        self.binder.unbind(&self.lifecycle, &self.outputs).await;
        self.lifecycle.stop();
        log::debug!("Screen stopped");
        self.state
    }

    async fn handle(&mut self, event: ScreenEvent) -> bool {
        match event {
            ScreenEvent::Command(command) => return self.handle_command(command).await,
            ScreenEvent::BindFinished { generation, result } => {
                if generation != self.binder.latest_generation() {
                    log::debug!("Dropping result of stale bind {}", generation);
                } else {
                    if matches!(&result, Err(e) if e.is_user_visible()) {
                        // let the same request be retried
                        self.requested = None;
                    }
                    self.state.apply_bind_result(result);
                }
            }
            ScreenEvent::Detection(report) => {
                self.state.apply_detection(&report);
            }
            ScreenEvent::TorchFinished { enabled, result } => {
                self.torch_pending = false;
                self.state.apply_torch_result(enabled, result);
            }
        }
        true
    }

    async fn handle_command(&mut self, command: ScreenCommand) -> bool {
        log::debug!("Command: {:?}", command);
        self.state.toast = None;
        match command {
            ScreenCommand::FlipLens => {
                self.state.lens = self.state.lens.flip();
                self.request_bind();
            }
            ScreenCommand::SelectLens(lens) => {
                self.state.lens = lens;
                self.request_bind();
            }
            ScreenCommand::SetZoom(zoom) => {
                self.state.zoom = zoom;
                self.request_bind();
            }
            ScreenCommand::ZoomIn => {
                self.state.zoom = self.state.zoom.step_up();
                self.request_bind();
            }
            ScreenCommand::ZoomOut => {
                self.state.zoom = self.state.zoom.step_down();
                self.request_bind();
            }
            ScreenCommand::ToggleTorch => self.toggle_torch(),
            ScreenCommand::LifecycleStarted => {
                self.lifecycle.start();
                self.state.lifecycle_active = true;
                self.requested = None;
                self.request_bind();
            }
            ScreenCommand::LifecycleStopped => {
                self.lifecycle.stop();
                self.binder.unbind(&self.lifecycle, &self.outputs).await;
                self.state.lifecycle_active = false;
                self.state.session_generation = None;
                self.state.bind_status = BindStatus::Unbound;
                self.state.reset_detection();
                self.requested = None;
            }
            ScreenCommand::Quit => return false,
        }
        true
    }

    /// Start a bind for the current (lens, zoom) unless one for the same
    /// pair is already bound or in flight.
    fn request_bind(&mut self) {
        if !self.state.lifecycle_active {
            return;
        }
        let request = self.state.bind_request();
        if self.requested == Some(request) {
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        self.requested = Some(request);

        let generation = self.binder.next_generation();
        self.state.bind_status = BindStatus::Binding;
        self.state.session_generation = None;
        self.state.reset_detection();

        let binder = Arc::clone(&self.binder);
        let lifecycle = self.lifecycle.clone();
        let outputs = self.outputs.clone();
        tokio::spawn(async move {
            let result = binder
                .bind_generation(generation, request, &lifecycle, &outputs)
                .await;
            let _ = tx.send(ScreenEvent::BindFinished { generation, result });
        });
    }

    fn toggle_torch(&mut self) {
        if self.torch_pending {
            log::debug!("Torch change already in progress");
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        self.torch_pending = true;

        let enabled = !self.state.torch_on;
        self.state.torch_on = enabled;
        let torch = Arc::clone(&self.torch);
        tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(move || torch.set_torch(enabled)).await
            {
                Ok(result) => result,
                Err(e) => Err(TorchError::Hardware {
                    id: String::new(),
                    message: e.to_string(),
                }),
            };
            let _ = tx.send(ScreenEvent::TorchFinished { enabled, result });
        });
    }

    fn publish(&self) {
        let state = &self.state;
        self.ui.send_if_modified(|current| {
            if current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
    }
}

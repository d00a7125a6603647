//! Camera backends, capture sessions, and the frames they produce.
//!
//! - Provider seam via [`CameraProvider`] and [`ProviderSlot`]
//! - Session outputs via [`PreviewOutput`] and [`AnalysisOutput`]
//! - Backends: [`SyntheticProvider`] always, `NativeProvider` with the `native` feature

pub mod access;
mod capture;
mod capture_loop;
mod frame;
pub mod frame_utils;
mod lifecycle;
#[cfg(feature = "native")]
pub mod native;
mod provider;
mod synthetic;
mod types;

pub use capture::{CaptureSession, FrameSource, SessionRegistry, SourceFrame};
pub use frame::{Frame, FrameFormat, FrameImage, FrameLedger, LedgerSnapshot, Rotation};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use provider::{
    AnalysisConfig, AnalysisOutput, BackpressureStrategy, BoundCamera, CameraProvider, DeviceMap,
    LensSelector, Outputs, PreviewOutput, PreviewSurface, ProviderSlot,
};
pub use synthetic::{SyntheticConfig, SyntheticProvider, SyntheticSource};
pub use types::{CameraError, CameraInfo, LensFacing, Resolution, ZoomRatio};

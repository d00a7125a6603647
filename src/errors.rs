//! Error types for session binding, torch control, and frame analysis.
//!
//! Every error here is caught where it originates and turned into a log
//! line or a UI state change; none of them terminate the screen.

use std::io;

use crate::camera::LensFacing;

/// Errors that can occur while binding a capture session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindError {
    #[error("No {0} camera available")]
    NoMatchingCamera(LensFacing),

    #[error(
        "Camera permission denied. Grant camera access to this application and try again"
    )]
    PermissionDenied,

    #[error("Camera is busy: {0}")]
    DeviceBusy(String),

    #[error("Camera provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Cannot bind while the host lifecycle is stopped")]
    LifecycleInactive,

    /// A newer bind request replaced this one before it completed.
    #[error("Bind request {0} superseded by a newer request")]
    Superseded(u64),

    #[error("Zoom {0:.2}x rejected by the camera")]
    ZoomRejected(f32),

    #[error("Camera backend error: {0}")]
    Backend(String),
}

impl BindError {
    /// Classify a backend error message, mapping permission failures to
    /// [`BindError::PermissionDenied`] and busy devices to [`BindError::DeviceBusy`].
    pub fn from_backend_message(message: &str) -> Self {
        let msg = message.to_lowercase();
        if msg.contains("permission")
            || msg.contains("denied")
            || msg.contains("authorization")
            || msg.contains("access")
        {
            BindError::PermissionDenied
        } else if msg.contains("busy") || msg.contains("in use") {
            BindError::DeviceBusy(message.to_string())
        } else {
            BindError::Backend(message.to_string())
        }
    }

    /// Whether this error should be shown to the user.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, BindError::Superseded(_))
    }
}

/// Whether an I/O error is the OS reporting a busy device (`EBUSY`).
#[cfg(unix)]
pub fn is_busy(error: &io::Error) -> bool {
    error.raw_os_error() == Some(libc::EBUSY)
}

#[cfg(not(unix))]
pub fn is_busy(_error: &io::Error) -> bool {
    false
}

/// Errors from torch (flashlight) control.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TorchError {
    #[error("No camera identifiers reported")]
    NoCameras,

    #[error("No camera with a torch was found")]
    NoTorch,

    #[error("Permission denied while setting torch on '{0}'")]
    PermissionDenied(String),

    #[error("Torch on '{0}' is busy")]
    Busy(String),

    #[error("Torch hardware error on '{id}': {message}")]
    Hardware { id: String, message: String },
}

/// Opaque failure from the detection capability.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectionError {
    #[error("Face detection model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Face detection failed: {0}")]
    Failed(String),
}

/// A frame whose image could not be read.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameExtractionError {
    #[error("Frame {0} carries no image buffer")]
    MissingBuffer(u64),

    #[error("Frame {sequence} buffer holds {actual} bytes, expected {expected}")]
    SizeMismatch {
        sequence: u64,
        expected: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_from_permission_message() {
        assert_eq!(
            BindError::from_backend_message("Access denied by the OS"),
            BindError::PermissionDenied
        );
        assert_eq!(
            BindError::from_backend_message("Not authorization granted"),
            BindError::PermissionDenied
        );
    }

    #[test]
    fn test_bind_error_from_busy_message() {
        match BindError::from_backend_message("Device or resource busy") {
            BindError::DeviceBusy(msg) => assert!(msg.contains("busy")),
            other => panic!("Expected DeviceBusy, got {:?}", other),
        }
    }

    #[test]
    fn test_bind_error_from_other_message() {
        assert_eq!(
            BindError::from_backend_message("format negotiation failed"),
            BindError::Backend("format negotiation failed".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_is_busy_matches_ebusy_only() {
        assert!(is_busy(&io::Error::from_raw_os_error(libc::EBUSY)));
        assert!(!is_busy(&io::Error::from_raw_os_error(libc::EACCES)));
        assert!(!is_busy(&io::Error::new(io::ErrorKind::Other, "busy")));
    }

    #[test]
    fn test_superseded_is_not_user_visible() {
        assert!(!BindError::Superseded(3).is_user_visible());
        assert!(BindError::PermissionDenied.is_user_visible());
        assert!(BindError::NoMatchingCamera(LensFacing::Back).is_user_visible());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", BindError::NoMatchingCamera(LensFacing::Back)),
            "No back camera available"
        );
        assert_eq!(
            format!("{}", BindError::ZoomRejected(2.5)),
            "Zoom 2.50x rejected by the camera"
        );
        let err = TorchError::Hardware {
            id: "led0".to_string(),
            message: "io".to_string(),
        };
        assert!(format!("{}", err).contains("led0"));
        let err = FrameExtractionError::SizeMismatch {
            sequence: 7,
            expected: 12,
            actual: 3,
        };
        assert_eq!(
            format!("{}", err),
            "Frame 7 buffer holds 3 bytes, expected 12"
        );
    }
}

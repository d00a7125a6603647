//! Pre-bind check that a camera's device node may be opened.
//!
//! Runs before a bind tears the current session down, so a camera the
//! user cannot open is reported without losing the preview that works.

use std::fs::OpenOptions;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::errors::{is_busy, BindError};

/// Directory holding V4L2 device nodes.
pub const DEFAULT_DEVICE_DIR: &str = "/dev";

/// Device node for camera `index` under `dir`.
pub fn video_node(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("video{}", index))
}

/// Open `path` for reading and writing and close it again.
///
/// A missing node passes; the backend reports it when it tries to bind.
pub fn check_device_node(path: &Path) -> Result<(), BindError> {
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) => classify_open_error(path, e),
    }
}

fn classify_open_error(path: &Path, error: io::Error) -> Result<(), BindError> {
    if error.kind() == ErrorKind::NotFound {
        return Ok(());
    }
    log::warn!("Cannot open {}: {}", path.display(), error);
    if error.kind() == ErrorKind::PermissionDenied {
        Err(BindError::PermissionDenied)
    } else if is_busy(&error) {
        Err(BindError::DeviceBusy(path.display().to_string()))
    } else {
        Err(BindError::Backend(format!(
            "Cannot open {}: {}",
            path.display(),
            error
        )))
    }
}

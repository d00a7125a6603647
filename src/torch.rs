//! Torch (flashlight) control.
//!
//! The controller enumerates camera identifiers through a [`TorchService`],
//! picks a target according to a [`TorchSelection`] policy, and sets the
//! torch mode. Failures come back as [`TorchError`]; nothing is retried.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::{is_busy, TorchError};

/// Hardware access for torch control.
pub trait TorchService: Send + Sync {
    /// Identifiers of the cameras (or LEDs) the service knows about.
    fn camera_ids(&self) -> Result<Vec<String>, TorchError>;

    /// Whether `id` has torch hardware.
    fn has_torch(&self, id: &str) -> bool;

    fn set_torch_mode(&self, id: &str, enabled: bool) -> Result<(), TorchError>;
}

/// How the torch target is chosen among the enumerated identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TorchSelection {
    /// Use the first identifier without checking it has a torch
    FirstListed,
    /// Use the first identifier whose capability query reports a torch
    #[default]
    CapabilityQuery,
}

/// Sets the torch on or off through an injected [`TorchService`].
pub struct TorchController {
    service: Box<dyn TorchService>,
    selection: TorchSelection,
}

impl TorchController {
    pub fn new(service: Box<dyn TorchService>, selection: TorchSelection) -> Self {
        Self { service, selection }
    }

    /// Find the identifier the torch should be driven on.
    pub fn target(&self) -> Result<String, TorchError> {
        let ids = self.service.camera_ids()?;
        if ids.is_empty() {
            return Err(TorchError::NoCameras);
        }
        match self.selection {
            TorchSelection::FirstListed => Ok(ids[0].clone()),
            TorchSelection::CapabilityQuery => ids
                .into_iter()
                .find(|id| self.service.has_torch(id))
                .ok_or(TorchError::NoTorch),
        }
    }

    /// Turn the torch on or off. Returns the identifier that was driven.
    pub fn set_torch(&self, enabled: bool) -> Result<String, TorchError> {
        let id = self.target()?;
        self.service.set_torch_mode(&id, enabled)?;
        log::info!("Torch {} on '{}'", if enabled { "on" } else { "off" }, id);
        Ok(id)
    }
}

/// Default location of LED class devices on Linux.
pub const DEFAULT_LEDS_DIR: &str = "/sys/class/leds";

/// Torch service driving Linux LED class devices (`/sys/class/leds/*`).
///
/// Identifiers are LED directory names, sorted. An LED counts as a torch
/// when its name contains `torch` or `flash`.
pub struct SysfsTorch {
    root: PathBuf,
}

impl SysfsTorch {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn led_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn max_brightness(&self, id: &str) -> u32 {
        fs::read_to_string(self.led_dir(id).join("max_brightness"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(1)
    }
}

impl Default for SysfsTorch {
    fn default() -> Self {
        Self::new(DEFAULT_LEDS_DIR)
    }
}

impl TorchService for SysfsTorch {
    fn camera_ids(&self) -> Result<Vec<String>, TorchError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(TorchError::PermissionDenied(self.root.display().to_string()))
            }
            Err(e) => {
                return Err(TorchError::Hardware {
                    id: self.root.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join("brightness").exists())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn has_torch(&self, id: &str) -> bool {
        let name = id.to_lowercase();
        name.contains("torch") || name.contains("flash")
    }

    fn set_torch_mode(&self, id: &str, enabled: bool) -> Result<(), TorchError> {
        let value = if enabled { self.max_brightness(id) } else { 0 };
        fs::write(self.led_dir(id).join("brightness"), value.to_string()).map_err(|e| {
            if e.kind() == ErrorKind::PermissionDenied {
                TorchError::PermissionDenied(id.to_string())
            } else if is_busy(&e) {
                TorchError::Busy(id.to_string())
            } else {
                TorchError::Hardware {
                    id: id.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}

//! Camera types and data structures.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Which physical camera is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    /// User-facing camera (selfie)
    #[default]
    Front,
    /// World-facing camera
    Back,
}

impl LensFacing {
    /// The opposite lens.
    pub fn flip(self) -> Self {
        match self {
            LensFacing::Front => LensFacing::Back,
            LensFacing::Back => LensFacing::Front,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LensFacing::Front => "front",
            LensFacing::Back => "back",
        }
    }
}

impl fmt::Display for LensFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LensFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" => Ok(LensFacing::Front),
            "back" | "rear" => Ok(LensFacing::Back),
            other => Err(format!("Unknown lens '{}'. Use 'front' or 'back'", other)),
        }
    }
}

/// Zoom ratio applied to the bound session, kept within [`ZoomRatio::MIN`, `ZoomRatio::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ZoomRatio(f32);

impl ZoomRatio {
    pub const MIN: f32 = 1.0;
    pub const MAX: f32 = 3.0;
    /// Increment used by zoom in/out controls
    pub const STEP: f32 = 0.25;

    /// No zoom.
    pub const NONE: ZoomRatio = ZoomRatio(Self::MIN);

    /// Create a zoom ratio, rejecting values outside the supported range.
    pub fn new(value: f32) -> Result<Self, String> {
        if !value.is_finite() || !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(format!(
                "Zoom must be between {:.1} and {:.1}, got {}",
                Self::MIN,
                Self::MAX,
                value
            ));
        }
        Ok(ZoomRatio(value))
    }

    /// Create a zoom ratio, clamping into the supported range.
    ///
    /// Non-finite input maps to no zoom.
    pub fn clamped(value: f32) -> Self {
        if value.is_finite() {
            ZoomRatio(value.clamp(Self::MIN, Self::MAX))
        } else {
            Self::NONE
        }
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn step_up(self) -> Self {
        Self::clamped(self.0 + Self::STEP)
    }

    pub fn step_down(self) -> Self {
        Self::clamped(self.0 - Self::STEP)
    }

    /// Position within the range as a fraction in [0, 1].
    pub fn fraction(&self) -> f32 {
        (self.0 - Self::MIN) / (Self::MAX - Self::MIN)
    }
}

impl Default for ZoomRatio {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for ZoomRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}x", self.0)
    }
}

/// Information about an available camera device.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    /// Device index for selection
    pub index: u32,
    /// Human-readable device name
    pub name: String,
    /// Device description
    pub description: String,
    /// Facing reported by the backend, if it knows
    pub facing: Option<LensFacing>,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.description)?;
        if let Some(facing) = self.facing {
            write!(f, " {}", facing)?;
        }
        Ok(())
    }
}

/// Camera resolution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Low resolution (320x240), used as the analysis target
    pub const LOW: Resolution = Resolution {
        width: 320,
        height: 240,
    };

    /// Medium resolution (640x480) - balanced, recommended
    pub const MEDIUM: Resolution = Resolution {
        width: 640,
        height: 480,
    };

    /// High resolution (1280x720)
    pub const HIGH: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
}

impl Default for Resolution {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Errors from camera enumeration.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("No cameras found")]
    NoDevices,

    #[error("Failed to query cameras: {0}")]
    QueryFailed(String),

    #[error("Camera backend '{0}' is not available in this build")]
    BackendUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lens_flip() {
        assert_eq!(LensFacing::Front.flip(), LensFacing::Back);
        assert_eq!(LensFacing::Back.flip(), LensFacing::Front);
        assert_eq!(LensFacing::default(), LensFacing::Front);
    }

    #[test]
    fn test_lens_from_str() {
        assert_eq!("front".parse::<LensFacing>().unwrap(), LensFacing::Front);
        assert_eq!("BACK".parse::<LensFacing>().unwrap(), LensFacing::Back);
        assert_eq!("rear".parse::<LensFacing>().unwrap(), LensFacing::Back);
        assert!("side".parse::<LensFacing>().is_err());
    }

    #[test]
    fn test_zoom_bounds() {
        assert!(ZoomRatio::new(1.0).is_ok());
        assert!(ZoomRatio::new(3.0).is_ok());
        assert!(ZoomRatio::new(0.5).is_err());
        assert!(ZoomRatio::new(3.5).is_err());
        assert!(ZoomRatio::new(f32::NAN).is_err());
    }

    #[test]
    fn test_zoom_clamped() {
        assert_eq!(ZoomRatio::clamped(0.2).value(), 1.0);
        assert_eq!(ZoomRatio::clamped(9.0).value(), 3.0);
        assert_eq!(ZoomRatio::clamped(f32::INFINITY), ZoomRatio::NONE);
    }

    #[test]
    fn test_zoom_steps_saturate() {
        let mut zoom = ZoomRatio::NONE;
        zoom = zoom.step_down();
        assert_eq!(zoom.value(), 1.0);
        for _ in 0..20 {
            zoom = zoom.step_up();
        }
        assert_eq!(zoom.value(), 3.0);
        assert_eq!(ZoomRatio::new(2.0).unwrap().step_up().value(), 2.25);
    }

    #[test]
    fn test_zoom_fraction() {
        assert_eq!(ZoomRatio::NONE.fraction(), 0.0);
        assert_eq!(ZoomRatio::new(2.0).unwrap().fraction(), 0.5);
        assert_eq!(ZoomRatio::new(3.0).unwrap().fraction(), 1.0);
    }

    #[test]
    fn test_camera_info_display() {
        let info = CameraInfo {
            index: 0,
            name: "Test Camera".to_string(),
            description: "Built-in".to_string(),
            facing: None,
        };
        assert_eq!(format!("{}", info), "[0] Test Camera (Built-in)");

        let info = CameraInfo {
            facing: Some(LensFacing::Back),
            ..info
        };
        assert_eq!(format!("{}", info), "[0] Test Camera (Built-in) back");
    }

    #[test]
    fn test_resolution_constants() {
        assert_eq!(Resolution::LOW.width, 320);
        assert_eq!(Resolution::LOW.height, 240);
        assert_eq!(Resolution::default(), Resolution::MEDIUM);
        assert_eq!(format!("{}", Resolution::HIGH), "1280x720");
    }

    #[test]
    fn test_camera_error_display() {
        assert_eq!(format!("{}", CameraError::NoDevices), "No cameras found");
        assert_eq!(
            format!("{}", CameraError::QueryFailed("test".to_string())),
            "Failed to query cameras: test"
        );
        assert!(format!("{}", CameraError::BackendUnavailable("native".into())).contains("native"));
    }
}

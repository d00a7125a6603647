//! Subcommand handlers for list-cameras, torch, and config actions.

use std::path::Path;
use std::sync::Arc;

use super::args::ConfigAction;
use super::enums::TorchState;
use crate::camera::{CameraError, CameraProvider, SyntheticConfig, SyntheticProvider};
use crate::config::{Backend, Config, ConfigError, DEFAULT_CONFIG};
use crate::errors::{BindError, TorchError};
use crate::torch::{SysfsTorch, TorchController, TorchSelection};

/// Errors surfaced by subcommands to `main`.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("Torch: {0}")]
    Torch(#[from] TorchError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Build the provider for `backend`.
///
/// Webcam access happens on first use, so this is cheap for both backends.
pub fn make_provider(
    backend: Backend,
    config: &Config,
) -> Result<Arc<dyn CameraProvider>, BindError> {
    match backend {
        Backend::Synthetic => {
            let synthetic = SyntheticConfig {
                resolution: config.resolution(),
                fps: config.camera.fps,
                rotation: config.rotation(),
                ..SyntheticConfig::default()
            };
            Ok(Arc::new(SyntheticProvider::new(synthetic)))
        }
        #[cfg(feature = "native")]
        Backend::Native => {
            let settings = crate::camera::native::NativeSettings {
                resolution: config.resolution(),
                fps: config.camera.fps,
                mirror_front: config.camera.mirror,
                rotation: config.rotation(),
            };
            Ok(Arc::new(crate::camera::native::NativeProvider::new(settings)))
        }
        #[cfg(not(feature = "native"))]
        Backend::Native => Err(BindError::ProviderUnavailable(
            "facecam was built without the 'native' feature".to_string(),
        )),
    }
}

/// List available cameras and print them to stdout.
pub fn list_cameras(backend: Option<Backend>, config: &Config) -> Result<(), CommandError> {
    let backend = backend.unwrap_or(config.camera.backend);
    let provider = make_provider(backend, config)?;
    let cameras = provider.cameras()?;
    log::debug!("{} backend reported {} cameras", provider.name(), cameras.len());

    if cameras.is_empty() {
        println!("No cameras found.");
        println!();
        println!("Make sure your camera is connected and permissions are granted.");
    } else {
        println!("Available cameras ({}):", provider.name());
        for camera in cameras {
            println!("  {}", camera);
        }
        println!();
        println!("Set front_device/back_device in the config to map lenses to indices.");
    }
    Ok(())
}

/// Turn the torch on or off and report which LED was driven.
pub fn set_torch(state: TorchState, first_listed: bool, config: &Config) -> Result<(), CommandError> {
    let selection = if first_listed {
        TorchSelection::FirstListed
    } else {
        config.torch.selection
    };
    let controller = TorchController::new(
        Box::new(SysfsTorch::new(config.torch.leds_dir.clone())),
        selection,
    );
    let id = controller.set_torch(state.enabled())?;
    println!(
        "Torch turned {} ({})",
        if state.enabled() { "on" } else { "off" },
        id
    );
    Ok(())
}

/// Handle config subcommand actions.
/// Show the effective settings, or write the default file at `config_path`.
pub fn handle_config_action(
    action: ConfigAction,
    config: &Config,
    config_path: &Path,
) -> Result<(), CommandError> {
    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            println!("  Backend: {:?}", config.camera.backend);
            println!("  Lens: {}", config.camera.lens);
            println!("  Zoom: {}", config.zoom());
            println!("  Capture: {} @ {}fps", config.resolution(), config.camera.fps);
            println!("  Rotation: {} degrees", config.rotation().degrees());
            println!(
                "  Analysis: {}",
                if config.analysis.enabled { "on" } else { "off" }
            );
            println!("  Torch selection: {:?}", config.torch.selection);
            println!("  LED directory: {}", config.torch.leds_dir.display());
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(CommandError::Other(format!(
                    "Config file already exists: {}. Use 'facecam config show' to view current settings.",
                    config_path.display()
                )));
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(config_path, DEFAULT_CONFIG)?;
            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

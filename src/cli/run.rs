//! The `run` subcommand: wires provider, binder, analyzer, and screen together.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::args::RunArgs;
use super::commands::{make_provider, CommandError};
use crate::analysis::{FaceDetector, FrameAnalyzer, MarkerDetector};
use crate::camera::{AnalysisOutput, LensFacing, Lifecycle, Outputs, PreviewOutput, ProviderSlot};
use crate::config::Config;
use crate::errors::DetectionError;
use crate::render::{status_line, TerminalSurface};
use crate::screen::{Screen, ScreenCommand, ScreenHandle, UiState};
use crate::session::{BindRequest, CaptureSessionBinder};
use crate::torch::{SysfsTorch, TorchController};

/// Status line refresh interval; also drives the progress animation.
const RENDER_INTERVAL: Duration = Duration::from_millis(100);

/// Map one line of keyboard input to commands. Unknown keys are ignored.
pub fn parse_keys(line: &str) -> Vec<ScreenCommand> {
    match line.trim() {
        "front" => return vec![ScreenCommand::SelectLens(LensFacing::Front)],
        "back" => return vec![ScreenCommand::SelectLens(LensFacing::Back)],
        _ => {}
    }
    line.trim()
        .chars()
        .filter_map(|c| match c {
            'f' | 'F' => Some(ScreenCommand::FlipLens),
            't' | 'T' => Some(ScreenCommand::ToggleTorch),
            '+' | '=' => Some(ScreenCommand::ZoomIn),
            '-' | '_' => Some(ScreenCommand::ZoomOut),
            'q' | 'Q' => Some(ScreenCommand::Quit),
            _ => None,
        })
        .collect()
}

/// Run the camera screen until quit, EOF on stdin, or Ctrl+C.
pub fn run(args: RunArgs, config: &Config) -> Result<(), CommandError> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_screen(args, config))
}

fn make_detector(
    model: Option<std::path::PathBuf>,
    min_face_size: u32,
) -> Result<Box<dyn FaceDetector>, DetectionError> {
    match model {
        #[cfg(feature = "yunet")]
        Some(path) => {
            use crate::analysis::yunet::{YuNetDetector, YuNetSettings};
            let settings = YuNetSettings {
                min_face_size,
                ..YuNetSettings::default()
            };
            Ok(Box::new(YuNetDetector::load(&path, settings)?))
        }
        #[cfg(not(feature = "yunet"))]
        Some(path) => {
            let _ = min_face_size;
            Err(DetectionError::ModelUnavailable(format!(
                "{}: facecam was built without the 'yunet' feature",
                path.display()
            )))
        }
        None => Ok(Box::new(MarkerDetector::default())),
    }
}

async fn run_screen(args: RunArgs, config: &Config) -> Result<(), CommandError> {
    let backend = args.backend.unwrap_or(config.camera.backend);
    let lens = args.lens.unwrap_or(config.camera.lens);
    let zoom = args.zoom.unwrap_or_else(|| config.zoom());
    let analysis_enabled = config.analysis.enabled && !args.no_analysis;
    let show_status = config.ui.status_bar && !args.no_status;

    let mut provider_config = Config::default();
    provider_config.camera = config.camera.clone();
    provider_config.camera.fps = args.fps.unwrap_or(config.camera.fps);
    let slot = Arc::new(ProviderSlot::new(move || {
        let provider = make_provider(backend, &provider_config);
        async move { provider }
    }));

    let surface = Arc::new(TerminalSurface::new());
    let preview = PreviewOutput::new();
    let outputs = if analysis_enabled {
        Outputs::with_analysis(preview, AnalysisOutput::new(config.analysis_config()))
    } else {
        Outputs::preview_only(preview)
    };

    let binder = Arc::new(CaptureSessionBinder::new(
        slot,
        config.device_map(),
        surface.clone(),
    ));
    let torch = Arc::new(TorchController::new(
        Box::new(SysfsTorch::new(config.torch.leds_dir.clone())),
        config.torch.selection,
    ));
    let lifecycle = Lifecycle::new();

    let (screen, handle, ui_rx) = Screen::new(
        binder,
        lifecycle,
        outputs.clone(),
        torch,
        BindRequest { lens, zoom },
    );

    let analyzer = outputs.analysis.as_ref().map(|analysis| {
        let model = args.model.clone().or_else(|| config.analysis.model.clone());
        let min_face_size = config.analysis.min_face_size;
        let sink = handle.clone();
        FrameAnalyzer::spawn(
            analysis,
            move || make_detector(model, min_face_size),
            move |report| {
                sink.report_analysis(report);
            },
        )
    });

    let ctrlc_handle = handle.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C, shutting down...");
        ctrlc_handle.send(ScreenCommand::Quit);
    }) {
        log::warn!("Could not install Ctrl+C handler: {}", e);
    }

    spawn_stdin_reader(handle.clone());

    #[cfg(feature = "hotkeys")]
    let _hotkeys = {
        let mut listener = crate::hotkeys::HotkeyListener::new(handle.clone());
        if let Err(e) = listener.start() {
            log::warn!("Global hotkeys unavailable: {}", e);
        }
        listener
    };

    let render = show_status.then(|| tokio::spawn(render_loop(ui_rx, surface.clone())));

    log::info!(
        "Starting {:?} backend, {} lens at {}, analysis {}",
        backend,
        lens,
        zoom,
        if analysis_enabled { "on" } else { "off" }
    );
    handle.send(ScreenCommand::LifecycleStarted);
    drop(handle);

    let final_state = screen.run().await;

    if let Some(render) = render {
        render.abort();
        println!();
    }
    if let Some(mut analyzer) = analyzer {
        let stopped = tokio::task::spawn_blocking(move || {
            analyzer.stop();
            analyzer.stats()
        })
        .await;
        match stopped {
            Ok(stats) => log::info!("Analyzer: {:?}", stats),
            Err(e) => log::warn!("Analyzer did not shut down cleanly: {}", e),
        }
    }
    if let Some(analysis) = &outputs.analysis {
        let ledger = analysis.ledger().snapshot();
        log::info!(
            "Frames: {} produced, {} delivered, {} released, {} dropped",
            ledger.produced,
            ledger.delivered,
            ledger.released,
            ledger.dropped
        );
    }
    log::info!("Preview: {} ({} frames)", surface.summary(), surface.frames());
    log::debug!("Final state: {:?}", final_state);
    Ok(())
}

/// Read keyboard commands from stdin on a plain thread. EOF quits.
fn spawn_stdin_reader(handle: ScreenHandle) {
    let spawned = std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                for command in parse_keys(&line) {
                    if !handle.send(command) {
                        return;
                    }
                }
            }
            handle.send(ScreenCommand::Quit);
        });
    if let Err(e) = spawned {
        log::warn!("Keyboard input unavailable: {}", e);
    }
}

async fn render_loop(mut ui_rx: watch::Receiver<UiState>, surface: Arc<TerminalSurface>) {
    let mut interval = tokio::time::interval(RENDER_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            changed = ui_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = interval.tick() => {
                tick += 1;
            }
        }
        let line = status_line(&ui_rx.borrow_and_update(), tick);
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\r\x1b[K{} | {}", line, surface.summary());
        let _ = stdout.flush();
    }
}

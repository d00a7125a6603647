//! Global hotkeys for the camera screen.
//!
//! Uses rdev for global key listening, so keys work while another window
//! has focus. Requires Accessibility permissions on macOS and an X11
//! session on Linux.

use rdev::{listen, Event, EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::screen::{ScreenCommand, ScreenHandle};

/// Map a pressed key to a screen command.
pub fn command_for_key(key: Key) -> Option<ScreenCommand> {
    match key {
        Key::KeyF => Some(ScreenCommand::FlipLens),
        Key::KeyT => Some(ScreenCommand::ToggleTorch),
        // '+' shares the '=' key on most layouts
        Key::Equal | Key::KpPlus => Some(ScreenCommand::ZoomIn),
        Key::Minus | Key::KpMinus => Some(ScreenCommand::ZoomOut),
        _ => None,
    }
}

/// Forwards global key presses to a running screen.
pub struct HotkeyListener {
    handle: ScreenHandle,
    stop_flag: Arc<AtomicBool>,
    listener_thread: Option<JoinHandle<()>>,
}

impl HotkeyListener {
    pub fn new(handle: ScreenHandle) -> Self {
        Self {
            handle,
            stop_flag: Arc::new(AtomicBool::new(false)),
            listener_thread: None,
        }
    }

    /// Start listening. Returns an error if the listener is already running.
    pub fn start(&mut self) -> Result<(), String> {
        if self.listener_thread.is_some() {
            return Err("Hotkey listener already running".to_string());
        }

        let handle = self.handle.clone();
        let stop_flag = self.stop_flag.clone();

        let thread = thread::Builder::new()
            .name("hotkeys".to_string())
            .spawn(move || {
                let callback = move |event: Event| {
                    if stop_flag.load(Ordering::SeqCst) {
                        return;
                    }
                    if let EventType::KeyPress(key) = event.event_type {
                        if let Some(command) = command_for_key(key) {
                            log::debug!("Hotkey {:?} -> {:?}", key, command);
                            handle.send(command);
                        }
                    }
                };

                // Blocks until the listener fails
                if let Err(e) = listen(callback) {
                    log::warn!("Hotkey listener error: {:?}", e);
                }
            })
            .map_err(|e| e.to_string())?;

        self.listener_thread = Some(thread);
        Ok(())
    }

    /// Stop forwarding key presses.
    ///
    /// rdev's `listen()` cannot be interrupted, so the thread lingers until
    /// the process exits; the flag only keeps it from sending commands.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.listener_thread = None;
    }

    pub fn is_running(&self) -> bool {
        self.listener_thread.is_some()
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_for_key() {
        assert_eq!(command_for_key(Key::KeyF), Some(ScreenCommand::FlipLens));
        assert_eq!(command_for_key(Key::KeyT), Some(ScreenCommand::ToggleTorch));
        assert_eq!(command_for_key(Key::Equal), Some(ScreenCommand::ZoomIn));
        assert_eq!(command_for_key(Key::KpMinus), Some(ScreenCommand::ZoomOut));
        assert_eq!(command_for_key(Key::KeyQ), None);
    }
}

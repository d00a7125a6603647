//! Single-slot frame mailbox implementing the keep-only-latest strategy.
//!
//! The producer never blocks: offering a frame while another is pending
//! drops (and thereby releases) the pending one. The consumer takes at most
//! one frame at a time, so a slow analyzer causes drops, not queue growth.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::camera::Frame;

#[derive(Default)]
struct SlotState {
    pending: Option<Frame>,
    closed: bool,
}

/// Mailbox holding at most one undelivered frame.
#[derive(Default)]
pub struct LatestFrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offer a frame. Returns `true` if an older pending frame was dropped.
    ///
    /// Frames offered after [`close`](Self::close) are dropped immediately.
    pub fn offer(&self, frame: Frame) -> bool {
        let replaced = {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            let replaced = state.pending.replace(frame);
            self.ready.notify_one();
            replaced
        };
        // Release the superseded frame outside the lock.
        replaced.is_some()
    }

    /// Wait for the next frame. Returns `None` once the slot is closed.
    pub fn take(&self) -> Option<Frame> {
        let mut state = self.lock();
        loop {
            if let Some(frame) = state.pending.take() {
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Take the pending frame without waiting.
    pub fn try_take(&self) -> Option<Frame> {
        self.lock().pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Close the slot, dropping any pending frame and waking the consumer.
    pub fn close(&self) {
        let pending = {
            let mut state = self.lock();
            state.closed = true;
            self.ready.notify_all();
            state.pending.take()
        };
        drop(pending);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

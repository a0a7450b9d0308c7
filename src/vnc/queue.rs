//! Outbound command FIFO.
//!
//! Callers enqueue from any thread; the session thread drains the queue
//! once per pump iteration while connected. The queue mutex is never
//! held across a codec send, so producers are not blocked by slow
//! network writes.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A user-originated protocol command, consumed at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VncCommand {
    PointerMove { x: u16, y: u16, button_mask: u8 },
    Key { keysym: u32, pressed: bool },
    ClientCut { text: String },
    /// Re-program pixel format and encodings after a quality or cursor
    /// preference change.
    RefreshFormatAndEncodings,
}

#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    queue: Mutex<VecDeque<VncCommand>>,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn push(&self, command: VncCommand) {
        self.queue.lock().unwrap().push_back(command);
    }

    /// Pop the oldest command; the lock is released before the caller
    /// acts on it.
    pub(crate) fn pop(&self) -> Option<VncCommand> {
        self.queue.lock().unwrap().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

// ─── Sleeper ─────────────────────────────────────────────────────────

/// Wakeable timed wait shared by retry back-off and manual update rate
/// control. Any lifecycle change (terminate, restart, new command)
/// wakes the session thread promptly.
#[derive(Debug, Default)]
pub(crate) struct Sleeper {
    lock: Mutex<()>,
    cond: Condvar,
}

impl Sleeper {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block for at most `timeout`; returns early when woken.
    pub(crate) fn wait(&self, timeout: Duration) {
        let guard = self.lock.lock().unwrap();
        let _ = self.cond.wait_timeout(guard, timeout).unwrap();
    }

    pub(crate) fn wake_all(&self) {
        self.cond.notify_all();
    }
}

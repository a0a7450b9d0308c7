//! Session statistics, shared between the session thread and observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct SessionStats {
    pub(crate) connect_attempts: AtomicU64,
    pub(crate) updates_completed: AtomicU64,
    pub(crate) regions_updated: AtomicU64,
    pub(crate) update_requests_sent: AtomicU64,
    pub(crate) commands_sent: AtomicU64,
    connected_at: Mutex<Option<Instant>>,
    last_error: Mutex<Option<String>>,
}

impl SessionStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_connected(&self) {
        *self.connected_at.lock().unwrap() = Some(Instant::now());
    }

    pub(crate) fn mark_disconnected(&self) {
        *self.connected_at.lock().unwrap() = None;
    }

    pub(crate) fn set_last_error(&self, err: &str) {
        *self.last_error.lock().unwrap() = Some(err.to_string());
    }

    pub(crate) fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            uptime_secs: self
                .connected_at
                .lock()
                .unwrap()
                .map(|t| t.elapsed().as_secs()),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            updates_completed: self.updates_completed.load(Ordering::Relaxed),
            regions_updated: self.regions_updated.load(Ordering::Relaxed),
            update_requests_sent: self.update_requests_sent.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            last_error: self.last_error.lock().unwrap().clone(),
        }
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatsSnapshot {
    /// Seconds since the current connection was established; `None`
    /// while not connected.
    pub uptime_secs: Option<u64>,
    pub connect_attempts: u64,
    pub updates_completed: u64,
    pub regions_updated: u64,
    pub update_requests_sent: u64,
    pub commands_sent: u64,
    pub last_error: Option<String>,
}

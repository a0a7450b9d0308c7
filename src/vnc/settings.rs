//! Connection tunables: serde payload from the embedder's configuration
//! layer, resolved into concrete timeouts and intervals.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─── Defaults ────────────────────────────────────────────────────────

pub const DEFAULT_THREAD_TERMINATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECTION_RETRY_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_MESSAGE_WAIT_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_FAST_FRAMEBUFFER_UPDATE_INTERVAL_MS: u64 = 100;
pub const DEFAULT_FRAMEBUFFER_UPDATE_WATCHDOG_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SOCKET_KEEPALIVE_IDLE_TIME_MS: u64 = 1_000;
pub const DEFAULT_SOCKET_KEEPALIVE_INTERVAL_MS: u64 = 500;
pub const DEFAULT_SOCKET_KEEPALIVE_COUNT: u32 = 5;
pub const DEFAULT_SERVER_PORT: u16 = 5900;

// ─── Payload (embedder-facing, all fields optional) ──────────────────

/// Raw tunables as supplied by a configuration layer. Every field is
/// optional; `resolve()` fills in the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VncSettingsPayload {
    pub thread_termination_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub connection_retry_interval_ms: Option<u64>,
    pub message_wait_timeout_ms: Option<u64>,
    pub fast_framebuffer_update_interval_ms: Option<u64>,
    pub framebuffer_update_watchdog_timeout_ms: Option<u64>,
    pub socket_keepalive_idle_time_ms: Option<u64>,
    pub socket_keepalive_interval_ms: Option<u64>,
    pub socket_keepalive_count: Option<u32>,
    pub default_port: Option<u16>,
}

impl VncSettingsPayload {
    pub fn resolve(&self) -> ConnectionTunables {
        let ms = Duration::from_millis;
        ConnectionTunables {
            thread_termination_timeout: ms(self
                .thread_termination_timeout_ms
                .unwrap_or(DEFAULT_THREAD_TERMINATION_TIMEOUT_MS)),
            connect_timeout: ms(self.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS)),
            read_timeout: ms(self.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS)),
            connection_retry_interval: ms(self
                .connection_retry_interval_ms
                .unwrap_or(DEFAULT_CONNECTION_RETRY_INTERVAL_MS)),
            message_wait_timeout: ms(self
                .message_wait_timeout_ms
                .unwrap_or(DEFAULT_MESSAGE_WAIT_TIMEOUT_MS)),
            fast_framebuffer_update_interval: ms(self
                .fast_framebuffer_update_interval_ms
                .unwrap_or(DEFAULT_FAST_FRAMEBUFFER_UPDATE_INTERVAL_MS)),
            framebuffer_update_watchdog_timeout: ms(self
                .framebuffer_update_watchdog_timeout_ms
                .unwrap_or(DEFAULT_FRAMEBUFFER_UPDATE_WATCHDOG_TIMEOUT_MS)),
            socket_keepalive_idle_time: ms(self
                .socket_keepalive_idle_time_ms
                .unwrap_or(DEFAULT_SOCKET_KEEPALIVE_IDLE_TIME_MS)),
            socket_keepalive_interval: ms(self
                .socket_keepalive_interval_ms
                .unwrap_or(DEFAULT_SOCKET_KEEPALIVE_INTERVAL_MS)),
            socket_keepalive_count: self
                .socket_keepalive_count
                .unwrap_or(DEFAULT_SOCKET_KEEPALIVE_COUNT),
            default_port: self.default_port.unwrap_or(DEFAULT_SERVER_PORT),
        }
    }
}

// ─── Resolved tunables ───────────────────────────────────────────────

/// Concrete tunables a session runs with. Fixed after construction; the
/// only runtime-mutable timing value is the framebuffer update interval,
/// which lives on the session itself.
#[derive(Debug, Clone)]
pub struct ConnectionTunables {
    pub thread_termination_timeout: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub connection_retry_interval: Duration,
    pub message_wait_timeout: Duration,
    /// Update interval embedders use for live-view ("monitoring") mode.
    pub fast_framebuffer_update_interval: Duration,
    pub framebuffer_update_watchdog_timeout: Duration,
    pub socket_keepalive_idle_time: Duration,
    pub socket_keepalive_interval: Duration,
    pub socket_keepalive_count: u32,
    pub default_port: u16,
}

impl Default for ConnectionTunables {
    fn default() -> Self {
        VncSettingsPayload::default().resolve()
    }
}

//! Shared types for the VNC engine: session states, quality levels and
//! the events published to observers.

use serde::{Deserialize, Serialize};

// ─── Session state ───────────────────────────────────────────────────

/// Lifecycle state of a VNC session.
///
/// Failure states are best-effort classifications of why the last
/// connect attempt did not succeed; they drive UX, not control flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum VncState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    HostOffline = 3,
    ServerNotRunning = 4,
    AuthenticationFailed = 5,
    ConnectionFailed = 6,
}

impl VncState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::HostOffline,
            4 => Self::ServerNotRunning,
            5 => Self::AuthenticationFailed,
            6 => Self::ConnectionFailed,
            _ => Self::Disconnected,
        }
    }

    /// `true` for the states that represent a failed connect attempt.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::HostOffline
                | Self::ServerNotRunning
                | Self::AuthenticationFailed
                | Self::ConnectionFailed
        )
    }
}

// ─── Framebuffer state ───────────────────────────────────────────────

/// Validity of the shared framebuffer.
///
/// `Invalid` on construction and after tear-down, `Initialized` once the
/// backing store is allocated and the pixel format negotiated, `Valid`
/// after the first complete framebuffer update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum FramebufferState {
    Invalid = 0,
    Initialized = 1,
    Valid = 2,
}

impl FramebufferState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Initialized,
            2 => Self::Valid,
            _ => Self::Invalid,
        }
    }
}

// ─── Quality ─────────────────────────────────────────────────────────

/// User-selected stream quality; maps onto an encoding profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum VncQuality {
    Highest = 0,
    High = 1,
    Medium = 2,
    Low = 3,
    Lowest = 4,
}

impl Default for VncQuality {
    fn default() -> Self {
        Self::High
    }
}

impl VncQuality {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Highest,
            2 => Self::Medium,
            3 => Self::Low,
            4 => Self::Lowest,
            _ => Self::High,
        }
    }
}

// ─── Cursor ──────────────────────────────────────────────────────────

/// A decoded remote cursor shape: hotspot plus RGBA pixels (the 1-bit
/// mask from the wire is folded into the alpha channel).
#[derive(Debug, Clone, Serialize)]
pub struct CursorShape {
    pub hot_x: i32,
    pub hot_y: i32,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

// ─── Events published to observers ───────────────────────────────────

/// Events fired from the session thread to registered observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VncSessionEvent {
    /// A fresh codec client has been built and wired; initialisation is
    /// about to start.
    ConnectionPrepared,
    StateChanged { state: VncState },
    FramebufferSizeChanged { width: u32, height: u32 },
    ImageUpdated { x: i32, y: i32, width: i32, height: i32 },
    FramebufferUpdateComplete,
    CursorPosChanged { x: i32, y: i32 },
    CursorShapeUpdated { cursor: CursorShape },
    GotCut { text: String },
    SizeHintChanged { width: u32, height: u32 },
}

//! VNC-specific error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised VNC error.
///
/// Connection lifecycle failures are reported through the session state
/// observable; `VncError` carries the detail for the codec boundary and
/// for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VncError {
    pub kind: VncErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VncErrorKind {
    /// Host did not answer a ping; presumed offline.
    Unreachable,
    /// Host is up but nothing accepted the connection on the VNC port.
    ServerNotRunning,
    /// Server rejected the credentials during the RFB security handshake.
    AuthenticationFailed,
    /// Server violated the negotiated protocol (e.g. wrong pixel depth).
    ProtocolFailure,
    /// Connection failed for an uncategorised reason.
    ConnectionFailed,
    /// An I/O error on the underlying socket.
    Io,
    /// Operation timed out.
    Timeout,
}

pub type VncResult<T> = Result<T, VncError>;

impl VncError {
    pub fn new(kind: VncErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::new(VncErrorKind::ProtocolFailure, msg)
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(VncErrorKind::ConnectionFailed, msg)
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(VncErrorKind::AuthenticationFailed, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(VncErrorKind::Io, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(VncErrorKind::Timeout, msg)
    }
}

impl fmt::Display for VncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for VncError {}

impl From<std::io::Error> for VncError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = VncError::protocol("bits per pixel does not match");
        assert_eq!(
            err.to_string(),
            "ProtocolFailure: bits per pixel does not match"
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: VncError = io.into();
        assert_eq!(err.kind, VncErrorKind::Io);
    }
}

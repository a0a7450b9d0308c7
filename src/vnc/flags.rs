//! Atomic control bitset shared between the session thread and callers.

use std::sync::atomic::{AtomicU32, Ordering};

/// Cross-thread control signals. Each flag is a single bit in one
/// `AtomicU32`; setting or clearing one never disturbs the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ControlFlag {
    ScaledFramebufferNeedsUpdate = 0x01,
    ServerReachable = 0x02,
    TerminateThread = 0x04,
    RestartConnection = 0x08,
    DeleteAfterFinished = 0x10,
    SkipHostPing = 0x20,
    RequiresManualUpdateRateControl = 0x40,
    TriggerFramebufferUpdate = 0x80,
}

#[derive(Debug, Default)]
pub struct ControlFlags(AtomicU32);

impl ControlFlags {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn set(&self, flag: ControlFlag, on: bool) {
        if on {
            self.0.fetch_or(flag as u32, Ordering::SeqCst);
        } else {
            self.0.fetch_and(!(flag as u32), Ordering::SeqCst);
        }
    }

    pub fn is_set(&self, flag: ControlFlag) -> bool {
        self.0.load(Ordering::SeqCst) & flag as u32 != 0
    }

    /// Atomically clear the flag, returning whether it was set.
    pub fn take(&self, flag: ControlFlag) -> bool {
        self.0.fetch_and(!(flag as u32), Ordering::SeqCst) & flag as u32 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_independent() {
        let flags = ControlFlags::new();
        flags.set(ControlFlag::TerminateThread, true);
        flags.set(ControlFlag::ServerReachable, true);
        flags.set(ControlFlag::ServerReachable, false);

        assert!(flags.is_set(ControlFlag::TerminateThread));
        assert!(!flags.is_set(ControlFlag::ServerReachable));
        assert!(!flags.is_set(ControlFlag::RestartConnection));
    }

    #[test]
    fn take_clears_and_reports() {
        let flags = ControlFlags::new();
        flags.set(ControlFlag::TriggerFramebufferUpdate, true);

        assert!(flags.take(ControlFlag::TriggerFramebufferUpdate));
        assert!(!flags.take(ControlFlag::TriggerFramebufferUpdate));
    }
}

pub mod vnc;

pub use vnc::client::{
    ClientConfig, FramebufferSetup, PixelLayout, RfbClient, RfbClientFactory, RfbHooks,
    ServerPixelFormat,
};
pub use vnc::error::{VncError, VncErrorKind, VncResult};
pub use vnc::framebuffer::{FrameImage, FrameSurface};
pub use vnc::host::HostAddress;
pub use vnc::quality::EncodingProfile;
pub use vnc::queue::VncCommand;
pub use vnc::session::{TaskExecutor, VncSession};
pub use vnc::settings::{ConnectionTunables, VncSettingsPayload};
pub use vnc::stats::SessionStatsSnapshot;
pub use vnc::types::{CursorShape, FramebufferState, VncQuality, VncSessionEvent, VncState};

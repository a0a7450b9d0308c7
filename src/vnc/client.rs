//! Codec boundary.
//!
//! The engine does not implement the RFB wire format; an external codec
//! library is plugged in through `RfbClient`/`RfbClientFactory`. The
//! codec reports server activity back through the `RfbHooks` callback
//! surface, which the engine implements in `hooks`.

use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use super::error::VncError;
use super::framebuffer::FrameSurface;
use super::quality::EncodingProfile;

pub const RFB_BITS_PER_SAMPLE: u8 = 8;
pub const RFB_SAMPLES_PER_PIXEL: u8 = 3;
pub const RFB_BYTES_PER_PIXEL: u8 = 4;

// ─── Pixel formats ───────────────────────────────────────────────────

/// Pixel format announced by the server during initialisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_colour: bool,
}

/// Client-side layout programmed back to the server after framebuffer
/// allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
}

impl PixelLayout {
    /// The engine's fixed layout: 8-bit R/G/B at shifts 16/8/0.
    pub fn rgb32() -> Self {
        Self {
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
            red_max: 0xff,
            green_max: 0xff,
            blue_max: 0xff,
        }
    }
}

/// Everything the codec needs after a successful framebuffer
/// initialisation: where to decode into, which pixel layout to program,
/// and which encodings to request.
pub struct FramebufferSetup {
    pub surface: FrameSurface,
    pub layout: PixelLayout,
    pub encodings: EncodingProfile,
    pub use_remote_cursor: bool,
}

// ─── Callback surface (engine-implemented) ───────────────────────────

/// Callbacks the codec invokes while processing server messages. All of
/// them are called on the session thread.
pub trait RfbHooks: Send + Sync {
    /// Server announced (or re-announced) the framebuffer geometry.
    /// Returns `None` to fail the connection (e.g. unsupported pixel
    /// depth); otherwise the codec decodes into the returned surface.
    fn init_framebuffer(
        &self,
        width: u32,
        height: u32,
        format: &ServerPixelFormat,
    ) -> Option<FramebufferSetup>;

    /// A rectangle of the framebuffer has been updated in place.
    fn framebuffer_updated(&self, x: i32, y: i32, width: i32, height: i32);

    /// The current update batch is complete.
    fn framebuffer_update_finished(&self);

    fn cursor_moved(&self, x: i32, y: i32);

    /// New cursor shape: RGB pixmap in the engine's 32-bit layout plus
    /// the wire's 1-bit mask expanded to one byte per pixel (non-zero =
    /// opaque).
    fn cursor_shape_changed(
        &self,
        hot_x: i32,
        hot_y: i32,
        width: u32,
        height: u32,
        bytes_per_pixel: u8,
        pixels: &[u8],
        mask: &[u8],
    );

    /// Clipboard text pushed by the server, UTF-8 on the wire.
    fn server_cut_text(&self, text: &[u8]);

    /// Codec-internal log line.
    fn protocol_message(&self, message: &str);
}

// ─── Codec client (externally implemented) ───────────────────────────

/// One codec client per connect attempt. Used exclusively from the
/// session thread; dropping it releases all codec resources.
pub trait RfbClient: Send {
    /// Run the RFB handshake through to readiness for normal protocol
    /// traffic. Invokes `RfbHooks::init_framebuffer` on the way.
    fn init(&mut self) -> Result<(), VncError>;

    /// Wait up to `timeout` for an inbound message. `Ok(true)` means a
    /// message is ready, `Ok(false)` a timeout, `Err` a fatal socket
    /// error.
    fn wait_for_message(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Process one pending server message, invoking hooks as needed.
    /// `false` signals a protocol or I/O failure.
    fn handle_server_message(&mut self) -> bool;

    /// Current framebuffer geometry as negotiated with the server.
    fn framebuffer_size(&self) -> (u32, u32);

    fn send_framebuffer_update_request(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        incremental: bool,
    ) -> bool;

    fn send_incremental_framebuffer_update_request(&mut self) -> bool;

    fn send_pointer_event(&mut self, x: u16, y: u16, button_mask: u8) -> bool;

    fn send_key_event(&mut self, keysym: u32, pressed: bool) -> bool;

    fn send_client_cut_text(&mut self, text: &str) -> bool;

    /// Re-send SetPixelFormat/SetEncodings with the given profile.
    fn update_format_and_encodings(
        &mut self,
        profile: &EncodingProfile,
        use_remote_cursor: bool,
    ) -> bool;

    /// Raw passthrough for feature layers tunnelling over the RFB
    /// socket.
    fn read_from_server(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_to_server(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// The underlying TCP stream, if connected; used for keepalive
    /// configuration.
    fn stream(&self) -> Option<&TcpStream>;
}

/// Per-attempt connection parameters handed to the factory.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

/// Builds a fresh codec client for every connect attempt.
pub trait RfbClientFactory: Send + Sync {
    fn create(&self, config: &ClientConfig, hooks: Arc<dyn RfbHooks>) -> Box<dyn RfbClient>;
}

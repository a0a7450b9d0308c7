//! Adapter between the codec's callback surface and the session.
//!
//! The codec holds this adapter for the lifetime of a client; the
//! session it belongs to is reached through a locked weak reference.
//! During shutdown the session clears the reference, so callbacks
//! arriving late degrade to no-ops instead of touching freed state.

use std::sync::{Arc, Mutex, Weak};

use super::client::{
    FramebufferSetup, PixelLayout, RfbHooks, ServerPixelFormat, RFB_BITS_PER_SAMPLE,
    RFB_BYTES_PER_PIXEL,
};
use super::flags::ControlFlag;
use super::quality::EncodingProfile;
use super::session::SessionShared;
use super::types::{CursorShape, FramebufferState, VncSessionEvent};

pub(crate) struct HookAdapter {
    owner: Mutex<Weak<SessionShared>>,
}

impl HookAdapter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            owner: Mutex::new(Weak::new()),
        })
    }

    pub(crate) fn bind(&self, owner: &Arc<SessionShared>) {
        *self.owner.lock().unwrap() = Arc::downgrade(owner);
    }

    /// Shutdown race shield: after this, every callback is a no-op.
    pub(crate) fn unbind(&self) {
        *self.owner.lock().unwrap() = Weak::new();
    }

    fn owner(&self) -> Option<Arc<SessionShared>> {
        self.owner.lock().unwrap().upgrade()
    }
}

impl RfbHooks for HookAdapter {
    fn init_framebuffer(
        &self,
        width: u32,
        height: u32,
        format: &ServerPixelFormat,
    ) -> Option<FramebufferSetup> {
        let owner = self.owner()?;

        if format.bits_per_pixel != RFB_BITS_PER_SAMPLE * RFB_BYTES_PER_PIXEL {
            log::error!(
                "server pixel format has {} bits per pixel, expected 32",
                format.bits_per_pixel
            );
            return None;
        }

        let surface = owner.framebuffer.allocate(width, height);
        owner.set_framebuffer_state(FramebufferState::Initialized);

        owner.emit(&VncSessionEvent::FramebufferSizeChanged { width, height });
        owner.emit(&VncSessionEvent::SizeHintChanged { width, height });

        Some(FramebufferSetup {
            surface,
            layout: PixelLayout::rgb32(),
            encodings: EncodingProfile::for_quality(owner.quality()),
            use_remote_cursor: owner.use_remote_cursor(),
        })
    }

    fn framebuffer_updated(&self, x: i32, y: i32, width: i32, height: i32) {
        if let Some(owner) = self.owner() {
            owner
                .stats
                .regions_updated
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            owner.emit(&VncSessionEvent::ImageUpdated {
                x,
                y,
                width,
                height,
            });
        }
    }

    fn framebuffer_update_finished(&self) {
        if let Some(owner) = self.owner() {
            owner.restart_update_watchdog();
            owner.set_framebuffer_state(FramebufferState::Valid);
            owner
                .flags
                .set(ControlFlag::ScaledFramebufferNeedsUpdate, true);
            owner
                .stats
                .updates_completed
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            owner.emit(&VncSessionEvent::FramebufferUpdateComplete);
        }
    }

    fn cursor_moved(&self, x: i32, y: i32) {
        if let Some(owner) = self.owner() {
            owner.emit(&VncSessionEvent::CursorPosChanged { x, y });
        }
    }

    fn cursor_shape_changed(
        &self,
        hot_x: i32,
        hot_y: i32,
        width: u32,
        height: u32,
        bytes_per_pixel: u8,
        pixels: &[u8],
        mask: &[u8],
    ) {
        if bytes_per_pixel != RFB_BYTES_PER_PIXEL {
            log::warn!("cursor shape has {bytes_per_pixel} bytes per pixel, expected 4");
            return;
        }

        let Some(owner) = self.owner() else {
            return;
        };

        let pixel_count = width as usize * height as usize;
        if pixels.len() < pixel_count * 4 || mask.len() < pixel_count {
            log::warn!("cursor shape payload shorter than {width}x{height}");
            return;
        }

        let mut rgba = Vec::with_capacity(pixel_count * 4);
        for i in 0..pixel_count {
            let p = u32::from_ne_bytes(pixels[i * 4..i * 4 + 4].try_into().unwrap());
            rgba.push((p >> 16) as u8);
            rgba.push((p >> 8) as u8);
            rgba.push(p as u8);
            rgba.push(if mask[i] != 0 { 0xff } else { 0 });
        }

        owner.emit(&VncSessionEvent::CursorShapeUpdated {
            cursor: CursorShape {
                hot_x,
                hot_y,
                width,
                height,
                rgba,
            },
        });
    }

    fn server_cut_text(&self, text: &[u8]) {
        let Some(owner) = self.owner() else {
            return;
        };
        let text = String::from_utf8_lossy(text);
        if !text.is_empty() {
            owner.emit(&VncSessionEvent::GotCut {
                text: text.into_owned(),
            });
        }
    }

    fn protocol_message(&self, message: &str) {
        if let Some(owner) = self.owner() {
            if owner.protocol_logging_enabled() {
                log::debug!("rfb: {message}");
            }
        }
    }
}

//! Shared framebuffer store.
//!
//! The session thread is the only writer of pixel memory; any thread may
//! take snapshots. The backing allocation is reference-counted so a
//! snapshot stays readable even after the server announces a resize and
//! the store swaps in a fresh allocation.

use std::sync::{Arc, Mutex, RwLock};

use image::imageops::{self, FilterType};
use image::RgbaImage;

/// 32-bit pixel, R/G/B at shifts 16/8/0, top byte unused.
pub type Pixel = u32;

// ─── Writer handle (codec-facing) ────────────────────────────────────

/// Write access to the current backing store, handed to the codec at
/// framebuffer initialisation so decoded rectangles land directly in
/// shared memory.
#[derive(Clone)]
pub struct FrameSurface {
    pixels: Arc<RwLock<Vec<Pixel>>>,
    width: u32,
    height: u32,
}

impl FrameSurface {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Blit a decoded rectangle. Rows outside the surface and source
    /// shortfalls are clipped rather than panicking.
    pub fn write_rect(&self, x: u32, y: u32, w: u32, h: u32, data: &[Pixel]) {
        if w == 0 || h == 0 || x >= self.width || y >= self.height {
            return;
        }
        let copy_w = w.min(self.width - x) as usize;
        let copy_h = h.min(self.height - y) as usize;

        let mut pixels = self.pixels.write().unwrap();
        for row in 0..copy_h {
            let src_start = row * w as usize;
            let src_end = src_start + copy_w;
            if src_end > data.len() {
                break;
            }
            let dst_start = (y as usize + row) * self.width as usize + x as usize;
            pixels[dst_start..dst_start + copy_w].copy_from_slice(&data[src_start..src_end]);
        }
    }

    pub fn fill(&self, value: Pixel) {
        let mut pixels = self.pixels.write().unwrap();
        pixels.fill(value);
    }
}

// ─── Snapshot handle (reader-facing) ─────────────────────────────────

/// A shared-ownership view of the framebuffer at snapshot time. Keeps
/// the underlying allocation alive across reallocation.
#[derive(Clone)]
pub struct FrameImage {
    backing: Option<Arc<RwLock<Vec<Pixel>>>>,
    width: u32,
    height: u32,
}

impl FrameImage {
    pub fn empty() -> Self {
        Self {
            backing: None,
            width: 0,
            height: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_null(&self) -> bool {
        self.backing.is_none() || self.width == 0 || self.height == 0
    }

    /// Copy of the pixel data.
    pub fn pixels(&self) -> Vec<Pixel> {
        match &self.backing {
            Some(backing) => backing.read().unwrap().clone(),
            None => Vec::new(),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.backing
            .as_ref()
            .map(|b| b.read().unwrap()[y as usize * self.width as usize + x as usize])
    }

    /// Convert to an RGBA image (alpha forced opaque).
    pub fn to_rgba(&self) -> RgbaImage {
        let Some(backing) = &self.backing else {
            return RgbaImage::new(0, 0);
        };
        let pixels = backing.read().unwrap();
        let mut rgba = Vec::with_capacity(pixels.len() * 4);
        for p in pixels.iter() {
            rgba.push((p >> 16) as u8);
            rgba.push((p >> 8) as u8);
            rgba.push(*p as u8);
            rgba.push(0xff);
        }
        RgbaImage::from_raw(self.width, self.height, rgba)
            .unwrap_or_else(|| RgbaImage::new(0, 0))
    }
}

// ─── Store ───────────────────────────────────────────────────────────

struct Backing {
    pixels: Arc<RwLock<Vec<Pixel>>>,
    width: u32,
    height: u32,
}

/// Owns the pixel backing store plus the lazily-computed scaled view.
/// The outer lock guards replacement of the backing allocation; pixel
/// contents are guarded by the inner per-allocation lock.
pub(crate) struct FrameStore {
    backing: RwLock<Option<Backing>>,
    scaled: Mutex<Option<RgbaImage>>,
}

impl FrameStore {
    pub(crate) fn new() -> Self {
        Self {
            backing: RwLock::new(None),
            scaled: Mutex::new(None),
        }
    }

    /// Swap in a fresh zeroed allocation and return the writer handle.
    pub(crate) fn allocate(&self, width: u32, height: u32) -> FrameSurface {
        let pixels = Arc::new(RwLock::new(vec![0u32; width as usize * height as usize]));
        let surface = FrameSurface {
            pixels: Arc::clone(&pixels),
            width,
            height,
        };
        *self.backing.write().unwrap() = Some(Backing {
            pixels,
            width,
            height,
        });
        surface
    }

    pub(crate) fn invalidate(&self) {
        *self.backing.write().unwrap() = None;
    }

    pub(crate) fn size(&self) -> Option<(u32, u32)> {
        self.backing
            .read()
            .unwrap()
            .as_ref()
            .map(|b| (b.width, b.height))
    }

    pub(crate) fn snapshot(&self) -> FrameImage {
        match self.backing.read().unwrap().as_ref() {
            Some(b) => FrameImage {
                backing: Some(Arc::clone(&b.pixels)),
                width: b.width,
                height: b.height,
            },
            None => FrameImage::empty(),
        }
    }

    /// Recompute the scaled view with smooth (bilinear) resampling,
    /// aspect ratio ignored. Returns false when there is no backing.
    pub(crate) fn rescale_to(&self, width: u32, height: u32) -> bool {
        let snapshot = self.snapshot();
        if snapshot.is_null() {
            return false;
        }
        let scaled = imageops::resize(&snapshot.to_rgba(), width, height, FilterType::Triangle);
        *self.scaled.lock().unwrap() = Some(scaled);
        true
    }

    pub(crate) fn scaled(&self) -> Option<RgbaImage> {
        self.scaled.lock().unwrap().clone()
    }

    pub(crate) fn clear_scaled(&self) {
        *self.scaled.lock().unwrap() = None;
    }
}

//! Frame snapshots.
//!
//! A `FrameBuffer` is an immutable snapshot of one capture tick: RGBA pixel
//! data plus a monotonic timestamp measured from the session epoch. The frame
//! differencer owns at most one of these as its comparison baseline and
//! supersedes (never mutates) it each tick.

use std::time::Duration;

/// Bytes per pixel. Frames are RGBA regardless of what the source decodes.
pub const BYTES_PER_PIXEL: usize = 4;

/// One captured frame.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    /// RGBA channel data, `width * height * 4` bytes, row-major.
    pixels: Vec<u8>,
    /// Monotonic capture time relative to the session epoch.
    pub timestamp: Duration,
}

impl FrameBuffer {
    /// Create a frame from RGBA pixel data.
    ///
    /// Returns `None` if the buffer length does not match the dimensions;
    /// sources that hand over short reads must drop the frame, not pad it.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>, timestamp: Duration) -> Option<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
            timestamp,
        })
    }

    /// A uniformly filled frame. Used by synthetic sources and tests.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4], timestamp: Duration) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * BYTES_PER_PIXEL);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels,
            timestamp,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True when `other` has the same dimensions, i.e. the two frames are
    /// comparable pixel-for-pixel.
    pub fn same_shape(&self, other: &FrameBuffer) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Overwrite the RGBA value of one pixel. Synthetic scene generation and
    /// test fixtures only; captured frames are never edited in place.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.pixels[idx..idx + BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    /// Fill an axis-aligned rectangle. Coordinates are clamped to the frame.
    pub fn fill_rect(&mut self, left: u32, top: u32, width: u32, height: u32, rgba: [u8; 4]) {
        let right = left.saturating_add(width).min(self.width);
        let bottom = top.saturating_add(height).min(self.height);
        for y in top.min(self.height)..bottom {
            for x in left.min(self.width)..right {
                self.put_pixel(x, y, rgba);
            }
        }
    }
}

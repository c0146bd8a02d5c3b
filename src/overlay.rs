//! Tracking overlay rendering.
//!
//! Pure output: paints a tracking marker at the centroid, the speed readout,
//! the detection counter, and a full-width alert banner on violation ticks.
//! Consumes the differ/tracker outputs verbatim and has no decision
//! authority. Text uses a built-in 5x7 bitmap font; the glyph set covers only
//! the characters the overlay emits.

use crate::frame::{FrameBuffer, BYTES_PER_PIXEL};
use crate::motion::TickReading;

const MARKER_COLOR: [u8; 4] = [59, 130, 246, 255];
const MARKER_RADIUS: f32 = 50.0;
const MARKER_STROKE: f32 = 4.0;
const BANNER_COLOR: [u8; 3] = [255, 0, 0];
const BANNER_ALPHA: u8 = 102; // 0.4
const BANNER_HEIGHT: u32 = 150;
const TEXT_COLOR: [u8; 4] = [255, 255, 255, 255];
const GLYPH_ADVANCE: i32 = 6;

/// Owned RGBA drawing surface, resized to match the active source.
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Match the surface to the source's reported dimensions. Contents are
    /// discarded; the next blit repaints everything.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (self.width, self.height) == (width, height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize * BYTES_PER_PIXEL];
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some([
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ])
    }

    fn put(&mut self, x: i32, y: i32, rgba: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.pixels[idx..idx + BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    fn blend(&mut self, x: i32, y: i32, rgb: [u8; 3], alpha: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let a = alpha as u32;
        for c in 0..3 {
            let src = rgb[c] as u32;
            let dst = self.pixels[idx + c] as u32;
            self.pixels[idx + c] = ((src * a + dst * (255 - a)) / 255) as u8;
        }
        self.pixels[idx + 3] = 255;
    }

    /// Copy a frame onto the surface. The surface must already be sized to
    /// the frame; mismatches repaint nothing.
    pub fn blit(&mut self, frame: &FrameBuffer) {
        if (frame.width, frame.height) != (self.width, self.height) {
            return;
        }
        self.pixels.copy_from_slice(frame.pixels());
    }

    pub fn fill_rect(&mut self, left: i32, top: i32, right: i32, bottom: i32, rgba: [u8; 4]) {
        for y in top.max(0)..bottom.min(self.height as i32) {
            for x in left.max(0)..right.min(self.width as i32) {
                self.put(x, y, rgba);
            }
        }
    }

    pub fn blend_rect(&mut self, left: i32, top: i32, right: i32, bottom: i32, rgb: [u8; 3], alpha: u8) {
        for y in top.max(0)..bottom.min(self.height as i32) {
            for x in left.max(0)..right.min(self.width as i32) {
                self.blend(x, y, rgb, alpha);
            }
        }
    }

    /// Ring of the given radius and stroke width, clipped to the surface.
    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, stroke: f32, rgba: [u8; 4]) {
        let outer = radius + stroke / 2.0;
        let inner = radius - stroke / 2.0;
        let left = (cx - outer).floor() as i32;
        let right = (cx + outer).ceil() as i32;
        let top = (cy - outer).floor() as i32;
        let bottom = (cy + outer).ceil() as i32;

        for y in top..=bottom {
            for x in left..=right {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist >= inner && dist <= outer {
                    self.put(x, y, rgba);
                }
            }
        }
    }

    /// 5x7 bitmap text, uppercased. Unknown characters advance silently.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, rgba: [u8; 4]) {
        let mut pen = x;
        for ch in text.chars().flat_map(|c| c.to_uppercase()) {
            if let Some(glyph) = glyph_bits(ch) {
                for (row, pattern) in glyph.iter().enumerate() {
                    for col in 0..5 {
                        if (pattern >> (4 - col)) & 1 == 1 {
                            self.put(pen + col, y + row as i32, rgba);
                        }
                    }
                }
            }
            pen += GLYPH_ADVANCE;
        }
    }
}

/// Paints one tick's annotations over the blitted frame.
pub struct Overlay {
    surface: Surface,
}

impl Overlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: Surface::new(width, height),
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Resize (on source dimension change) and blit the tick's frame.
    pub fn begin_tick(&mut self, frame: &FrameBuffer) {
        self.surface.resize(frame.width, frame.height);
        self.surface.blit(frame);
    }

    /// Draw the tick's annotations: marker + label at the centroid, speed
    /// readout top-right, detection counter bottom-right, and the alert
    /// banner when this tick emitted a violation.
    pub fn paint(&mut self, centroid: Option<(f32, f32)>, reading: &TickReading) {
        if let Some((cx, cy)) = centroid {
            self.surface
                .stroke_circle(cx, cy, MARKER_RADIUS, MARKER_STROKE, MARKER_COLOR);
            self.surface.draw_text(
                (cx + MARKER_RADIUS + 10.0) as i32,
                cy as i32 - 3,
                "TARGET LOCK",
                MARKER_COLOR,
            );
        }

        let (width, height) = self.surface.dimensions();
        let speed_text = format!("{} KM/H", reading.speed_kmh);
        let speed_x = width as i32 - speed_text.len() as i32 * GLYPH_ADVANCE - 8;
        self.surface.draw_text(speed_x, 8, &speed_text, TEXT_COLOR);

        let count_text = format!("DET {}", reading.detections);
        let count_x = width as i32 - count_text.len() as i32 * GLYPH_ADVANCE - 8;
        self.surface
            .draw_text(count_x, height as i32 - 15, &count_text, TEXT_COLOR);

        if reading.violation.is_some() {
            self.surface.blend_rect(
                0,
                0,
                width as i32,
                BANNER_HEIGHT.min(height) as i32,
                BANNER_COLOR,
                BANNER_ALPHA,
            );
            self.surface
                .draw_text(40, 70, "VIOLATION LOGGED", TEXT_COLOR);
        }
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
        'C' => Some([0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110]),
        'D' => Some([0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110]),
        'E' => Some([0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111]),
        'G' => Some([0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111]),
        'H' => Some([0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
        'I' => Some([0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        'K' => Some([0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001]),
        'L' => Some([0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111]),
        'M' => Some([0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001]),
        'N' => Some([0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001]),
        'O' => Some([0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
        'R' => Some([0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001]),
        'T' => Some([0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]),
        'V' => Some([0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100]),
        '0' => Some([0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
        '1' => Some([0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        '2' => Some([0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
        '3' => Some([0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110]),
        '4' => Some([0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
        '5' => Some([0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
        '6' => Some([0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
        '7' => Some([0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
        '8' => Some([0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
        '9' => Some([0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100]),
        '/' => Some([0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000]),
        _ => None,
    }
}

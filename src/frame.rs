//! Captured frames.
//!
//! - `Frame`: RGB24 pixel buffer with dimensions and a wall-clock capture time.
//!
//! Frames are ephemeral: the watcher keeps at most the previous and the current
//! frame alive. Everything downstream (motion gate, detector backends,
//! annotator) reads pixels through the accessors here, so the RGB24 layout is
//! validated once at construction.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use image::{DynamicImage, RgbImage};
use std::time::SystemTime;

/// Bytes per RGB24 pixel.
pub const RGB_CHANNELS: usize = 3;

/// Single captured frame in packed RGB24 order.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Wall-clock capture time, used for the snapshot annotation.
    pub captured_at: SystemTime,
}

impl Frame {
    /// Wrap an RGB24 buffer. Fails when the length does not match the dimensions.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            captured_at: SystemTime::now(),
        })
    }

    /// Frame filled with a single color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixel_count = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixel_count * RGB_CHANNELS);
        for _ in 0..pixel_count {
            data.extend_from_slice(&rgb);
        }
        Self {
            data,
            width,
            height,
            captured_at: SystemTime::now(),
        }
    }

    /// Convert a decoded image into a frame.
    pub fn from_image(image: DynamicImage) -> Self {
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        Self {
            data: rgb.into_raw(),
            width,
            height,
            captured_at: SystemTime::now(),
        }
    }

    /// Override the capture timestamp.
    pub fn with_timestamp(mut self, captured_at: SystemTime) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Capture time in the local timezone.
    pub fn captured_at_local(&self) -> DateTime<Local> {
        DateTime::<Local>::from(self.captured_at)
    }

    /// Intensity-only copy of the frame, one byte per pixel.
    ///
    /// Uses BT.601 weights in 14-bit fixed point, rounding to nearest.
    pub fn luma(&self) -> Vec<u8> {
        self.data
            .chunks_exact(RGB_CHANNELS)
            .map(|px| luma_of(px[0], px[1], px[2]))
            .collect()
    }

    /// Copy the frame into an `image` buffer (for encoding and resizing).
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .context("frame buffer does not match its dimensions")
    }

    /// Fill an axis-aligned rectangle, clipped to the frame bounds.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        let stride = self.width as usize * RGB_CHANNELS;
        for row in y.min(self.height)..y_end {
            let row_start = row as usize * stride;
            for col in x.min(self.width)..x_end {
                let offset = row_start + col as usize * RGB_CHANNELS;
                self.data[offset..offset + RGB_CHANNELS].copy_from_slice(&rgb);
            }
        }
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn luma_of(r: u8, g: u8, b: u8) -> u8 {
    let y = r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868;
    ((y + (1 << 13)) >> 14) as u8
}

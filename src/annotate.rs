//! Snapshot annotation and JPEG output.
//!
//! The timestamp is drawn with a small built-in 5x7 bitmap font scaled up by
//! an integer factor, so no font files are needed on the device.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::frame::Frame;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DEFAULT_SNAPSHOT_PATH: &str = "motion_detected.jpg";
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const GLYPH_ADVANCE: u32 = GLYPH_W + 1;

/// Format a timestamp the way it is stamped on snapshots.
pub fn timestamp_text(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Draws text into the top-right corner of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Annotator {
    pub scale: u32,
    pub color: [u8; 3],
    /// Gap between the text and the right edge.
    pub margin_right: u32,
    /// Row of the text baseline (bottom of the glyphs).
    pub baseline_y: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            scale: 3,
            color: [0, 255, 0],
            margin_right: 10,
            baseline_y: 30,
        }
    }
}

impl Annotator {
    pub fn text_width(&self, text: &str) -> u32 {
        let chars = text.chars().count() as u32;
        if chars == 0 {
            return 0;
        }
        (chars * GLYPH_ADVANCE - 1) * self.scale
    }

    pub fn text_height(&self) -> u32 {
        GLYPH_H * self.scale
    }

    /// Stamp the frame's capture time.
    pub fn stamp_timestamp(&self, frame: &mut Frame) -> String {
        let text = timestamp_text(frame.captured_at_local());
        self.stamp(frame, &text);
        text
    }

    /// Draw `text` right-aligned; anything past the frame edges is clipped.
    pub fn stamp(&self, frame: &mut Frame, text: &str) {
        let origin_x = frame
            .width
            .saturating_sub(self.text_width(text))
            .saturating_sub(self.margin_right);
        let origin_y = self.baseline_y.saturating_sub(self.text_height());

        for (i, ch) in text.chars().enumerate() {
            let glyph_x = origin_x + i as u32 * GLYPH_ADVANCE * self.scale;
            self.draw_glyph(frame, glyph(ch), glyph_x, origin_y);
        }
    }

    fn draw_glyph(&self, frame: &mut Frame, rows: [u8; 7], x: u32, y: u32) {
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                frame.fill_rect(
                    x + col * self.scale,
                    y + row as u32 * self.scale,
                    self.scale,
                    self.scale,
                    self.color,
                );
            }
        }
    }
}

fn glyph(ch: char) -> [u8; 7] {
    match ch {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        _ => [0; 7],
    }
}

/// Writes annotated frames to a fixed path on disk.
#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    path: PathBuf,
    quality: u8,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encode `frame` as JPEG, replacing any previous snapshot.
    pub fn write(&self, frame: &Frame) -> Result<&Path> {
        let rgb = frame.to_rgb_image()?;
        let file = File::create(&self.path)
            .with_context(|| format!("create snapshot {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, self.quality)
            .encode_image(&rgb)
            .with_context(|| format!("encode snapshot {}", self.path.display()))?;
        writer
            .flush()
            .with_context(|| format!("flush snapshot {}", self.path.display()))?;
        Ok(&self.path)
    }
}

impl Default for SnapshotWriter {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_PATH)
    }
}

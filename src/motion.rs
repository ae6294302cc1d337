use anyhow::{anyhow, Result};

use crate::frame::Frame;

/// Default per-pixel intensity cutoff for the binarized difference.
pub const DEFAULT_PIXEL_CUTOFF: u8 = 25;

/// Default number of changed pixels required to report motion.
pub const DEFAULT_AREA_THRESHOLD: usize = 10_000;

/// Frame-difference motion gate.
///
/// Both frames are reduced to luma, differenced per pixel, and binarized at
/// `pixel_cutoff`. Motion is reported when the changed area exceeds
/// `area_threshold`. The gate keeps no state between calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionGate {
    pub pixel_cutoff: u8,
    pub area_threshold: usize,
}

impl Default for MotionGate {
    fn default() -> Self {
        Self {
            pixel_cutoff: DEFAULT_PIXEL_CUTOFF,
            area_threshold: DEFAULT_AREA_THRESHOLD,
        }
    }
}

impl MotionGate {
    pub fn new(pixel_cutoff: u8, area_threshold: usize) -> Self {
        Self {
            pixel_cutoff,
            area_threshold,
        }
    }

    /// Number of pixels whose luma changed by more than the cutoff.
    pub fn motion_area(&self, previous: &Frame, current: &Frame) -> Result<usize> {
        if previous.width != current.width || previous.height != current.height {
            return Err(anyhow!(
                "frame size changed from {}x{} to {}x{}",
                previous.width,
                previous.height,
                current.width,
                current.height
            ));
        }

        let prev_luma = previous.luma();
        let cur_luma = current.luma();
        let area = prev_luma
            .iter()
            .zip(cur_luma.iter())
            .filter(|(a, b)| a.abs_diff(**b) > self.pixel_cutoff)
            .count();
        Ok(area)
    }

    /// Returns true when the changed area exceeds the threshold.
    pub fn detect(&self, previous: &Frame, current: &Frame) -> Result<bool> {
        let area = self.motion_area(previous, current)?;
        let moved = area > self.area_threshold;
        if moved {
            log::debug!("motion area: {} px (threshold {})", area, self.area_threshold);
        }
        Ok(moved)
    }
}

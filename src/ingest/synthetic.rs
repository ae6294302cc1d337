use anyhow::Result;

use super::{FrameSource, SourceStats};
use crate::config::CameraSettings;
use crate::frame::Frame;

/// Frames between simulated scene changes.
pub const DEFAULT_SCENE_PERIOD: u64 = 10;

/// Generated frames for `stub://` devices.
///
/// The background is a fixed gradient. Every `scene_period` frames a bright
/// block enters or leaves the scene, so consecutive frames are identical
/// except at scene changes.
pub struct SyntheticSource {
    settings: CameraSettings,
    scene_period: u64,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            scene_period: DEFAULT_SCENE_PERIOD,
            frame_count: 0,
            connected: false,
        }
    }

    pub fn with_scene_period(mut self, frames: u64) -> Self {
        self.scene_period = frames.max(1);
        self
    }

    fn render(&self) -> Result<Frame> {
        let width = self.settings.width;
        let height = self.settings.height;
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let shade = ((x + y) % 128) as u8;
                pixels.extend_from_slice(&[shade, shade / 2, 64]);
            }
        }
        let mut frame = Frame::from_rgb(pixels, width, height)?;

        let scene = self.frame_count / self.scene_period;
        if scene % 2 == 1 {
            frame.fill_rect(width / 3, height / 3, width / 3, height / 3, [240, 240, 240]);
        }
        Ok(frame)
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.settings.device,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let frame = self.render()?;
        self.frame_count += 1;
        Ok(frame)
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.settings.device.clone(),
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.connected = false;
        log::info!("SyntheticSource: stopped {}", self.settings.device);
        Ok(())
    }
}

//! V4L2 camera source.
//!
//! Opens a local device node (e.g. `/dev/video0`, including the Raspberry Pi
//! camera through its V4L2 driver), asks for RGB3 at the configured size,
//! and accepts YUYV when the driver refuses RGB. Frames are converted to
//! RGB24 before they leave this module.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceStats};
use crate::config::CameraSettings;
use crate::frame::Frame;

const STREAM_BUFFERS: u32 = 4;

/// V4L2 device source.
pub struct V4l2Source {
    settings: CameraSettings,
    state: Option<DeviceState>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            active_width: settings.width,
            active_height: settings.height,
            settings,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn negotiate(&mut self, device: &v4l::Device) -> Result<()> {
        use v4l::video::Capture;

        let mut requested = device.format().context("read v4l2 format")?;
        requested.width = self.settings.width;
        requested.height = self.settings.height;

        let mut accepted = None;
        for format in [PixelFormat::Rgb24, PixelFormat::Yuyv] {
            requested.fourcc = v4l::FourCC::new(format.fourcc());
            match device.set_format(&requested) {
                Ok(active) if PixelFormat::from_fourcc(&active.fourcc.repr) == Some(format) => {
                    accepted = Some((format, active));
                    break;
                }
                Ok(active) => log::debug!(
                    "V4l2Source: driver answered {} when asked for {:?}",
                    active.fourcc,
                    format
                ),
                Err(err) => log::warn!(
                    "V4l2Source: failed to set {:?} on {}: {}",
                    format,
                    self.settings.device,
                    err
                ),
            }
        }

        let (format, active) = accepted.ok_or_else(|| {
            anyhow!(
                "{} supports neither RGB3 nor YUYV capture",
                self.settings.device
            )
        })?;
        self.format = format;
        self.active_width = active.width;
        self.active_height = active.height;
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .context("capture v4l2 frame")?;
        let rgb = normalize_to_rgb(buf, self.active_width, self.active_height, self.format)?;
        Frame::from_rgb(rgb, self.active_width, self.active_height)
    }
}

impl FrameSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;

        // Release a previous stream before reopening; the device is exclusive.
        self.state = None;
        let device = v4l::Device::with_path(&self.settings.device)
            .with_context(|| format!("open v4l2 device {}", self.settings.device))?;
        self.negotiate(&device)?;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);
        self.last_error = None;

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            self.settings.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match self.capture() {
            Ok(frame) => {
                self.frame_count += 1;
                self.last_frame_at = Some(Instant::now());
                self.last_error = None;
                Ok(frame)
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= Duration::from_secs(30)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.settings.device.clone(),
        }
    }

    fn stop(&mut self) -> Result<()> {
        // Dropping the mmap stream issues STREAMOFF and unmaps the buffers.
        if self.state.take().is_some() {
            log::info!("V4l2Source: stopped {}", self.settings.device);
        }
        Ok(())
    }
}

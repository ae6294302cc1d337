//! Frame sources.
//!
//! - `SyntheticSource`: `stub://` devices, generated frames (testing, dry runs)
//! - `HttpSnapshotSource`: HTTP(S) JPEG snapshot or MJPEG endpoints
//! - `V4l2Source`: local USB/CSI cameras (feature: ingest-v4l2)
//!
//! All sources produce RGB24 `Frame`s. Sources do not retry on their own;
//! the watcher owns the retry policy for failed captures.

pub mod http;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::config::CameraSettings;
use crate::frame::Frame;

pub use http::HttpSnapshotSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Capture counters shared by every source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Something that yields one frame per poll.
pub trait FrameSource: Send {
    /// Open the device or endpoint.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;

    /// Release the device. Called once on shutdown.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Pick a source implementation from the configured device string.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let device = settings.device.as_str();
    if device.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())));
    }
    if device.starts_with("http://") || device.starts_with("https://") {
        return Ok(Box::new(HttpSnapshotSource::new(settings.clone())?));
    }
    open_device(settings, device)
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(settings: &CameraSettings, _device: &str) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(settings.clone())))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(_settings: &CameraSettings, device: &str) -> Result<Box<dyn FrameSource>> {
    Err(anyhow::anyhow!(
        "camera device '{}' requires the ingest-v4l2 feature (or use stub:// / http://)",
        device
    ))
}

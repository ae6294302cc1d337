//! Catwatch
//!
//! Watches a single camera for a cat and sends a timestamped photo when one
//! shows up.
//!
//! # Pipeline
//!
//! Every poll cycle a frame passes through three gates, cheapest first:
//!
//! 1. **Motion**: luma difference against the previous frame.
//! 2. **Classification**: a pretrained detector must report the target class
//!    (COCO `cat`) above a confidence threshold.
//! 3. **Cooldown**: at most one notification per window.
//!
//! A frame that clears all three is stamped with its capture time, written to
//! a JPEG snapshot and sent through the configured notifier.
//!
//! # Module Structure
//!
//! - `frame`: RGB24 frames and pixel helpers
//! - `ingest`: Frame sources (V4L2, HTTP snapshot/MJPEG, synthetic)
//! - `motion`, `detect`, `cooldown`: the three gates
//! - `annotate`: timestamp overlay and snapshot writer
//! - `notify`: Telegram and log notifiers
//! - `watcher`: the polling loop
//! - `config`: file + environment configuration

pub mod annotate;
pub mod config;
pub mod cooldown;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod motion;
pub mod notify;
pub mod watcher;

pub use annotate::{Annotator, SnapshotWriter};
pub use config::{CameraSettings, CatwatchConfig};
pub use cooldown::{Clock, CooldownGate, ManualClock, SystemClock};
pub use detect::{ClassificationGate, Detection, DetectionEvent, DetectorBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, HttpSnapshotSource, SourceStats, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::V4l2Source;
pub use motion::MotionGate;
pub use notify::{Delivery, LogNotifier, Notifier, TelegramConfig, TelegramNotifier};
pub use watcher::{CycleOutcome, Hardware, SharedHardware, Watcher, WatcherStats};

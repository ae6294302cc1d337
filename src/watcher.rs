//! Polling loop.
//!
//! Each cycle captures one frame and runs it through the gates in order:
//! motion against the previous frame, classification, then cooldown. A frame
//! that clears all three is stamped, written to the snapshot path and handed
//! to the notifier. The cooldown only starts after a delivery the endpoint
//! accepted.
//!
//! Camera and detector share one lock (`Hardware`); it is held for the
//! capture and again for inference, never across the notifier call.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::annotate::{timestamp_text, Annotator, SnapshotWriter};
use crate::config::CatwatchConfig;
use crate::cooldown::{Clock, CooldownGate, SystemClock};
use crate::detect::{ClassificationGate, DetectionEvent, DetectorBackend};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::motion::MotionGate;
use crate::notify::{Delivery, Notifier};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Camera and detector, guarded together.
pub struct Hardware {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn DetectorBackend>,
}

pub type SharedHardware = Arc<Mutex<Hardware>>;

impl Hardware {
    pub fn new(source: Box<dyn FrameSource>, detector: Box<dyn DetectorBackend>) -> Self {
        Self { source, detector }
    }

    pub fn shared(self) -> SharedHardware {
        Arc::new(Mutex::new(self))
    }
}

/// What one cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// First frame captured; nothing to compare against yet.
    Primed,
    CaptureFailed,
    NoMotion,
    NoTarget,
    CoolingDown,
    Notified,
    DeliveryFailed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub cycles: u64,
    pub capture_failures: u64,
    pub motion_events: u64,
    pub detections: u64,
    pub notifications: u64,
    pub failed_deliveries: u64,
}

pub struct Watcher {
    hardware: SharedHardware,
    notifier: Box<dyn Notifier>,
    clock: Box<dyn Clock>,
    motion: MotionGate,
    classification: ClassificationGate,
    cooldown: CooldownGate,
    annotator: Annotator,
    snapshot: SnapshotWriter,
    poll_interval: Duration,
    retry_delay: Duration,
    previous: Option<Frame>,
    stats: WatcherStats,
}

impl Watcher {
    /// Watcher with default gates, timings and snapshot path.
    pub fn new(hardware: SharedHardware, notifier: Box<dyn Notifier>) -> Self {
        Self {
            hardware,
            notifier,
            clock: Box::new(SystemClock),
            motion: MotionGate::default(),
            classification: ClassificationGate::default(),
            cooldown: CooldownGate::default(),
            annotator: Annotator::default(),
            snapshot: SnapshotWriter::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            previous: None,
            stats: WatcherStats::default(),
        }
    }

    pub fn from_config(
        config: &CatwatchConfig,
        hardware: SharedHardware,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let mut watcher = Self::new(hardware, notifier);
        watcher.motion = MotionGate::new(config.motion.pixel_cutoff, config.motion.area_threshold);
        watcher.classification = ClassificationGate::new(
            config.detector.target_class,
            config.detector.confidence_threshold,
        );
        watcher.cooldown = CooldownGate::new(config.timing.cooldown);
        watcher.snapshot = SnapshotWriter::new(config.snapshot.path.clone())
            .with_quality(config.snapshot.jpeg_quality);
        watcher.poll_interval = config.timing.poll_interval;
        watcher.retry_delay = config.timing.retry_delay;
        watcher
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_snapshot_writer(mut self, snapshot: SnapshotWriter) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn with_motion_gate(mut self, motion: MotionGate) -> Self {
        self.motion = motion;
        self
    }

    pub fn with_classification_gate(mut self, classification: ClassificationGate) -> Self {
        self.classification = classification;
        self
    }

    pub fn with_cooldown(mut self, cooldown: CooldownGate) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Pause after a normal cycle and after a failed capture.
    pub fn with_intervals(mut self, poll_interval: Duration, retry_delay: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.retry_delay = retry_delay;
        self
    }

    pub fn stats(&self) -> WatcherStats {
        self.stats
    }

    /// Open the camera and warm up the detector.
    pub fn start(&mut self) -> Result<()> {
        let mut hardware = lock(&self.hardware)?;
        hardware.source.connect()?;
        hardware.detector.warm_up()?;
        log::info!(
            "watching {} with detector {} (target: {}, notifier: {})",
            hardware.source.stats().source,
            hardware.detector.name(),
            self.classification.target_label(),
            self.notifier.name()
        );
        Ok(())
    }

    /// Run one capture/gate/notify cycle.
    ///
    /// Only a poisoned hardware lock is returned as an error; capture,
    /// inference and delivery failures are logged and reported as outcomes.
    pub fn step(&mut self) -> Result<CycleOutcome> {
        self.stats.cycles += 1;

        let captured = {
            let mut hardware = lock(&self.hardware)?;
            let captured = hardware.source.next_frame();
            if let Err(err) = &captured {
                log::warn!("failed to capture frame: {:#}", err);
                if !hardware.source.is_healthy() {
                    reconnect(hardware.source.as_mut());
                }
            }
            captured
        };
        let Ok(current) = captured else {
            self.stats.capture_failures += 1;
            return Ok(CycleOutcome::CaptureFailed);
        };

        let Some(previous) = self.previous.replace(current.clone()) else {
            log::debug!("first frame captured, waiting for the next one");
            return Ok(CycleOutcome::Primed);
        };

        match self.motion.detect(&previous, &current) {
            Ok(true) => {}
            Ok(false) => return Ok(CycleOutcome::NoMotion),
            Err(err) => {
                // Resolution changed under us; the new frame becomes the reference.
                log::warn!("motion check skipped: {:#}", err);
                return Ok(CycleOutcome::NoMotion);
            }
        }
        self.stats.motion_events += 1;
        log::info!("motion detected");

        let checked = {
            let mut hardware = lock(&self.hardware)?;
            self.classification.check(hardware.detector.as_mut(), &current)
        };
        let event = match checked {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(CycleOutcome::NoTarget),
            Err(err) => {
                log::error!("detector failed: {:#}", err);
                return Ok(CycleOutcome::NoTarget);
            }
        };
        self.stats.detections += 1;

        let now = self.clock.now();
        if !self.cooldown.ready(now) {
            log::info!(
                "{} detected but cooling down for another {}s",
                self.classification.target_label(),
                self.cooldown.remaining(now).as_secs()
            );
            return Ok(CycleOutcome::CoolingDown);
        }

        self.notify(current, &event, now)
    }

    fn notify(
        &mut self,
        mut frame: Frame,
        event: &DetectionEvent,
        now: Instant,
    ) -> Result<CycleOutcome> {
        self.annotator.stamp_timestamp(&mut frame);
        let photo = match self.snapshot.write(&frame) {
            Ok(path) => path.to_path_buf(),
            Err(err) => {
                self.stats.failed_deliveries += 1;
                log::error!("failed to write snapshot: {:#}", err);
                return Ok(CycleOutcome::DeliveryFailed);
            }
        };
        log::info!("snapshot saved to {}", photo.display());

        let caption = format!(
            "{} detected at {} (confidence {:.2})",
            self.classification.target_label(),
            timestamp_text(event.timestamp.into()),
            event.confidence
        );
        match self.notifier.send_photo(&photo, Some(&caption)) {
            Ok(Delivery::Sent) => {
                self.cooldown.record(now);
                self.stats.notifications += 1;
                Ok(CycleOutcome::Notified)
            }
            Ok(Delivery::Rejected { status, .. }) => {
                self.stats.failed_deliveries += 1;
                log::warn!(
                    "{} notifier rejected the photo (status {}); not retrying",
                    self.notifier.name(),
                    status
                );
                Ok(CycleOutcome::DeliveryFailed)
            }
            Err(err) => {
                self.stats.failed_deliveries += 1;
                log::error!("{} notifier failed: {:#}", self.notifier.name(), err);
                Ok(CycleOutcome::DeliveryFailed)
            }
        }
    }

    /// Poll until `shutdown` is set, then release the camera.
    ///
    /// The camera is released on every exit path, including errors.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let polled = self.start().and_then(|()| self.poll(shutdown));
        let stopped = self.stop();
        polled.and(stopped)
    }

    fn poll(&mut self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::SeqCst) {
            let pause = match self.step()? {
                CycleOutcome::CaptureFailed => self.retry_delay,
                _ => self.poll_interval,
            };
            sleep_unless(shutdown, pause);
        }
        Ok(())
    }

    /// Release the camera. A poisoned lock does not prevent the release.
    pub fn stop(&mut self) -> Result<()> {
        let mut hardware = self.hardware.lock().unwrap_or_else(|poisoned| {
            log::warn!("hardware lock poisoned; stopping the source anyway");
            PoisonError::into_inner(poisoned)
        });
        hardware.source.stop()?;
        drop(hardware);
        let stats = self.stats;
        log::info!(
            "stopped after {} cycles: motion={} detections={} notified={} failed_deliveries={} capture_failures={}",
            stats.cycles,
            stats.motion_events,
            stats.detections,
            stats.notifications,
            stats.failed_deliveries,
            stats.capture_failures
        );
        Ok(())
    }
}

fn lock(hardware: &Mutex<Hardware>) -> Result<MutexGuard<'_, Hardware>> {
    hardware.lock().map_err(|_| anyhow!("hardware lock poisoned"))
}

fn reconnect(source: &mut dyn FrameSource) {
    let name = source.stats().source;
    match source.connect() {
        Ok(()) => log::info!("reconnected to {}", name),
        Err(err) => log::warn!("reconnect to {} failed: {:#}", name, err),
    }
}

fn sleep_unless(shutdown: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(SHUTDOWN_POLL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraSettings;
    use crate::detect::{Detection, StubBackend, COCO_CAT};
    use crate::ingest::{SourceStats, SyntheticSource};
    use crate::notify::LogNotifier;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Lifecycle {
        connects: AtomicUsize,
        stops: AtomicUsize,
        frames: AtomicUsize,
    }

    /// Static scene whose stream ends after `frames_per_connection` frames.
    struct LifecycleSource {
        log: Arc<Lifecycle>,
        frames_per_connection: usize,
        served: usize,
        healthy: bool,
        shutdown_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl LifecycleSource {
        fn new(log: Arc<Lifecycle>) -> Self {
            Self {
                log,
                frames_per_connection: usize::MAX,
                served: 0,
                healthy: false,
                shutdown_after: None,
            }
        }
    }

    impl FrameSource for LifecycleSource {
        fn connect(&mut self) -> Result<()> {
            self.log.connects.fetch_add(1, Ordering::SeqCst);
            self.served = 0;
            self.healthy = true;
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Frame> {
            if self.served >= self.frames_per_connection {
                self.healthy = false;
                return Err(anyhow!("stream ended"));
            }
            self.served += 1;
            let frames = self.log.frames.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, flag)) = &self.shutdown_after {
                if frames >= *limit {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            Ok(Frame::solid(64, 48, [50, 50, 50]))
        }

        fn is_healthy(&self) -> bool {
            self.healthy
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.log.frames.load(Ordering::SeqCst) as u64,
                source: "lifecycle".to_string(),
            }
        }

        fn stop(&mut self) -> Result<()> {
            self.log.stops.fetch_add(1, Ordering::SeqCst);
            self.healthy = false;
            Ok(())
        }
    }

    fn lifecycle_watcher(source: LifecycleSource) -> Watcher {
        let hardware = Hardware::new(Box::new(source), Box::new(StubBackend::new())).shared();
        Watcher::new(hardware, Box::new(LogNotifier::new()))
            .with_intervals(Duration::from_millis(1), Duration::from_millis(1))
    }

    fn synthetic_hardware(detector: StubBackend) -> SharedHardware {
        let source = SyntheticSource::new(CameraSettings {
            device: "stub://unit".to_string(),
            width: 640,
            height: 480,
        })
        .with_scene_period(1);
        Hardware::new(Box::new(source), Box::new(detector)).shared()
    }

    #[test]
    fn first_frame_only_primes() -> Result<()> {
        let mut watcher = Watcher::new(
            synthetic_hardware(StubBackend::new()),
            Box::new(LogNotifier::new()),
        );
        watcher.start()?;
        assert_eq!(watcher.step()?, CycleOutcome::Primed);
        Ok(())
    }

    #[test]
    fn motion_without_target_is_not_notified() -> Result<()> {
        let mut watcher = Watcher::new(
            synthetic_hardware(StubBackend::new()),
            Box::new(LogNotifier::new()),
        );
        watcher.start()?;
        watcher.step()?;
        assert_eq!(watcher.step()?, CycleOutcome::NoTarget);
        assert_eq!(watcher.stats().motion_events, 1);
        assert_eq!(watcher.stats().notifications, 0);
        Ok(())
    }

    #[test]
    fn detector_is_not_called_without_motion() -> Result<()> {
        let detector = StubBackend::always(vec![Detection::full_frame(COCO_CAT, 0.9)]);
        let source = SyntheticSource::new(CameraSettings {
            device: "stub://still".to_string(),
            width: 320,
            height: 240,
        })
        .with_scene_period(u64::MAX);
        let hardware = Hardware::new(Box::new(source), Box::new(detector)).shared();
        let mut watcher = Watcher::new(hardware, Box::new(LogNotifier::new()));
        watcher.start()?;
        watcher.step()?;
        assert_eq!(watcher.step()?, CycleOutcome::NoMotion);
        assert_eq!(watcher.stats().detections, 0);
        Ok(())
    }

    #[test]
    fn poisoned_lock_is_an_error() {
        let hardware = synthetic_hardware(StubBackend::new());
        let poisoner = Arc::clone(&hardware);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("poison the hardware lock");
        })
        .join();

        let mut watcher = Watcher::new(hardware, Box::new(LogNotifier::new()));
        assert!(watcher.step().is_err());
    }

    #[test]
    fn ended_stream_is_reconnected_after_capture_failure() -> Result<()> {
        let log = Arc::new(Lifecycle::default());
        let mut source = LifecycleSource::new(Arc::clone(&log));
        source.frames_per_connection = 1;
        let mut watcher = lifecycle_watcher(source);
        watcher.start()?;

        assert_eq!(watcher.step()?, CycleOutcome::Primed);
        assert_eq!(watcher.step()?, CycleOutcome::CaptureFailed);
        assert_eq!(log.connects.load(Ordering::SeqCst), 2);
        // The fresh connection delivers again; the reference frame survived.
        assert_eq!(watcher.step()?, CycleOutcome::NoMotion);
        assert_eq!(watcher.stats().capture_failures, 1);
        Ok(())
    }

    #[test]
    fn run_stops_the_source_once_shutdown_is_requested() -> Result<()> {
        let log = Arc::new(Lifecycle::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut source = LifecycleSource::new(Arc::clone(&log));
        source.shutdown_after = Some((3, Arc::clone(&shutdown)));
        let mut watcher = lifecycle_watcher(source);

        watcher.run(&shutdown)?;

        assert_eq!(log.connects.load(Ordering::SeqCst), 1);
        assert_eq!(log.stops.load(Ordering::SeqCst), 1);
        assert_eq!(log.frames.load(Ordering::SeqCst), 3);
        assert_eq!(watcher.stats().cycles, 3);
        Ok(())
    }

    #[test]
    fn run_stops_the_source_when_the_lock_is_poisoned() {
        let log = Arc::new(Lifecycle::default());
        let hardware = Hardware::new(
            Box::new(LifecycleSource::new(Arc::clone(&log))),
            Box::new(StubBackend::new()),
        )
        .shared();
        let poisoner = Arc::clone(&hardware);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("poison the hardware lock");
        })
        .join();

        let mut watcher = Watcher::new(hardware, Box::new(LogNotifier::new()));
        let shutdown = AtomicBool::new(false);
        assert!(watcher.run(&shutdown).is_err());
        assert_eq!(log.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sleep_returns_early_on_shutdown() {
        let shutdown = AtomicBool::new(true);
        let started = Instant::now();
        sleep_unless(&shutdown, Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use catwatch::detect::{Detection, StubBackend, COCO_CAT};
use catwatch::notify::{Delivery, Notifier};
use catwatch::{
    CycleOutcome, Frame, FrameSource, Hardware, ManualClock, SnapshotWriter, SourceStats, Watcher,
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

/// Plays back a fixed list of frames; `None` entries fail the capture.
struct ScriptedSource {
    frames: VecDeque<Option<Frame>>,
    captured: u64,
}

impl ScriptedSource {
    fn new(frames: Vec<Option<Frame>>) -> Self {
        Self {
            frames: frames.into(),
            captured: 0,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match self.frames.pop_front() {
            Some(Some(frame)) => {
                self.captured += 1;
                Ok(frame)
            }
            Some(None) => Err(anyhow!("camera unplugged")),
            None => Err(anyhow!("script exhausted")),
        }
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.captured,
            source: "scripted".to_string(),
        }
    }
}

/// Records every photo it is given and answers with queued deliveries.
#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(PathBuf, Option<String>)>>>,
    answers: Arc<Mutex<VecDeque<Delivery>>>,
}

impl RecordingNotifier {
    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send_photo(&mut self, photo: &Path, caption: Option<&str>) -> Result<Delivery> {
        assert!(photo.exists(), "snapshot must be written before sending");
        self.sent
            .lock()
            .unwrap()
            .push((photo.to_path_buf(), caption.map(str::to_string)));
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Delivery::Sent))
    }
}

fn scene_a() -> Frame {
    Frame::solid(WIDTH, HEIGHT, [20, 40, 60])
}

fn scene_b() -> Frame {
    let mut frame = scene_a();
    // 160x120 = 19200 changed pixels.
    frame.fill_rect(80, 60, 160, 120, [230, 230, 230]);
    frame
}

struct Harness {
    watcher: Watcher,
    clock: Arc<ManualClock>,
    notifier: RecordingNotifier,
    _dir: TempDir,
    snapshot: PathBuf,
}

fn harness(frames: Vec<Option<Frame>>, detector: StubBackend) -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let snapshot = dir.path().join("motion_detected.jpg");
    let clock = Arc::new(ManualClock::new());
    let notifier = RecordingNotifier::default();

    let hardware = Hardware::new(Box::new(ScriptedSource::new(frames)), Box::new(detector)).shared();
    let mut watcher = Watcher::new(hardware, Box::new(notifier.clone()))
        .with_clock(Box::new(Arc::clone(&clock)))
        .with_snapshot_writer(SnapshotWriter::new(&snapshot));
    watcher.start().expect("start watcher");

    Harness {
        watcher,
        clock,
        notifier,
        _dir: dir,
        snapshot,
    }
}

fn cat(confidence: f32) -> Vec<Detection> {
    vec![Detection::full_frame(COCO_CAT, confidence)]
}

#[test]
fn notifies_once_per_cooldown_window() -> Result<()> {
    let frames = vec![
        Some(scene_a()),
        Some(scene_a()),
        Some(scene_b()),
        Some(scene_a()),
        Some(scene_b()),
    ];
    let mut h = harness(frames, StubBackend::always(cat(0.87)));

    assert_eq!(h.watcher.step()?, CycleOutcome::Primed);
    assert_eq!(h.watcher.step()?, CycleOutcome::NoMotion);
    assert_eq!(h.notifier.count(), 0);

    assert_eq!(h.watcher.step()?, CycleOutcome::Notified);
    assert_eq!(h.notifier.count(), 1);
    assert!(h.snapshot.exists());

    // Immediately qualifying again: still inside the window.
    assert_eq!(h.watcher.step()?, CycleOutcome::CoolingDown);
    assert_eq!(h.notifier.count(), 1);

    h.clock.advance(Duration::from_secs(31));
    assert_eq!(h.watcher.step()?, CycleOutcome::Notified);
    assert_eq!(h.notifier.count(), 2);

    let stats = h.watcher.stats();
    assert_eq!(stats.notifications, 2);
    assert_eq!(stats.motion_events, 3);
    Ok(())
}

#[test]
fn cooldown_window_is_exclusive() -> Result<()> {
    let frames = vec![
        Some(scene_a()),
        Some(scene_b()),
        Some(scene_a()),
        Some(scene_b()),
    ];
    let mut h = harness(frames, StubBackend::always(cat(0.9)));

    h.watcher.step()?;
    assert_eq!(h.watcher.step()?, CycleOutcome::Notified);

    h.clock.advance(Duration::from_secs(30));
    assert_eq!(h.watcher.step()?, CycleOutcome::CoolingDown);

    h.clock.advance(Duration::from_millis(1));
    assert_eq!(h.watcher.step()?, CycleOutcome::Notified);
    Ok(())
}

#[test]
fn motion_without_cat_does_not_notify() -> Result<()> {
    let frames = vec![Some(scene_a()), Some(scene_b())];
    let dog = vec![Detection::full_frame(16, 0.95)];
    let mut h = harness(frames, StubBackend::always(dog));

    h.watcher.step()?;
    assert_eq!(h.watcher.step()?, CycleOutcome::NoTarget);
    assert_eq!(h.notifier.count(), 0);
    assert!(!h.snapshot.exists());
    Ok(())
}

#[test]
fn low_confidence_cat_does_not_notify() -> Result<()> {
    let frames = vec![Some(scene_a()), Some(scene_b())];
    let mut h = harness(frames, StubBackend::always(cat(0.3)));

    h.watcher.step()?;
    assert_eq!(h.watcher.step()?, CycleOutcome::NoTarget);
    assert_eq!(h.notifier.count(), 0);
    Ok(())
}

#[test]
fn rejected_delivery_does_not_start_cooldown() -> Result<()> {
    let frames = vec![Some(scene_a()), Some(scene_b()), Some(scene_a())];
    let mut h = harness(frames, StubBackend::always(cat(0.8)));
    h.notifier.answers.lock().unwrap().push_back(Delivery::Rejected {
        status: 400,
        body: r#"{"ok":false,"description":"Bad Request: chat not found"}"#.to_string(),
    });

    h.watcher.step()?;
    assert_eq!(h.watcher.step()?, CycleOutcome::DeliveryFailed);
    assert_eq!(h.watcher.step()?, CycleOutcome::Notified);
    assert_eq!(h.notifier.count(), 2);
    assert_eq!(h.watcher.stats().failed_deliveries, 1);
    Ok(())
}

#[test]
fn capture_failure_keeps_previous_frame() -> Result<()> {
    let frames = vec![Some(scene_a()), None, Some(scene_b())];
    let mut h = harness(frames, StubBackend::always(cat(0.8)));

    assert_eq!(h.watcher.step()?, CycleOutcome::Primed);
    assert_eq!(h.watcher.step()?, CycleOutcome::CaptureFailed);
    // Compared against scene A from before the failure.
    assert_eq!(h.watcher.step()?, CycleOutcome::Notified);
    assert_eq!(h.watcher.stats().capture_failures, 1);
    Ok(())
}

#[test]
fn caption_names_the_target_and_confidence() -> Result<()> {
    let frames = vec![Some(scene_a()), Some(scene_b())];
    let mut h = harness(frames, StubBackend::always(cat(0.87)));

    h.watcher.step()?;
    h.watcher.step()?;

    let sent = h.notifier.sent.lock().unwrap();
    let caption = sent[0].1.as_deref().unwrap_or_default();
    assert!(caption.starts_with("cat detected at "), "caption: {}", caption);
    assert!(caption.ends_with("(confidence 0.87)"), "caption: {}", caption);
    Ok(())
}

#[test]
fn snapshot_is_stamped_in_the_top_right_corner() -> Result<()> {
    let frames = vec![Some(scene_a()), Some(scene_b())];
    let mut h = harness(frames, StubBackend::always(cat(0.87)));

    h.watcher.step()?;
    h.watcher.step()?;

    let saved = image::open(&h.snapshot)?.to_rgb8();
    assert_eq!(saved.dimensions(), (WIDTH, HEIGHT));
    let greenest = (WIDTH / 2..WIDTH - 10)
        .flat_map(|x| (9..31).map(move |y| (x, y)))
        .map(|(x, y)| saved.get_pixel(x, y).0)
        .filter(|p| p[1] > 150 && p[0] < 100 && p[2] < 100)
        .count();
    assert!(greenest > 0, "expected green timestamp pixels");
    Ok(())
}

use anyhow::Result;
use std::time::SystemTime;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{coco_label, Detection, DetectionEvent, COCO_CAT};
use crate::frame::Frame;

/// Default minimum confidence for the target class.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// Passes a frame when the detector sees the target class confidently enough.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassificationGate {
    pub target_class: usize,
    pub threshold: f32,
}

impl Default for ClassificationGate {
    fn default() -> Self {
        Self {
            target_class: COCO_CAT,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ClassificationGate {
    pub fn new(target_class: usize, threshold: f32) -> Self {
        Self {
            target_class,
            threshold,
        }
    }

    pub fn target_label(&self) -> &'static str {
        coco_label(self.target_class)
    }

    /// Run the backend on `frame` and evaluate its detections.
    pub fn check(
        &self,
        backend: &mut dyn DetectorBackend,
        frame: &Frame,
    ) -> Result<Option<DetectionEvent>> {
        let detections = backend.detect(frame)?;
        Ok(self.evaluate(&detections, frame.captured_at))
    }

    /// Pick the most confident target-class detection above the threshold.
    ///
    /// Every target-class detection is logged with its confidence, whether or
    /// not it clears the threshold.
    pub fn evaluate(
        &self,
        detections: &[Detection],
        timestamp: SystemTime,
    ) -> Option<DetectionEvent> {
        if detections.is_empty() {
            log::info!("no objects detected in the frame");
            return None;
        }

        let mut best: Option<f32> = None;
        for det in detections.iter().filter(|d| d.class_id == self.target_class) {
            log::info!(
                "detected: {} with confidence: {:.2}",
                det.label(),
                det.confidence
            );
            if det.confidence > self.threshold && best.map_or(true, |b| det.confidence > b) {
                best = Some(det.confidence);
            }
        }

        match best {
            Some(confidence) => Some(DetectionEvent {
                timestamp,
                confidence,
            }),
            None => {
                log::info!("no {} detected in this frame", self.target_label());
                None
            }
        }
    }
}

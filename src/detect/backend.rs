use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Backends wrap a pretrained object detector. They receive the full RGB frame
/// and are responsible for any resizing or normalization their model needs.
/// Filtering by class and confidence happens in `ClassificationGate`, so a
/// backend should report everything its model emits above its own floor.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

mod backend;
mod backends;
mod gate;
mod result;
pub mod yolo;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use gate::{ClassificationGate, DEFAULT_CONFIDENCE_THRESHOLD};
pub use result::{coco_label, Detection, DetectionEvent, COCO_CAT, COCO_LABELS};

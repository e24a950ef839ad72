use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Stable per-video track identifier. Unique within one run only.
pub type TrackId = u32;

/// One tracked face in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
}

/// Detects and tracks faces across a sequence of frames.
///
/// Implementations keep tracking state between calls, so frames must be
/// fed in sampling order. The same physical face keeps its `track_id` for
/// as long as the tracker can follow it.
pub trait FaceTracker: Send {
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Finds faces in a single still image, without tracking.
///
/// Boxes are in frame pixels, highest confidence first.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>>;
}

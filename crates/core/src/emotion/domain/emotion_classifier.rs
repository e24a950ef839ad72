use crate::shared::emotion::EmotionDistribution;
use crate::shared::frame::Frame;
use crate::shared::BoxError;

/// Scores a face crop against the fixed emotion label set.
///
/// A crop with no readable face returns [`EmotionDistribution::neutral`]
/// rather than an error. Errors are reserved for collaborator faults.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, crop: &Frame) -> Result<EmotionDistribution, BoxError>;
}

use crate::detection::domain::face_tracker::TrackId;
use crate::shared::emotion::EmotionDistribution;

/// One tracked face's emotion reading in one sampled frame.
///
/// Buffered for the whole run: the identity behind `track_id` is only
/// known once every frame has voted.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub track_id: TrackId,
    /// Sampler emission index of the frame.
    pub frame_id: u64,
    pub emotion: EmotionDistribution,
}

use crate::shared::frame::Frame;
use crate::shared::BoxError;

/// Maps a face crop to an L2-normalised embedding.
///
/// Returns `Ok(None)` when the crop holds nothing the model can embed.
pub trait FaceEmbedder: Send + Sync {
    fn embed(&self, crop: &Frame) -> Result<Option<Vec<f32>>, BoxError>;
}

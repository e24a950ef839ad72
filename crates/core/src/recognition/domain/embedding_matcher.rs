use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::gallery::Gallery;
use crate::recognition::domain::identity_matcher::{Candidate, IdentityMatcher};
use crate::shared::frame::Frame;
use crate::shared::BoxError;

/// DeepFace's cosine threshold for ArcFace embeddings.
pub const DEFAULT_MAX_DISTANCE: f64 = 0.68;

/// Identity matcher that embeds the crop and ranks the gallery by cosine
/// distance.
pub struct EmbeddingMatcher<E> {
    embedder: E,
    max_distance: Option<f64>,
}

impl<E: FaceEmbedder> EmbeddingMatcher<E> {
    pub fn new(embedder: E, max_distance: Option<f64>) -> Self {
        Self {
            embedder,
            max_distance,
        }
    }
}

impl<E: FaceEmbedder> IdentityMatcher for EmbeddingMatcher<E> {
    fn rank(
        &self,
        crop: &Frame,
        gallery: &Gallery,
        top_k: usize,
    ) -> Result<Vec<Candidate>, BoxError> {
        if top_k == 0 || gallery.is_empty() {
            return Ok(Vec::new());
        }
        let Some(query) = self.embedder.embed(crop)? else {
            return Ok(Vec::new());
        };
        Ok(gallery.nearest(&query, top_k, self.max_distance))
    }
}

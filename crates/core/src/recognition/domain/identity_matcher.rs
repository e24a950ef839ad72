use crate::recognition::domain::gallery::Gallery;
use crate::shared::frame::Frame;
use crate::shared::BoxError;

/// One ranked gallery match for a face crop.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub identity: String,
    /// Dissimilarity to the crop; lower is more similar.
    pub distance: f64,
}

impl Candidate {
    pub fn new(identity: impl Into<String>, distance: f64) -> Self {
        Self {
            identity: identity.into(),
            distance,
        }
    }
}

/// Ranks gallery identities against a face crop.
///
/// Results are ordered by ascending distance and truncated to `top_k`. A
/// crop with no recognisable face yields an empty list, not an error.
pub trait IdentityMatcher: Send + Sync {
    fn rank(&self, crop: &Frame, gallery: &Gallery, top_k: usize)
        -> Result<Vec<Candidate>, BoxError>;
}

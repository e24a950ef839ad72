use crate::detection::domain::face_tracker::{Detection, TrackId};
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::error::AttendanceError;
use crate::recognition::domain::gallery::Gallery;
use crate::recognition::domain::identity_matcher::{Candidate, IdentityMatcher};
use crate::shared::emotion::EmotionDistribution;
use crate::shared::frame::Frame;

/// Collaborator results for one detection.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedFace {
    pub track_id: TrackId,
    pub candidates: Vec<Candidate>,
    pub emotion: EmotionDistribution,
}

/// Everything extracted from one frame, in detection order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameExtraction {
    pub faces: Vec<ExtractedFace>,
    /// Detections whose box held no pixels once clamped to the frame.
    pub empty_crops: usize,
}

/// Crops each detection and runs the emotion classifier and identity
/// matcher on it.
///
/// Up to `workers` crops are processed concurrently; the ONNX adapters
/// only run that many inferences at once when loaded with as many
/// sessions. Output order always matches input order, so ledger appends
/// stay deterministic.
pub struct ObservationExtractor<'a> {
    classifier: &'a dyn EmotionClassifier,
    matcher: &'a dyn IdentityMatcher,
    gallery: &'a Gallery,
    top_k: usize,
    workers: usize,
}

impl<'a> ObservationExtractor<'a> {
    pub fn new(
        classifier: &'a dyn EmotionClassifier,
        matcher: &'a dyn IdentityMatcher,
        gallery: &'a Gallery,
        top_k: usize,
        workers: usize,
    ) -> Self {
        Self {
            classifier,
            matcher,
            gallery,
            top_k,
            workers: workers.max(1),
        }
    }

    pub fn extract(
        &self,
        frame: &Frame,
        detections: &[Detection],
    ) -> Result<FrameExtraction, AttendanceError> {
        let mut crops: Vec<(TrackId, Frame)> = Vec::with_capacity(detections.len());
        let mut empty_crops = 0;
        for det in detections {
            let rect = det.bbox.clamp_to(frame.width(), frame.height());
            if rect.is_empty() {
                log::debug!(
                    "Frame {}: track {} box {:?} is empty after clamping, skipped",
                    frame.index(),
                    det.track_id,
                    det.bbox
                );
                empty_crops += 1;
                continue;
            }
            crops.push((det.track_id, frame.crop(&rect)));
        }

        let mut faces = Vec::with_capacity(crops.len());
        if self.workers == 1 || crops.len() <= 1 {
            for (track_id, crop) in &crops {
                faces.push(self.extract_one(*track_id, crop)?);
            }
        } else {
            for chunk in crops.chunks(self.workers) {
                faces.extend(self.extract_chunk(chunk)?);
            }
        }

        Ok(FrameExtraction { faces, empty_crops })
    }

    fn extract_chunk(
        &self,
        chunk: &[(TrackId, Frame)],
    ) -> Result<Vec<ExtractedFace>, AttendanceError> {
        std::thread::scope(|s| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|(track_id, crop)| s.spawn(move || self.extract_one(*track_id, crop)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .map_err(|_| AttendanceError::collaborator("extract", "worker panicked"))?
                })
                .collect()
        })
    }

    fn extract_one(&self, track_id: TrackId, crop: &Frame) -> Result<ExtractedFace, AttendanceError> {
        let emotion = self
            .classifier
            .classify(crop)
            .map_err(|e| AttendanceError::collaborator("emotion classifier", e))?;
        let mut candidates = self
            .matcher
            .rank(crop, self.gallery, self.top_k)
            .map_err(|e| AttendanceError::collaborator("identity matcher", e))?;
        candidates.truncate(self.top_k);
        Ok(ExtractedFace {
            track_id,
            candidates,
            emotion,
        })
    }
}

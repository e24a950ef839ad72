use std::path::Path;

use ort::session::Session;

use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::shared::emotion::{EmotionDistribution, EmotionLabel};
use crate::shared::frame::Frame;
use crate::shared::onnx_session::{self, softmax, SessionPool};
use crate::shared::BoxError;

const INPUT_SIZE: usize = 64;

/// Crops smaller than this on either side carry no usable expression.
const MIN_CROP_SIDE: u32 = 8;

/// FER+ emotion classifier.
///
/// Input is a 64x64 single-channel tensor of raw grey levels; the eight
/// output logits follow [`EmotionLabel::ALL`]. Scores are softmax
/// percentages. Concurrent callers each borrow one session from the pool.
pub struct OnnxEmotionClassifier {
    sessions: SessionPool<Session>,
}

impl OnnxEmotionClassifier {
    pub fn new(model_path: &Path, sessions: usize) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            sessions: onnx_session::load_pool(model_path, sessions)
                .map_err(|e| e as Box<dyn std::error::Error>)?,
        })
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&self, crop: &Frame) -> Result<EmotionDistribution, BoxError> {
        if crop.width() < MIN_CROP_SIDE || crop.height() < MIN_CROP_SIDE || crop.channels() < 3 {
            return Ok(EmotionDistribution::neutral());
        }

        let input_value = ort::value::Tensor::from_array(grayscale_tensor(crop))?;
        let logits: Vec<f32> = self.sessions.run(|session| {
            let outputs = session.run(ort::inputs![input_value])?;
            let logits: Vec<f32> =
                outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
            Ok(logits)
        })?;

        Ok(scores_from_logits(&logits))
    }
}

/// Maps FER+ logits to a percentage distribution. Anything other than
/// eight finite logits degrades to neutral.
fn scores_from_logits(logits: &[f32]) -> EmotionDistribution {
    if logits.len() != EmotionLabel::ALL.len() || logits.iter().any(|v| !v.is_finite()) {
        log::debug!("Unexpected emotion logits {logits:?}, using neutral");
        return EmotionDistribution::neutral();
    }
    let probs = softmax(logits);
    EmotionDistribution::from_scores(
        EmotionLabel::ALL
            .iter()
            .zip(probs)
            .map(|(&label, p)| (label, p as f64 * 100.0)),
    )
}

/// BT.601 luma, nearest-neighbour resized to 64x64, shape `[1, 1, 64, 64]`.
fn grayscale_tensor(crop: &Frame) -> ndarray::Array4<f32> {
    let src = crop.as_ndarray();
    let w = crop.width() as usize;
    let h = crop.height() as usize;
    ndarray::Array4::from_shape_fn((1, 1, INPUT_SIZE, INPUT_SIZE), |(_, _, y, x)| {
        let sy = (y * h / INPUT_SIZE).min(h - 1);
        let sx = (x * w / INPUT_SIZE).min(w - 1);
        let px = |c: usize| src[[sy, sx, c]] as f32;
        0.299 * px(0) + 0.587 * px(1) + 0.114 * px(2)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_logits_split_evenly() {
        let dist = scores_from_logits(&[0.0; 8]);
        for (_, score) in dist.iter() {
            assert_relative_eq!(score, 12.5, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_logit_order_follows_label_order() {
        let mut logits = [0.0f32; 8];
        logits[1] = 10.0;
        let dist = scores_from_logits(&logits);
        assert_eq!(dist.dominant(), EmotionLabel::Happy);
        let total: f64 = dist.iter().map(|(_, s)| s).sum();
        assert_relative_eq!(total, 100.0, epsilon = 1e-3);
    }

    #[test]
    fn test_malformed_logits_fall_back_to_neutral() {
        assert_eq!(scores_from_logits(&[1.0, 2.0]), EmotionDistribution::neutral());
        let mut logits = [0.0f32; 8];
        logits[3] = f32::NAN;
        assert_eq!(scores_from_logits(&logits), EmotionDistribution::neutral());
    }

    #[test]
    fn test_grayscale_tensor_uses_luma() {
        let crop = Frame::new([255u8, 0, 0].repeat(16 * 16), 16, 16, 3, 0);
        let tensor = grayscale_tensor(&crop);
        assert_eq!(tensor.shape(), &[1, 1, 64, 64]);
        assert_relative_eq!(tensor[[0, 0, 63, 63]], 0.299 * 255.0, epsilon = 1e-3);
    }
}

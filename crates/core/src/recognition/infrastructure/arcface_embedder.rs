//! ArcFace face embedder over ONNX Runtime.
//!
//! Holds a pool of sessions so per-frame worker threads can embed crops
//! concurrently, one session per worker.

use std::path::Path;

use ort::session::Session;

use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::{self, SessionPool};
use crate::shared::BoxError;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct ArcFaceEmbedder {
    sessions: SessionPool<Session>,
}

impl ArcFaceEmbedder {
    /// Loads `sessions` copies of the model; pass the worker count.
    pub fn new(model_path: &Path, sessions: usize) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            sessions: onnx_session::load_pool(model_path, sessions)
                .map_err(|e| e as Box<dyn std::error::Error>)?,
        })
    }
}

impl FaceEmbedder for ArcFaceEmbedder {
    fn embed(&self, crop: &Frame) -> Result<Option<Vec<f32>>, BoxError> {
        if crop.is_empty() || crop.channels() < 3 {
            return Ok(None);
        }
        let tensor = preprocess(crop);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut embedding: Vec<f32> = self.sessions.run(|session| {
            let outputs = session.run(ort::inputs![input_value])?;
            let embedding: Vec<f32> =
                outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
            Ok(embedding)
        })?;

        if !l2_normalize(&mut embedding) {
            return Ok(None);
        }
        Ok(Some(embedding))
    }
}

/// Nearest-neighbour resize to 112x112, (v - 127.5) / 127.5, NCHW.
fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let src = crop.as_ndarray();
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let sy = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let sx =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (src[[sy, sx, c]] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }
    tensor
}

/// Scales `v` to unit length. Returns false for a zero or non-finite vector.
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !(norm > 0.0 && norm.is_finite()) {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

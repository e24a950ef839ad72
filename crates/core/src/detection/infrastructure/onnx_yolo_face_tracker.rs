//! YOLO face detection over ONNX Runtime, followed by ByteTrack association.
//!
//! Preprocessing letterboxes each frame into the model's square input;
//! postprocessing maps boxes back to frame pixels and runs NMS before the
//! tracker sees them. Pose keypoints emitted by the model are ignored.
//!
//! The same type also serves as a stateless [`FaceDetector`] for enrolment
//! photos; detecting through that port leaves the track state untouched.

use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_tracker::{Detection, FaceTracker};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::onnx_session;

use super::bytetrack_tracker::{ByteTracker, ScoredBox};

/// Fallback input resolution when the model's input shape is dynamic.
const DEFAULT_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const NMS_IOU_THRESH: f64 = 0.45;

/// Letterbox padding value (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

pub struct OnnxYoloFaceTracker {
    session: ort::session::Session,
    tracker: ByteTracker,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloFaceTracker {
    /// Loads the model and reads its square input size from the NCHW
    /// input shape.
    pub fn new(
        model_path: &Path,
        tracker: ByteTracker,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = onnx_session::load(model_path, None)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);
        log::debug!("YOLO face model input size: {input_size}");

        Ok(Self {
            session,
            tracker,
            confidence,
            input_size,
        })
    }

    fn detect_scored(&mut self, frame: &Frame) -> Result<Vec<ScoredBox>, Box<dyn std::error::Error>> {
        let mut letterboxed = letterbox(frame, self.input_size);
        let input = ort::value::Tensor::from_array(std::mem::take(&mut letterboxed.tensor))?;
        let outputs = self.session.run(ort::inputs![input])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(format!("unexpected YOLO output shape: {shape:?}").into());
        }
        let data = tensor
            .as_standard_layout()
            .as_slice()
            .map(<[f32]>::to_vec)
            .ok_or("YOLO output is not contiguous")?;

        let rows = OutputRows::new(&data, shape[1], shape[2]);
        let boxes = (0..rows.count)
            .filter_map(|i| parse_row(&rows.row(i), self.confidence, &letterboxed))
            .collect();
        Ok(nms(boxes, NMS_IOU_THRESH))
    }
}

impl FaceTracker for OnnxYoloFaceTracker {
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let boxes = self.detect_scored(frame)?;
        Ok(self
            .tracker
            .update(&boxes)
            .into_iter()
            .map(|t| Detection {
                track_id: t.id,
                bbox: t.bbox,
            })
            .collect())
    }
}

impl FaceDetector for OnnxYoloFaceTracker {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.detect_scored(frame)?.into_iter().map(|b| b.bbox).collect())
    }
}

struct Letterboxed {
    tensor: ndarray::Array4<f32>,
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

/// Resizes `frame` into a `target` x `target` NCHW tensor, preserving
/// aspect ratio and padding the remainder.
fn letterbox(frame: &Frame, target: u32) -> Letterboxed {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let scale = (target as f64 / fw).min(target as f64 / fh);
    let new_w = ((fw * scale).round() as u32).min(target);
    let new_h = ((fh * scale).round() as u32).min(target);
    let pad_x = (target - new_w) / 2;
    let pad_y = (target - new_h) / 2;

    let size = target as usize;
    let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, size, size), PAD_VALUE);
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let sy = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let sx = ((x as f64 / scale) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, pad_y as usize + y, pad_x as usize + x]] =
                    src[[sy, sx, c]] as f32 / 255.0;
            }
        }
    }

    Letterboxed {
        tensor,
        scale,
        pad_x,
        pad_y,
    }
}

/// Row view over a `[1, A, B]` output that may be feature-major
/// (`[1, features, detections]`) or detection-major.
struct OutputRows<'a> {
    data: &'a [f32],
    count: usize,
    features: usize,
    transposed: bool,
}

impl<'a> OutputRows<'a> {
    fn new(data: &'a [f32], dim1: usize, dim2: usize) -> Self {
        let transposed = dim1 < dim2;
        let (count, features) = if transposed { (dim2, dim1) } else { (dim1, dim2) };
        Self {
            data,
            count,
            features,
            transposed,
        }
    }

    fn row(&self, i: usize) -> Vec<f32> {
        if self.transposed {
            (0..self.features)
                .map(|f| self.data[f * self.count + i])
                .collect()
        } else {
            self.data[i * self.features..(i + 1) * self.features].to_vec()
        }
    }
}

/// Row layout: `[cx, cy, w, h, conf, ...keypoints]` in letterbox pixels.
fn parse_row(row: &[f32], confidence: f64, lb: &Letterboxed) -> Option<ScoredBox> {
    if row.len() < 5 {
        return None;
    }
    let score = row[4] as f64;
    if score < confidence {
        return None;
    }
    let cx = (row[0] as f64 - lb.pad_x as f64) / lb.scale;
    let cy = (row[1] as f64 - lb.pad_y as f64) / lb.scale;
    let w = row[2] as f64 / lb.scale;
    let h = row[3] as f64 / lb.scale;
    Some(ScoredBox {
        bbox: BoundingBox::new(cx, cy, w, h),
        score,
    })
}

/// Greedy NMS, highest score first.
fn nms(mut boxes: Vec<ScoredBox>, iou_thresh: f64) -> Vec<ScoredBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut keep: Vec<ScoredBox> = Vec::new();
    for candidate in boxes {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) <= iou_thresh)
        {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn scored(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> ScoredBox {
        ScoredBox {
            bbox: BoundingBox::from_corners([x1, y1, x2, y2]),
            score,
        }
    }

    #[rstest]
    #[case::wide(200, 100, 3.2, 0, 160)]
    #[case::square(100, 100, 6.4, 0, 0)]
    #[case::tall(100, 200, 3.2, 160, 0)]
    fn test_letterbox_geometry(
        #[case] w: u32,
        #[case] h: u32,
        #[case] scale: f64,
        #[case] pad_x: u32,
        #[case] pad_y: u32,
    ) {
        let frame = Frame::new(vec![128u8; (w * h * 3) as usize], w, h, 3, 0);
        let lb = letterbox(&frame, 640);
        assert_eq!(lb.tensor.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(lb.scale, scale, epsilon = 1e-6);
        assert_eq!((lb.pad_x, lb.pad_y), (pad_x, pad_y));
    }

    #[test]
    fn test_letterbox_normalizes_pixels_and_pads() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3, 0);
        let lb = letterbox(&frame, 640);
        let inside = lb.tensor[[0, 0, lb.pad_y as usize + 1, 1]];
        assert_relative_eq!(inside, 1.0, epsilon = 1e-6);
        assert_relative_eq!(lb.tensor[[0, 0, 0, 0]], PAD_VALUE, epsilon = 1e-6);
    }

    #[test]
    fn test_parse_row_maps_back_to_frame_pixels() {
        let lb = Letterboxed {
            tensor: ndarray::Array4::zeros((1, 3, 1, 1)),
            scale: 2.0,
            pad_x: 0,
            pad_y: 100,
        };
        let row = [200.0, 300.0, 40.0, 60.0, 0.9, 1.0, 2.0, 0.9];
        let parsed = parse_row(&row, 0.5, &lb).unwrap();
        assert_relative_eq!(parsed.bbox.x, 100.0);
        assert_relative_eq!(parsed.bbox.y, 100.0);
        assert_relative_eq!(parsed.bbox.width, 20.0);
        assert_relative_eq!(parsed.bbox.height, 30.0);
    }

    #[test]
    fn test_parse_row_rejects_low_confidence_and_short_rows() {
        let lb = letterbox(&Frame::new(vec![0u8; 3], 1, 1, 3, 0), 4);
        assert!(parse_row(&[1.0, 1.0, 1.0, 1.0, 0.2], 0.5, &lb).is_none());
        assert!(parse_row(&[1.0, 1.0, 1.0], 0.5, &lb).is_none());
    }

    #[test]
    fn test_output_rows_handles_feature_major_layout() {
        // Two detections, five features, stored feature-major.
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let rows = OutputRows::new(&data, 5, 2);
        assert_eq!(rows.count, 2);
        assert_eq!(rows.row(0), vec![1.0, 3.0, 5.0, 7.0, 9.0]);
        assert_eq!(rows.row(1), vec![2.0, 4.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn test_nms_keeps_highest_of_overlapping() {
        let kept = nms(
            vec![
                scored(0.0, 0.0, 100.0, 100.0, 0.5),
                scored(2.0, 2.0, 102.0, 102.0, 0.9),
            ],
            0.3,
        );
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].score, 0.9);
    }

    #[test]
    fn test_nms_keeps_separate_faces() {
        let kept = nms(
            vec![
                scored(0.0, 0.0, 50.0, 50.0, 0.9),
                scored(200.0, 200.0, 250.0, 250.0, 0.8),
            ],
            0.3,
        );
        assert_eq!(kept.len(), 2);
        assert!(nms(Vec::new(), 0.3).is_empty());
    }
}

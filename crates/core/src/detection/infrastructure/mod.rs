pub mod bytetrack_tracker;
pub mod onnx_yolo_face_tracker;

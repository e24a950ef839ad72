pub mod bounding_box;
pub mod constants;
pub mod emotion;
pub mod frame;
pub mod model_resolver;
pub mod onnx_session;
pub mod video_metadata;

/// Error type for collaborators that may be driven from worker threads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

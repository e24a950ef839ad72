use std::path::PathBuf;

/// Properties of an opened video source.
///
/// `total_frames` comes from the container header and may be 0 when the
/// container does not record a frame count.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Source timestamp of a decoded frame position, in seconds.
    pub fn timestamp_secs(&self, frame_index: usize) -> Option<f64> {
        if self.fps > 0.0 {
            Some(frame_index as f64 / self.fps)
        } else {
            None
        }
    }
}

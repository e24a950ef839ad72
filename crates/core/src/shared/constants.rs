pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

pub const EMOTION_MODEL_NAME: &str = "emotion-ferplus-8.onnx";
pub const EMOTION_MODEL_URL: &str =
    "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/emotion_ferplus/model/emotion-ferplus-8.onnx";

/// Max frames a track can be lost before removal.
///
/// Counted in sampled frames, so this spans `TRACKER_MAX_LOST * interval`
/// decoded frames.
pub const TRACKER_MAX_LOST: usize = 5;

pub const DEFAULT_CLASS_ID: i64 = 1;
pub const DEFAULT_FRAME_INTERVAL: usize = 300;

/// Candidates kept per detection by the identity matcher.
pub const DEFAULT_TOP_K: usize = 3;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Directory name under the platform data/cache dirs.
pub const APP_DIR_NAME: &str = "ClassAttendance";
pub const DEFAULT_STORE_FILENAME: &str = "student_data.json";

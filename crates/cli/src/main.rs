use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use attendance_core::attendance::domain::record_store::RecordStore;
use attendance_core::attendance::infrastructure::json_record_store::JsonRecordStore;
use attendance_core::detection::infrastructure::bytetrack_tracker::ByteTracker;
use attendance_core::detection::infrastructure::onnx_yolo_face_tracker::OnnxYoloFaceTracker;
use attendance_core::emotion::infrastructure::onnx_emotion_classifier::OnnxEmotionClassifier;
use attendance_core::error::AttendanceError;
use attendance_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use attendance_core::pipeline::process_class_video_use_case::{ProcessClassVideoUseCase, RunConfig};
use attendance_core::recognition::domain::embedding_matcher::{EmbeddingMatcher, DEFAULT_MAX_DISTANCE};
use attendance_core::recognition::infrastructure::arcface_embedder::ArcFaceEmbedder;
use attendance_core::recognition::infrastructure::gallery_loader::load_gallery;
use attendance_core::shared::constants::{
    APP_DIR_NAME, DEFAULT_STORE_FILENAME, EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL,
    EMOTION_MODEL_NAME, EMOTION_MODEL_URL, TRACKER_MAX_LOST, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use attendance_core::shared::model_resolver;
use attendance_core::video::infrastructure::ffmpeg_reader::FfmpegReader;

/// Adds one classroom recording to the attendance records.
#[derive(Parser)]
#[command(name = "add-class-data")]
struct Cli {
    /// Classroom video file.
    video_path: PathBuf,

    /// Class session the records belong to.
    #[arg(long, default_value = "1")]
    class_id: i64,

    /// Process every Nth decoded frame.
    #[arg(long, default_value = "300")]
    frame_interval: usize,

    /// Directory of enrolment photos; file stem or subdirectory name is the student id.
    #[arg(long)]
    gallery: PathBuf,

    /// JSON record file (default: <data dir>/ClassAttendance/student_data.json).
    #[arg(long)]
    store: Option<PathBuf>,

    /// Gallery candidates kept per detected face.
    #[arg(long, default_value = "3")]
    top_k: usize,

    /// Cosine distance above which a gallery match is ignored.
    #[arg(long, default_value_t = DEFAULT_MAX_DISTANCE)]
    max_distance: f64,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f64,

    /// Concurrent per-face inference workers, each with its own model
    /// sessions (default: available cores).
    #[arg(long)]
    workers: Option<usize>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let workers = cli.workers.unwrap_or_else(|| RunConfig::default().workers);

    let mut tracker = build_tracker(cli.confidence)?;

    let embedding_model = resolve_model(EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL)?;
    let embedder = ArcFaceEmbedder::new(&embedding_model, workers)?;
    // Detection alone leaves the tracker's state untouched.
    let gallery = load_gallery(&cli.gallery, &mut tracker, &embedder)?;
    if gallery.is_empty() {
        return Err(format!("No enrolment faces found in {}", cli.gallery.display()).into());
    }
    log::info!(
        "Gallery: {} faces for {} students",
        gallery.len(),
        gallery.identities().len()
    );
    let matcher = EmbeddingMatcher::new(embedder, Some(cli.max_distance));

    let emotion_model = resolve_model(EMOTION_MODEL_NAME, EMOTION_MODEL_URL)?;
    let classifier = OnnxEmotionClassifier::new(&emotion_model, workers)?;

    let store_path = match cli.store {
        Some(path) => path,
        None => default_store_path()?,
    };
    let store: Arc<dyn RecordStore> = Arc::new(JsonRecordStore::open(&store_path)?);
    log::info!("Record store: {}", store_path.display());

    let mut config = RunConfig {
        class_id: cli.class_id,
        frame_interval: cli.frame_interval,
        top_k: cli.top_k,
        workers,
        ..RunConfig::default()
    };
    config.on_progress = Some(Box::new(|current: usize, total: usize| {
        eprint!("\rProcessing sampled frame {current}/{total}");
        true
    }));

    let mut use_case = ProcessClassVideoUseCase::new(
        Box::new(FfmpegReader::new()),
        Box::new(tracker),
        Box::new(classifier),
        Box::new(matcher),
        gallery,
        store,
        Box::new(StdoutPipelineLogger::default()),
    );
    let summary = use_case.execute(&cli.video_path, &config)?;
    eprintln!();

    if summary.unresolved_tracks > 0 {
        log::warn!(
            "{} of {} tracks matched no enrolled student",
            summary.unresolved_tracks,
            summary.tracks
        );
    }
    println!(
        "Added {} records for class {} ({} already present)",
        summary.records_created, cli.class_id, summary.duplicates_skipped
    );
    Ok(())
}

fn build_tracker(confidence: f64) -> Result<OnnxYoloFaceTracker, Box<dyn std::error::Error>> {
    let model_path = resolve_model(YOLO_MODEL_NAME, YOLO_MODEL_URL)?;
    OnnxYoloFaceTracker::new(&model_path, ByteTracker::new(TRACKER_MAX_LOST), confidence)
}

fn resolve_model(name: &str, url: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {name}");
    let label = name.to_string();
    let path = model_resolver::resolve(
        name,
        url,
        None,
        Some(Box::new(move |downloaded, total| {
            download_progress(&label, downloaded, total)
        })),
    )?;
    Ok(path)
}

fn default_store_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME).join(DEFAULT_STORE_FILENAME))
        .ok_or_else(|| "could not determine data directory; pass --store".into())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.frame_interval == 0 {
        return Err("Frame interval must be a positive integer, got 0".into());
    }
    if cli.top_k == 0 {
        return Err("Top-k must be at least 1".into());
    }
    if !(0.0..=2.0).contains(&cli.max_distance) {
        return Err(format!(
            "Max distance must be between 0.0 and 2.0, got {}",
            cli.max_distance
        )
        .into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if cli.workers == Some(0) {
        return Err("Workers must be at least 1".into());
    }
    if !is_file(&cli.video_path) {
        return Err(AttendanceError::SourceUnavailable {
            path: cli.video_path.clone(),
            reason: "file not found".into(),
        }
        .into());
    }
    if !is_dir(&cli.gallery) {
        return Err(format!("Gallery directory not found: {}", cli.gallery.display()).into());
    }
    Ok(())
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

fn is_dir(path: &Path) -> bool {
    path.metadata().map(|m| m.is_dir()).unwrap_or(false)
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {name}... {pct}%");
    } else {
        eprint!("\rDownloading {name}... {downloaded} bytes");
    }
}

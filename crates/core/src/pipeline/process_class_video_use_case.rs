use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::attendance::domain::observation::Observation;
use crate::attendance::domain::record_store::RecordStore;
use crate::attendance::domain::record_writer::RecordWriter;
use crate::attendance::domain::track_resolver::TrackResolver;
use crate::attendance::domain::vote_ledger::TrackVoteLedger;
use crate::detection::domain::face_tracker::FaceTracker;
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::error::AttendanceError;
use crate::pipeline::observation_extractor::ObservationExtractor;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::recognition::domain::gallery::Gallery;
use crate::recognition::domain::identity_matcher::IdentityMatcher;
use crate::shared::constants::{DEFAULT_CLASS_ID, DEFAULT_FRAME_INTERVAL, DEFAULT_TOP_K};
use crate::shared::BoxError;
use crate::video::domain::frame_sampler::{expected_samples, FrameSampler, SampledFrame};
use crate::video::domain::video_reader::VideoReader;

const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Progress callback: `(sampled_frames_done, expected_total)`.
/// Returning `false` cancels the run.
pub type ProgressFn = Box<dyn Fn(usize, usize) -> bool + Send>;

/// Per-run settings.
pub struct RunConfig {
    pub class_id: i64,
    pub frame_interval: usize,
    pub top_k: usize,
    /// Concurrent per-face inference calls within one frame.
    pub workers: usize,
    pub cancelled: Arc<AtomicBool>,
    pub on_progress: Option<ProgressFn>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            class_id: DEFAULT_CLASS_ID,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            top_k: DEFAULT_TOP_K,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            cancelled: Arc::new(AtomicBool::new(false)),
            on_progress: None,
        }
    }
}

/// Counts describing a completed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_sampled: usize,
    pub observations: usize,
    pub votes: usize,
    pub tracks: usize,
    pub resolved_tracks: usize,
    pub unresolved_tracks: usize,
    pub empty_crops: usize,
    pub records_created: usize,
    pub duplicates_skipped: usize,
}

/// Turns one classroom recording into attendance records.
///
/// Runs in two phases. Collection streams sampled frames through the
/// tracker and per-face collaborators, buffering observations and votes.
/// Resolution then fixes one identity per track and persists the buffered
/// observations. Nothing is written until every frame has been seen, so a
/// failed or cancelled run leaves the store untouched.
pub struct ProcessClassVideoUseCase {
    reader: Box<dyn VideoReader>,
    tracker: Box<dyn FaceTracker>,
    classifier: Box<dyn EmotionClassifier>,
    matcher: Box<dyn IdentityMatcher>,
    gallery: Gallery,
    store: Arc<dyn RecordStore>,
    logger: Box<dyn PipelineLogger>,
}

/// Output of the collection phase.
#[derive(Default)]
struct Collected {
    observations: Vec<Observation>,
    ledger: TrackVoteLedger,
    frames_sampled: usize,
    empty_crops: usize,
}

impl ProcessClassVideoUseCase {
    pub fn new(
        reader: Box<dyn VideoReader>,
        tracker: Box<dyn FaceTracker>,
        classifier: Box<dyn EmotionClassifier>,
        matcher: Box<dyn IdentityMatcher>,
        gallery: Gallery,
        store: Arc<dyn RecordStore>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            reader,
            tracker,
            classifier,
            matcher,
            gallery,
            store,
            logger,
        }
    }

    pub fn execute(
        &mut self,
        video_path: &Path,
        config: &RunConfig,
    ) -> Result<RunSummary, AttendanceError> {
        if config.frame_interval == 0 {
            return Err(AttendanceError::InvalidInterval(config.frame_interval));
        }
        let metadata =
            self.reader
                .open(video_path)
                .map_err(|e| AttendanceError::SourceUnavailable {
                    path: video_path.to_path_buf(),
                    reason: e.to_string(),
                })?;
        let expected = expected_samples(metadata.total_frames, config.frame_interval);
        self.logger.info(&format!(
            "Processing {} for class {}: {}x{}, {} frames, sampling every {} (~{expected} samples)",
            video_path.display(),
            config.class_id,
            metadata.width,
            metadata.height,
            metadata.total_frames,
            config.frame_interval
        ));

        let collected = self.collect(config, expected)?;
        if config.cancelled.load(Ordering::Relaxed) {
            return Err(AttendanceError::Cancelled);
        }

        let t0 = Instant::now();
        let resolved = TrackResolver::resolve(&collected.ledger);
        self.logger.timing("resolve", elapsed_ms(t0));
        let (resolved_tracks, unresolved_tracks) = resolved.counts();
        for (track_id, resolution) in resolved.iter() {
            log::debug!("Track {track_id}: {resolution:?}");
        }

        let t0 = Instant::now();
        let written = RecordWriter::new(self.store.as_ref(), config.class_id)
            .write(&collected.observations, &resolved)
            .map_err(|e| AttendanceError::Store(e.to_string()))?;
        self.logger.timing("persist", elapsed_ms(t0));

        let summary = RunSummary {
            frames_sampled: collected.frames_sampled,
            observations: collected.observations.len(),
            votes: collected.ledger.vote_count(),
            tracks: resolved.len(),
            resolved_tracks,
            unresolved_tracks,
            empty_crops: collected.empty_crops,
            records_created: written.created,
            duplicates_skipped: written.duplicates,
        };
        self.logger.info(&format!(
            "Resolved {resolved_tracks}/{} tracks; created {} records ({} duplicates, {} observations from unresolved tracks)",
            summary.tracks, written.created, written.duplicates, written.unresolved
        ));
        self.logger.summary();
        Ok(summary)
    }

    /// Decodes on a reader thread; tracks and extracts on this one.
    fn collect(&mut self, config: &RunConfig, expected: usize) -> Result<Collected, AttendanceError> {
        let (frame_tx, frame_rx) =
            crossbeam_channel::bounded::<Result<SampledFrame, BoxError>>(DEFAULT_CHANNEL_CAPACITY);

        let reader = &mut self.reader;
        let tracker = self.tracker.as_mut();
        let logger = self.logger.as_mut();
        let extractor = ObservationExtractor::new(
            self.classifier.as_ref(),
            self.matcher.as_ref(),
            &self.gallery,
            config.top_k,
            config.workers,
        );
        let interval = config.frame_interval;
        let cancelled = config.cancelled.clone();

        std::thread::scope(|s| {
            let reader_handle = s.spawn(move || {
                read_sampled(reader.as_mut(), interval, &frame_tx, &cancelled);
                reader.close();
            });

            let result = track_and_extract(frame_rx, tracker, &extractor, logger, config, expected);
            if reader_handle.join().is_err() && result.is_ok() {
                return Err(AttendanceError::collaborator("video reader", "reader thread panicked"));
            }
            result
        })
    }
}

/// Reader-thread body: samples decoded frames into `frame_tx` until the
/// video ends, the consumer hangs up, or the run is cancelled.
fn read_sampled(
    reader: &mut dyn VideoReader,
    interval: usize,
    frame_tx: &crossbeam_channel::Sender<Result<SampledFrame, BoxError>>,
    cancelled: &AtomicBool,
) {
    let frames = reader
        .frames()
        .map(|r| r.map_err(|e| -> BoxError { e.to_string().into() }));
    let sampler = match FrameSampler::new(frames, interval) {
        Ok(sampler) => sampler,
        Err(e) => {
            let _ = frame_tx.send(Err(e.into()));
            return;
        }
    };
    for sampled in sampler {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
        if frame_tx.send(sampled).is_err() {
            break;
        }
    }
}

fn track_and_extract(
    frame_rx: crossbeam_channel::Receiver<Result<SampledFrame, BoxError>>,
    tracker: &mut dyn FaceTracker,
    extractor: &ObservationExtractor<'_>,
    logger: &mut dyn PipelineLogger,
    config: &RunConfig,
    expected: usize,
) -> Result<Collected, AttendanceError> {
    let mut collected = Collected::default();

    for sampled in frame_rx {
        if config.cancelled.load(Ordering::Relaxed) {
            return Err(AttendanceError::Cancelled);
        }
        let sampled = sampled.map_err(|e| AttendanceError::collaborator("video decoder", e))?;

        let t0 = Instant::now();
        let detections = tracker
            .track(&sampled.frame)
            .map_err(|e| AttendanceError::collaborator("face tracker", e))?;
        logger.timing("track", elapsed_ms(t0));
        logger.metric("detections_per_frame", detections.len() as f64);

        let t0 = Instant::now();
        let extraction = extractor.extract(&sampled.frame, &detections)?;
        logger.timing("extract", elapsed_ms(t0));

        for face in extraction.faces {
            collected.ledger.record_votes(face.track_id, &face.candidates);
            collected.observations.push(Observation {
                track_id: face.track_id,
                frame_id: sampled.sequence,
                emotion: face.emotion,
            });
        }
        collected.empty_crops += extraction.empty_crops;
        collected.frames_sampled += 1;
        log::trace!(
            "Sample {} (decode position {}): {} detections",
            sampled.sequence,
            sampled.source_index,
            detections.len()
        );

        let total = expected.max(collected.frames_sampled);
        logger.progress(collected.frames_sampled, total);
        if let Some(ref callback) = config.on_progress {
            if !callback(collected.frames_sampled, total) {
                config.cancelled.store(true, Ordering::Relaxed);
                return Err(AttendanceError::Cancelled);
            }
        }
    }

    Ok(collected)
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use crate::attendance::infrastructure::in_memory_record_store::InMemoryRecordStore;
    use crate::detection::domain::face_tracker::{Detection, TrackId};
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::recognition::domain::identity_matcher::Candidate;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::emotion::{EmotionDistribution, EmotionLabel};
    use crate::shared::frame::Frame;
    use crate::shared::video_metadata::VideoMetadata;

    /// Yields `count` blank frames, or fails to open.
    struct StubReader {
        count: usize,
        openable: bool,
        opened: bool,
    }

    impl StubReader {
        fn with_frames(count: usize) -> Self {
            Self {
                count,
                openable: true,
                opened: false,
            }
        }

        fn unopenable() -> Self {
            Self {
                count: 0,
                openable: false,
                opened: false,
            }
        }
    }

    impl VideoReader for StubReader {
        fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if !self.openable {
                return Err(format!("cannot open {}", path.display()).into());
            }
            self.opened = true;
            Ok(VideoMetadata {
                width: 320,
                height: 240,
                fps: 30.0,
                total_frames: self.count,
                codec: "stub".into(),
                source_path: Some(path.to_path_buf()),
            })
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            if !self.opened {
                return Box::new(std::iter::once(Err("not opened".into())));
            }
            Box::new((0..self.count).map(|i| Ok(Frame::new(vec![0u8; 320 * 240 * 3], 320, 240, 3, i))))
        }

        fn close(&mut self) {
            self.opened = false;
        }
    }

    /// Replays scripted detections, one entry per sampled frame.
    struct ScriptedTracker {
        script: Vec<Vec<Detection>>,
        calls: usize,
    }

    impl ScriptedTracker {
        fn new(script: Vec<Vec<Detection>>) -> Self {
            Self { script, calls: 0 }
        }
    }

    impl FaceTracker for ScriptedTracker {
        fn track(&mut self, _frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            let out = self.script.get(self.calls).cloned().unwrap_or_default();
            self.calls += 1;
            Ok(out)
        }
    }

    /// Answers by crop width so results do not depend on worker scheduling.
    struct ScriptedMatcher {
        by_width: Mutex<HashMap<u32, Vec<Vec<Candidate>>>>,
    }

    impl ScriptedMatcher {
        fn new(script: Vec<(u32, Vec<Vec<Candidate>>)>) -> Self {
            Self {
                by_width: Mutex::new(script.into_iter().collect()),
            }
        }
    }

    impl IdentityMatcher for ScriptedMatcher {
        fn rank(&self, crop: &Frame, _: &Gallery, top_k: usize) -> Result<Vec<Candidate>, BoxError> {
            let mut script = self.by_width.lock().unwrap();
            let queue = script.entry(crop.width()).or_default();
            let mut next = if queue.is_empty() { Vec::new() } else { queue.remove(0) };
            next.truncate(top_k);
            Ok(next)
        }
    }

    struct HappyClassifier;

    impl EmotionClassifier for HappyClassifier {
        fn classify(&self, _crop: &Frame) -> Result<EmotionDistribution, BoxError> {
            Ok(EmotionDistribution::from_scores([(EmotionLabel::Happy, 75.0)]))
        }
    }

    struct FailingClassifier;

    impl EmotionClassifier for FailingClassifier {
        fn classify(&self, _crop: &Frame) -> Result<EmotionDistribution, BoxError> {
            Err("model not loaded".into())
        }
    }

    fn face(track_id: TrackId, side: f64) -> Detection {
        Detection {
            track_id,
            bbox: BoundingBox::new(100.0, 100.0, side, side),
        }
    }

    fn votes(pairs: &[(&str, f64)]) -> Vec<Candidate> {
        pairs.iter().map(|&(id, d)| Candidate::new(id, d)).collect()
    }

    fn use_case(
        reader: StubReader,
        tracker: ScriptedTracker,
        classifier: Box<dyn EmotionClassifier>,
        matcher: ScriptedMatcher,
        store: Arc<InMemoryRecordStore>,
    ) -> ProcessClassVideoUseCase {
        ProcessClassVideoUseCase::new(
            Box::new(reader),
            Box::new(tracker),
            classifier,
            Box::new(matcher),
            Gallery::default(),
            store,
            Box::new(NullPipelineLogger),
        )
    }

    fn config(class_id: i64, frame_interval: usize, workers: usize) -> RunConfig {
        RunConfig {
            class_id,
            frame_interval,
            top_k: 3,
            workers,
            ..RunConfig::default()
        }
    }

    /// Track 7 (20px box) always votes alice; track 9 (30px box) splits
    /// one vote each between bob and carol.
    fn classroom_scenario() -> (ScriptedTracker, ScriptedMatcher) {
        let tracker = ScriptedTracker::new(vec![
            vec![face(7, 20.0), face(9, 30.0)],
            vec![face(7, 20.0), face(9, 30.0)],
            vec![face(7, 20.0)],
            vec![face(7, 20.0)],
        ]);
        let matcher = ScriptedMatcher::new(vec![
            (
                20,
                vec![
                    votes(&[("alice", 0.2)]),
                    votes(&[("alice", 0.3)]),
                    votes(&[("alice", 0.25)]),
                    votes(&[("alice", 0.4)]),
                ],
            ),
            (30, vec![votes(&[("bob", 0.1)]), votes(&[("carol", 0.05)])]),
        ]);
        (tracker, matcher)
    }

    #[test]
    fn test_classroom_scenario_end_to_end() {
        for workers in [1, 4] {
            let store = Arc::new(InMemoryRecordStore::new());
            let (tracker, matcher) = classroom_scenario();
            let mut uc = use_case(
                StubReader::with_frames(40),
                tracker,
                Box::new(HappyClassifier),
                matcher,
                store.clone(),
            );

            let summary = uc
                .execute(Path::new("class101.mp4"), &config(101, 10, workers))
                .unwrap();

            assert_eq!(summary.frames_sampled, 4);
            assert_eq!(summary.observations, 6);
            assert_eq!(summary.votes, 6);
            assert_eq!((summary.resolved_tracks, summary.unresolved_tracks), (2, 0));
            assert_eq!(summary.records_created, 6);

            let records = store.records().unwrap();
            let alice: Vec<u64> = records
                .iter()
                .filter(|r| r.identity == "alice")
                .map(|r| r.frame_id)
                .collect();
            let carol: Vec<u64> = records
                .iter()
                .filter(|r| r.identity == "carol")
                .map(|r| r.frame_id)
                .collect();
            assert_eq!(alice, vec![0, 1, 2, 3]);
            assert_eq!(carol, vec![0, 1]);
            assert!(records.iter().all(|r| r.class_id == 101));
            assert!(records.iter().all(|r| r.emotion.dominant() == EmotionLabel::Happy));
        }
    }

    #[test]
    fn test_rerun_creates_no_duplicates() {
        let store = Arc::new(InMemoryRecordStore::new());
        for expected_created in [6, 0] {
            let (tracker, matcher) = classroom_scenario();
            let mut uc = use_case(
                StubReader::with_frames(40),
                tracker,
                Box::new(HappyClassifier),
                matcher,
                store.clone(),
            );
            let summary = uc
                .execute(Path::new("class101.mp4"), &config(101, 10, 2))
                .unwrap();
            assert_eq!(summary.records_created, expected_created);
        }
        assert_eq!(store.records().unwrap().len(), 6);
    }

    #[test]
    fn test_unresolved_track_is_not_persisted() {
        let store = Arc::new(InMemoryRecordStore::new());
        let tracker = ScriptedTracker::new(vec![vec![face(7, 20.0), face(5, 40.0)]; 3]);
        let matcher = ScriptedMatcher::new(vec![(20, vec![votes(&[("alice", 0.3)])])]);
        let mut uc = use_case(
            StubReader::with_frames(3),
            tracker,
            Box::new(HappyClassifier),
            matcher,
            store.clone(),
        );

        let summary = uc.execute(Path::new("v.mp4"), &config(1, 1, 1)).unwrap();
        assert_eq!(summary.observations, 6);
        assert_eq!((summary.resolved_tracks, summary.unresolved_tracks), (1, 1));
        assert_eq!(summary.records_created, 3);
        assert!(store.records().unwrap().iter().all(|r| r.identity == "alice"));
    }

    #[test]
    fn test_frame_id_is_emission_index() {
        let store = Arc::new(InMemoryRecordStore::new());
        let tracker = ScriptedTracker::new(vec![vec![face(1, 20.0)]; 4]);
        let matcher = ScriptedMatcher::new(vec![(20, vec![votes(&[("alice", 0.1)])])]);
        let mut uc = use_case(
            StubReader::with_frames(1000),
            tracker,
            Box::new(HappyClassifier),
            matcher,
            store.clone(),
        );

        let summary = uc.execute(Path::new("v.mp4"), &config(1, 300, 1)).unwrap();
        assert_eq!(summary.frames_sampled, 4);
        let ids: Vec<u64> = store.records().unwrap().iter().map(|r| r.frame_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_unopenable_source_fails_before_processing() {
        let store = Arc::new(InMemoryRecordStore::new());
        let (tracker, matcher) = classroom_scenario();
        let mut uc = use_case(
            StubReader::unopenable(),
            tracker,
            Box::new(HappyClassifier),
            matcher,
            store.clone(),
        );

        let err = uc
            .execute(Path::new("/missing/class.mp4"), &config(1, 10, 1))
            .unwrap_err();
        match err {
            AttendanceError::SourceUnavailable { path, .. } => {
                assert_eq!(path, PathBuf::from("/missing/class.mp4"))
            }
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let (tracker, matcher) = classroom_scenario();
        let mut uc = use_case(
            StubReader::with_frames(10),
            tracker,
            Box::new(HappyClassifier),
            matcher,
            Arc::new(InMemoryRecordStore::new()),
        );
        assert!(matches!(
            uc.execute(Path::new("v.mp4"), &config(1, 0, 1)),
            Err(AttendanceError::InvalidInterval(0))
        ));
    }

    #[test]
    fn test_collaborator_fault_aborts_without_persisting() {
        let store = Arc::new(InMemoryRecordStore::new());
        let (tracker, matcher) = classroom_scenario();
        let mut uc = use_case(
            StubReader::with_frames(40),
            tracker,
            Box::new(FailingClassifier),
            matcher,
            store.clone(),
        );

        let err = uc.execute(Path::new("v.mp4"), &config(1, 10, 2)).unwrap_err();
        assert!(matches!(
            err,
            AttendanceError::Collaborator {
                stage: "emotion classifier",
                ..
            }
        ));
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_from_progress_persists_nothing() {
        let store = Arc::new(InMemoryRecordStore::new());
        let (tracker, matcher) = classroom_scenario();
        let mut uc = use_case(
            StubReader::with_frames(40),
            tracker,
            Box::new(HappyClassifier),
            matcher,
            store.clone(),
        );
        let mut cfg = config(1, 10, 1);
        cfg.on_progress = Some(Box::new(|done: usize, _: usize| done < 2));

        let err = uc.execute(Path::new("v.mp4"), &cfg).unwrap_err();
        assert!(matches!(err, AttendanceError::Cancelled));
        assert!(cfg.cancelled.load(Ordering::Relaxed));
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_precancelled_run_persists_nothing() {
        let store = Arc::new(InMemoryRecordStore::new());
        let (tracker, matcher) = classroom_scenario();
        let mut uc = use_case(
            StubReader::with_frames(40),
            tracker,
            Box::new(HappyClassifier),
            matcher,
            store.clone(),
        );
        let cfg = config(1, 10, 1);
        cfg.cancelled.store(true, Ordering::Relaxed);

        assert!(matches!(
            uc.execute(Path::new("v.mp4"), &cfg),
            Err(AttendanceError::Cancelled)
        ));
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_video_without_faces_creates_nothing() {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut uc = use_case(
            StubReader::with_frames(5),
            ScriptedTracker::new(Vec::new()),
            Box::new(HappyClassifier),
            ScriptedMatcher::new(Vec::new()),
            store.clone(),
        );
        let summary = uc.execute(Path::new("v.mp4"), &config(1, 2, 1)).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                frames_sampled: 3,
                ..RunSummary::default()
            }
        );
    }
}

//! Enrollment and monitoring loops.
//!
//! Both are single-threaded: grab a frame, analyze it, annotate, poll keys,
//! repeat. Preconditions (an enrolled gallery, a working camera, loaded
//! models) are checked before the loop and are fatal; anything that goes
//! wrong inside one iteration is logged and the loop carries on.

use crate::keys::{Key, KeySource};
use crate::overlay::{Annotation, Display, Tone};
use roomguard_core::{
    best_match, AnalyzerError, BoundingBox, DescriptorKind, DetectedFace, EnrolledIdentity, FaceAnalyzer,
    Matcher, MatchResult, OnnxAnalyzer,
};
use roomguard_hw::{Camera, CameraError, FrameSource};
use roomguard_store::{IdentityStore, StoreError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("enrolled identities unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("no active authorized identities in {0}")]
    EmptyGallery(String),
    #[error("none of the identities in {location} can be compared as {kind:?} descriptors{dims}")]
    IncompatibleGallery {
        location: String,
        kind: DescriptorKind,
        dims: String,
    },
    #[error("camera unavailable: {0}")]
    Camera(#[source] CameraError),
    #[error("face analyzer unavailable: {0}")]
    Analyzer(#[from] AnalyzerError),
}

/// Opens the camera and models a session needs. Only called once the
/// session's cheaper preconditions hold.
pub trait Hardware {
    type Source: FrameSource;
    type Analyzer: FaceAnalyzer;

    fn open_camera(&mut self) -> Result<Self::Source, CameraError>;
    fn load_analyzer(&mut self) -> Result<Self::Analyzer, AnalyzerError>;
}

/// V4L2 camera plus ONNX models on this machine.
pub struct LocalHardware {
    pub camera_device: String,
    pub width: u32,
    pub height: u32,
    pub warmup_frames: usize,
    pub model_dir: PathBuf,
    pub kind: DescriptorKind,
}

impl Hardware for LocalHardware {
    type Source = Camera;
    type Analyzer = OnnxAnalyzer;

    fn open_camera(&mut self) -> Result<Camera, CameraError> {
        let mut camera = Camera::open(&self.camera_device, self.width, self.height)?;
        camera.warm_up(self.warmup_frames);
        Ok(camera)
    }

    fn load_analyzer(&mut self) -> Result<OnnxAnalyzer, AnalyzerError> {
        OnnxAnalyzer::load(&self.model_dir, self.kind)
    }
}

/// Per-face outcome within one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceVerdict {
    pub bbox: BoundingBox,
    pub authorized: bool,
    /// Closest enrolled identity, when one was comparable.
    pub closest: Option<String>,
    pub distance: Option<f32>,
}

/// What one frame showed.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameVerdict {
    NoFace,
    Faces(Vec<FaceVerdict>),
}

/// Keep the identities `matcher` can compare against what the analyzer
/// produces. Anything else would turn every sighting into a false alarm.
pub fn usable_gallery(
    gallery: Vec<EnrolledIdentity>,
    kind: DescriptorKind,
    embedding_len: Option<usize>,
) -> Vec<EnrolledIdentity> {
    gallery
        .into_iter()
        .filter(|identity| {
            let d = &identity.descriptor;
            let fits = d.kind() == kind
                && (kind != DescriptorKind::Embedding || embedding_len.map_or(true, |n| n == d.len()));
            if !fits {
                tracing::warn!(
                    name = %identity.name,
                    stored = ?d.kind(),
                    components = d.len(),
                    expected = ?kind,
                    expected_components = ?embedding_len,
                    "ignoring enrolled identity the current strategy cannot compare, re-enroll it"
                );
            }
            fits
        })
        .collect()
}

/// Compare every detected face against the gallery.
pub fn assess_frame(
    faces: Vec<DetectedFace>,
    gallery: &[EnrolledIdentity],
    matcher: &dyn Matcher,
    tolerance: f32,
) -> FrameVerdict {
    if faces.is_empty() {
        return FrameVerdict::NoFace;
    }

    let verdicts = faces
        .into_iter()
        .map(|face| {
            let found = best_match(matcher, &face.descriptor, gallery, tolerance);
            if let MatchResult::Invalid(reason) = &found.result {
                tracing::debug!(%reason, "face not comparable, treating as unauthorized");
            }
            FaceVerdict {
                bbox: face.bbox,
                authorized: found.is_match(),
                closest: found.identity.map(|i| i.name.clone()),
                distance: found.result.distance(),
            }
        })
        .collect();

    FrameVerdict::Faces(verdicts)
}

fn annotate(verdict: &FrameVerdict) -> Vec<Annotation> {
    match verdict {
        FrameVerdict::NoFace => Vec::new(),
        FrameVerdict::Faces(faces) => faces
            .iter()
            .map(|f| match (f.authorized, f.closest.as_deref()) {
                (true, Some(name)) => Annotation::face(f.bbox.clone(), format!("Authorized: {name}"), Tone::Authorized),
                (true, None) => Annotation::face(f.bbox.clone(), "Authorized", Tone::Authorized),
                (false, _) => Annotation::face(f.bbox.clone(), "Unauthorized", Tone::Unauthorized),
            })
            .collect(),
    }
}

/// Counters reported when monitoring stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub frames: u64,
    pub dark_frames: u64,
    pub empty_frames: u64,
    pub authorized_sightings: u64,
    pub unauthorized_sightings: u64,
    /// Frames lost to capture or analysis errors.
    pub errors: u64,
}

pub struct MonitorOptions {
    pub room: Option<i64>,
    pub tolerance: f32,
}

/// Watch the camera until `Quit`, labelling every face.
///
/// The gallery is loaded first: if nothing is enrolled the function returns
/// before touching the hardware.
pub fn run_monitor<H: Hardware>(
    store: &dyn IdentityStore,
    hardware: &mut H,
    matcher: &dyn Matcher,
    display: &mut dyn Display,
    keys: &mut dyn KeySource,
    options: &MonitorOptions,
) -> Result<MonitorSummary, SessionError> {
    let gallery = store.load_gallery(options.room)?;
    if gallery.is_empty() {
        return Err(SessionError::EmptyGallery(store.location()));
    }

    let mut analyzer = hardware.load_analyzer()?;
    let gallery = usable_gallery(gallery, matcher.kind(), analyzer.embedding_len());
    if gallery.is_empty() {
        return Err(SessionError::IncompatibleGallery {
            location: store.location(),
            kind: matcher.kind(),
            dims: analyzer.embedding_len().map(|n| format!(" of length {n}")).unwrap_or_default(),
        });
    }
    let mut camera = hardware.open_camera().map_err(SessionError::Camera)?;

    tracing::info!(
        identities = gallery.len(),
        room = options.room,
        tolerance = options.tolerance,
        "monitoring started, press q then Enter to quit"
    );

    let mut summary = MonitorSummary::default();
    while keys.poll() != Some(Key::Quit) {
        let frame = match camera.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed");
                summary.errors += 1;
                continue;
            }
        };
        summary.frames += 1;
        if frame.is_dark {
            summary.dark_frames += 1;
            continue;
        }

        let faces = match analyzer.analyze(&frame.data, frame.width, frame.height) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, seq = frame.sequence, "face analysis failed");
                summary.errors += 1;
                continue;
            }
        };

        let verdict = assess_frame(faces, &gallery, matcher, options.tolerance);
        match &verdict {
            FrameVerdict::NoFace => summary.empty_frames += 1,
            FrameVerdict::Faces(faces) => {
                for face in faces {
                    if face.authorized {
                        summary.authorized_sightings += 1;
                        tracing::debug!(name = ?face.closest, distance = ?face.distance, "authorized face");
                    } else {
                        summary.unauthorized_sightings += 1;
                        tracing::warn!(
                            at = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                            closest = ?face.closest,
                            distance = ?face.distance,
                            "UNAUTHORIZED ACCESS DETECTED"
                        );
                    }
                }
            }
        }

        if let Err(e) = display.show(&frame, &annotate(&verdict)) {
            tracing::warn!(error = %e, "overlay failed");
        }
    }

    tracing::info!(?summary, "monitoring stopped");
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollOutcome {
    Enrolled(EnrolledIdentity),
    Cancelled,
}

pub struct EnrollOptions {
    pub name: String,
    pub room: Option<i64>,
}

/// Show the live feed until `Capture` with a face in view, then store the
/// most confident face. `Quit` cancels without storing anything.
pub fn run_enroll<H: Hardware>(
    store: &mut dyn IdentityStore,
    hardware: &mut H,
    display: &mut dyn Display,
    keys: &mut dyn KeySource,
    options: &EnrollOptions,
) -> Result<EnrollOutcome, SessionError> {
    let mut analyzer = hardware.load_analyzer()?;
    let mut camera = hardware.open_camera().map_err(SessionError::Camera)?;

    tracing::info!(
        name = %options.name,
        store = %store.location(),
        "centre your face, press Enter to capture or q then Enter to quit"
    );

    loop {
        let frame = match camera.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "failed to grab frame");
                match keys.poll() {
                    Some(Key::Quit) => return Ok(EnrollOutcome::Cancelled),
                    Some(Key::Capture) => tracing::warn!("capture ignored: no frame available, try again"),
                    None => {}
                }
                continue;
            }
        };

        let faces = if frame.is_dark {
            Vec::new()
        } else {
            analyzer
                .analyze(&frame.data, frame.width, frame.height)
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "face analysis failed");
                    Vec::new()
                })
        };

        let annotations = match faces.first() {
            Some(face) => vec![Annotation::face(
                face.bbox.clone(),
                "Face detected - press Enter to capture",
                Tone::Authorized,
            )],
            None => vec![Annotation::banner("No face detected", Tone::Info)],
        };
        if let Err(e) = display.show(&frame, &annotations) {
            tracing::warn!(error = %e, "overlay failed");
        }

        match keys.poll() {
            Some(Key::Quit) => {
                tracing::info!("enrollment cancelled");
                return Ok(EnrollOutcome::Cancelled);
            }
            Some(Key::Capture) => {
                let Some(face) = faces.first() else {
                    tracing::warn!("no face detected, centre your face and try again");
                    continue;
                };
                match store.enroll(&options.name, &face.descriptor, options.room) {
                    Ok(identity) => {
                        tracing::info!(
                            name = %identity.name,
                            confidence = face.bbox.confidence,
                            components = identity.descriptor.len(),
                            "face enrolled"
                        );
                        return Ok(EnrollOutcome::Enrolled(identity));
                    }
                    Err(e) => tracing::error!(error = %e, "saving face failed"),
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::DisplayError;
    use roomguard_core::{Embedding, EmbeddingMatcher, FaceDescriptor, LandmarkLayout, LandmarkMatcher, LandmarkSet};
    use roomguard_hw::Frame;
    use roomguard_store::{JsonFileStore, SqliteStore};
    use std::collections::VecDeque;

    fn bbox() -> BoundingBox {
        BoundingBox { x: 1.0, y: 1.0, width: 4.0, height: 4.0, confidence: 0.9, landmarks: None }
    }

    fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace { bbox: bbox(), descriptor: Embedding::new(values).into() }
    }

    fn landmark_face(offset: f32) -> DetectedFace {
        let points = [(30.0, 40.0), (50.0, 40.0), (40.0, 50.0), (33.0, 60.0), (47.0, 60.0)]
            .map(|(x, y)| (x + offset, y));
        DetectedFace { bbox: bbox(), descriptor: LandmarkSet::from(points).into() }
    }

    /// Replays scripted analyzer results, one per frame.
    struct ScriptedAnalyzer {
        script: VecDeque<Result<Vec<DetectedFace>, ()>>,
        embedding_len: Option<usize>,
    }

    impl FaceAnalyzer for ScriptedAnalyzer {
        fn analyze(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<DetectedFace>, AnalyzerError> {
            match self.script.pop_front() {
                Some(Ok(faces)) => Ok(faces),
                Some(Err(())) => Err(AnalyzerError::Detector(
                    roomguard_core::detector::DetectorError::InferenceFailed("scripted".into()),
                )),
                None => Ok(Vec::new()),
            }
        }

        fn embedding_len(&self) -> Option<usize> {
            self.embedding_len
        }
    }

    /// Fails the first `failures` grabs, then yields mid-grey frames.
    struct FakeCamera {
        failures: usize,
    }

    impl FrameSource for FakeCamera {
        fn next_frame(&mut self) -> Result<Frame, CameraError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(CameraError::CaptureFailed("dequeue timed out".into()));
            }
            Ok(Frame::from_gray(vec![128; 64], 8, 8, 0))
        }
    }

    #[derive(Default)]
    struct FakeHardware {
        script: Vec<Result<Vec<DetectedFace>, ()>>,
        embedding_len: Option<usize>,
        failing_frames: usize,
        camera_opens: usize,
        camera_fails: bool,
    }

    impl Hardware for FakeHardware {
        type Source = FakeCamera;
        type Analyzer = ScriptedAnalyzer;

        fn open_camera(&mut self) -> Result<FakeCamera, CameraError> {
            self.camera_opens += 1;
            if self.camera_fails {
                return Err(CameraError::DeviceNotFound("/dev/video9".into()));
            }
            Ok(FakeCamera { failures: self.failing_frames })
        }

        fn load_analyzer(&mut self) -> Result<ScriptedAnalyzer, AnalyzerError> {
            Ok(ScriptedAnalyzer {
                script: self.script.drain(..).collect(),
                embedding_len: self.embedding_len,
            })
        }
    }

    /// Yields `None` for scripted polls, then the final key forever.
    struct ScriptedKeys {
        keys: VecDeque<Option<Key>>,
    }

    impl ScriptedKeys {
        fn new(keys: Vec<Option<Key>>) -> Self {
            Self { keys: keys.into() }
        }
    }

    impl KeySource for ScriptedKeys {
        fn poll(&mut self) -> Option<Key> {
            self.keys.pop_front().unwrap_or(Some(Key::Quit))
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        shown: Vec<Vec<Annotation>>,
    }

    impl Display for RecordingDisplay {
        fn show(&mut self, _: &Frame, annotations: &[Annotation]) -> Result<(), DisplayError> {
            self.shown.push(annotations.to_vec());
            Ok(())
        }
    }

    fn options() -> MonitorOptions {
        MonitorOptions { room: None, tolerance: 0.6 }
    }

    fn enrolled_store(dir: &tempfile::TempDir) -> JsonFileStore {
        let mut store = JsonFileStore::new(dir.path().join("authorized_face.json"));
        store.enroll("owner", &Embedding::new(vec![0.0; 4]).into(), None).unwrap();
        store
    }

    #[test]
    fn test_monitor_without_enrollment_never_opens_camera() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("authorized_face.json"));
        let mut hw = FakeHardware::default();

        let err = run_monitor(
            &store,
            &mut hw,
            &EmbeddingMatcher,
            &mut RecordingDisplay::default(),
            &mut ScriptedKeys::new(vec![]),
            &options(),
        )
        .unwrap_err();

        assert!(matches!(err, SessionError::Store(StoreError::NotEnrolled(_))));
        assert_eq!(hw.camera_opens, 0);
    }

    #[test]
    fn test_monitor_with_empty_database_never_opens_camera() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut hw = FakeHardware::default();
        let err = run_monitor(
            &store,
            &mut hw,
            &EmbeddingMatcher,
            &mut RecordingDisplay::default(),
            &mut ScriptedKeys::new(vec![]),
            &options(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::EmptyGallery(_)));
        assert_eq!(hw.camera_opens, 0);
    }

    #[test]
    fn test_monitor_camera_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = enrolled_store(&dir);
        let mut hw = FakeHardware { camera_fails: true, ..Default::default() };
        let err = run_monitor(
            &store,
            &mut hw,
            &EmbeddingMatcher,
            &mut RecordingDisplay::default(),
            &mut ScriptedKeys::new(vec![None]),
            &options(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Camera(_)));
    }

    #[test]
    fn test_monitor_labels_faces_and_survives_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = enrolled_store(&dir);
        let mut hw = FakeHardware {
            script: vec![
                Ok(vec![face(vec![0.1, 0.0, 0.0, 0.0])]),
                Err(()),
                Ok(vec![]),
                Ok(vec![face(vec![1.0, 1.0, 0.0, 0.0]), face(vec![0.0; 4])]),
            ],
            ..Default::default()
        };
        let mut display = RecordingDisplay::default();

        let summary = run_monitor(
            &store,
            &mut hw,
            &EmbeddingMatcher,
            &mut display,
            &mut ScriptedKeys::new(vec![None, None, None, None]),
            &options(),
        )
        .unwrap();

        assert_eq!(
            summary,
            MonitorSummary {
                frames: 4,
                dark_frames: 0,
                empty_frames: 1,
                authorized_sightings: 2,
                unauthorized_sightings: 1,
                errors: 1,
            }
        );
        // the errored frame is not shown
        assert_eq!(display.shown.len(), 3);
        assert_eq!(display.shown[0][0].label, "Authorized: authorized");
        assert!(display.shown[1].is_empty());
        assert_eq!(display.shown[2][0].tone, Tone::Unauthorized);
        assert_eq!(display.shown[2][1].tone, Tone::Authorized);
    }

    #[test]
    fn test_assess_frame_distinguishes_no_face_from_mismatch() {
        let gallery = vec![EnrolledIdentity::new(Some(1), "alice", Embedding::new(vec![0.0, 0.0]).into()).unwrap()];

        assert_eq!(assess_frame(vec![], &gallery, &EmbeddingMatcher, 0.6), FrameVerdict::NoFace);

        let FrameVerdict::Faces(v) = assess_frame(vec![face(vec![3.0, 4.0])], &gallery, &EmbeddingMatcher, 0.6) else {
            panic!("expected faces");
        };
        assert!(!v[0].authorized);
        assert_eq!(v[0].closest.as_deref(), Some("alice"));
        assert_eq!(v[0].distance, Some(5.0));

        // wrong dimension: not comparable, still unauthorized
        let FrameVerdict::Faces(v) = assess_frame(vec![face(vec![0.0; 3])], &gallery, &EmbeddingMatcher, 0.6) else {
            panic!("expected faces");
        };
        assert!(!v[0].authorized);
        assert_eq!(v[0].closest, None);
        assert_eq!(v[0].distance, None);
    }

    #[test]
    fn test_enroll_captures_first_face() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("authorized_face.json"));
        let mut hw = FakeHardware {
            script: vec![Ok(vec![]), Ok(vec![face(vec![0.5; 4]), face(vec![0.9; 4])])],
            ..Default::default()
        };
        let mut display = RecordingDisplay::default();

        // Capture while no face is visible is ignored; the second capture sticks.
        let outcome = run_enroll(
            &mut store,
            &mut hw,
            &mut display,
            &mut ScriptedKeys::new(vec![Some(Key::Capture), Some(Key::Capture)]),
            &EnrollOptions { name: "owner".into(), room: None },
        )
        .unwrap();

        let EnrollOutcome::Enrolled(identity) = outcome else {
            panic!("expected enrollment, got {outcome:?}");
        };
        assert_eq!(identity.descriptor, FaceDescriptor::from(Embedding::new(vec![0.5; 4])));
        assert_eq!(display.shown[0][0].label, "No face detected");
        assert_eq!(store.load_gallery(None).unwrap()[0].descriptor, identity.descriptor);
    }

    #[test]
    fn test_enroll_quit_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authorized_face.json");
        let mut store = JsonFileStore::new(&path);
        let mut hw = FakeHardware { script: vec![Ok(vec![face(vec![0.5; 4])])], ..Default::default() };

        let outcome = run_enroll(
            &mut store,
            &mut hw,
            &mut RecordingDisplay::default(),
            &mut ScriptedKeys::new(vec![None, Some(Key::Quit)]),
            &EnrollOptions { name: "owner".into(), room: None },
        )
        .unwrap();

        assert_eq!(outcome, EnrollOutcome::Cancelled);
        assert!(!path.exists());
    }

    #[test]
    fn test_enroll_into_sqlite_room() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let room = store.add_room("lab", 0).unwrap();
        let mut hw = FakeHardware { script: vec![Ok(vec![face(vec![0.2; 4])])], ..Default::default() };

        let outcome = run_enroll(
            &mut store,
            &mut hw,
            &mut RecordingDisplay::default(),
            &mut ScriptedKeys::new(vec![Some(Key::Capture)]),
            &EnrollOptions { name: "alice".into(), room: Some(room.id) },
        )
        .unwrap();

        assert!(matches!(outcome, EnrollOutcome::Enrolled(_)));
        let gallery = store.load_gallery(Some(room.id)).unwrap();
        assert_eq!(gallery[0].name, "alice");
    }

    #[test]
    fn test_monitor_with_wrong_embedding_length_never_opens_camera() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("authorized_face.json"));
        store.enroll("authorized", &Embedding::new(vec![0.1; 128]).into(), None).unwrap();
        let mut hw = FakeHardware {
            embedding_len: Some(512),
            script: vec![Ok(vec![face(vec![0.1; 512])])],
            ..Default::default()
        };

        let err = run_monitor(
            &store,
            &mut hw,
            &EmbeddingMatcher,
            &mut RecordingDisplay::default(),
            &mut ScriptedKeys::new(vec![None]),
            &options(),
        )
        .unwrap_err();

        assert!(matches!(err, SessionError::IncompatibleGallery { kind: DescriptorKind::Embedding, .. }));
        assert_eq!(hw.camera_opens, 0);
    }

    #[test]
    fn test_monitor_landmark_strategy_on_embedding_enrollment_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = enrolled_store(&dir);
        let mut hw = FakeHardware::default();

        let err = run_monitor(
            &store,
            &mut hw,
            &LandmarkMatcher::new(LandmarkLayout::FivePoint),
            &mut RecordingDisplay::default(),
            &mut ScriptedKeys::new(vec![None]),
            &MonitorOptions { room: None, tolerance: 0.7 },
        )
        .unwrap_err();

        assert!(matches!(err, SessionError::IncompatibleGallery { kind: DescriptorKind::Landmarks, .. }));
        assert_eq!(hw.camera_opens, 0);
    }

    #[test]
    fn test_usable_gallery_keeps_only_comparable_identities() {
        let gallery = vec![
            EnrolledIdentity::new(Some(1), "old", Embedding::new(vec![0.0; 128]).into()).unwrap(),
            EnrolledIdentity::new(Some(2), "current", Embedding::new(vec![0.0; 512]).into()).unwrap(),
            EnrolledIdentity::new(Some(3), "points", LandmarkSet::new(vec![[0.0, 0.0]; 5]).into()).unwrap(),
        ];

        let names = |kept: Vec<EnrolledIdentity>| kept.into_iter().map(|i| i.name).collect::<Vec<_>>();
        assert_eq!(names(usable_gallery(gallery.clone(), DescriptorKind::Embedding, Some(512))), vec!["current"]);
        assert_eq!(names(usable_gallery(gallery.clone(), DescriptorKind::Embedding, None)), vec!["old", "current"]);
        assert_eq!(names(usable_gallery(gallery, DescriptorKind::Landmarks, Some(512))), vec!["points"]);
    }

    #[test]
    fn test_monitor_landmark_strategy_five_point() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("authorized_face.json"));
        store.enroll("authorized", &landmark_face(0.0).descriptor, None).unwrap();
        let mut hw = FakeHardware {
            script: vec![
                Ok(vec![landmark_face(0.5)]),
                Ok(vec![landmark_face(5.0)]),
                Ok(vec![face(vec![0.0; 4])]),
            ],
            ..Default::default()
        };
        let mut display = RecordingDisplay::default();

        let summary = run_monitor(
            &store,
            &mut hw,
            &LandmarkMatcher::new(LandmarkLayout::FivePoint),
            &mut display,
            &mut ScriptedKeys::new(vec![None, None, None]),
            &MonitorOptions { room: None, tolerance: 0.7 },
        )
        .unwrap();

        // shifted by 0.5 matches, by 5.0 does not, an embedding is not comparable
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.authorized_sightings, 1);
        assert_eq!(summary.unauthorized_sightings, 2);
        assert_eq!(display.shown[0][0].label, "Authorized: authorized");
        assert_eq!(display.shown[1][0].tone, Tone::Unauthorized);
        assert_eq!(display.shown[2][0].tone, Tone::Unauthorized);
    }

    #[test]
    fn test_enroll_camera_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authorized_face.json");
        let mut store = JsonFileStore::new(&path);
        let mut hw = FakeHardware { camera_fails: true, ..Default::default() };

        let err = run_enroll(
            &mut store,
            &mut hw,
            &mut RecordingDisplay::default(),
            &mut ScriptedKeys::new(vec![Some(Key::Capture)]),
            &EnrollOptions { name: "authorized".into(), room: None },
        )
        .unwrap_err();

        assert!(matches!(err, SessionError::Camera(CameraError::DeviceNotFound(_))));
        assert_eq!(hw.camera_opens, 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_enroll_capture_without_frame_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authorized_face.json");
        let mut store = JsonFileStore::new(&path);
        let mut hw = FakeHardware {
            failing_frames: 1,
            script: vec![Ok(vec![face(vec![0.5; 4])])],
            ..Default::default()
        };
        let mut display = RecordingDisplay::default();

        // Capture lands on the failed grab; the next frame has a face but Quit follows.
        let outcome = run_enroll(
            &mut store,
            &mut hw,
            &mut display,
            &mut ScriptedKeys::new(vec![Some(Key::Capture), Some(Key::Quit)]),
            &EnrollOptions { name: "authorized".into(), room: None },
        )
        .unwrap();

        assert_eq!(outcome, EnrollOutcome::Cancelled);
        assert_eq!(display.shown.len(), 1);
        assert!(!path.exists());
    }
}

//! Frame → descriptors: the seam between capture and matching.

use crate::detector::{self, DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_EMBEDDING_DIM};
use crate::types::{DescriptorKind, DetectedFace, LandmarkSet};
use std::path::Path;
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in a grayscale frame and describes each one.
///
/// Zero faces is `Ok(vec![])`, not an error.
pub trait FaceAnalyzer {
    fn analyze(&mut self, frame: &[u8], width: u32, height: u32) -> Result<Vec<DetectedFace>, AnalyzerError>;

    /// Length of the embeddings this analyzer produces, if it produces any.
    fn embedding_len(&self) -> Option<usize> {
        None
    }
}

/// SCRFD detection, plus ArcFace when embeddings are wanted.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: Option<FaceRecognizer>,
}

impl OnnxAnalyzer {
    /// Load models from `model_dir`. The recognizer is only loaded for
    /// [`DescriptorKind::Embedding`].
    pub fn load(model_dir: &Path, kind: DescriptorKind) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = match kind {
            DescriptorKind::Embedding => Some(FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?),
            DescriptorKind::Landmarks => None,
        };
        Ok(Self { detector, recognizer })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn analyze(&mut self, frame: &[u8], width: u32, height: u32) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let image = detector::gray_frame(frame, width, height)?;
        let boxes = self.detector.detect(&image)?;

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let descriptor = match self.recognizer.as_mut() {
                Some(recognizer) => match recognizer.extract(&image, &bbox) {
                    Ok(embedding) => embedding.into(),
                    Err(e) => {
                        tracing::warn!(error = %e, confidence = bbox.confidence, "skipping face: embedding failed");
                        continue;
                    }
                },
                None => match bbox.landmarks {
                    Some(points) => LandmarkSet::from(points).into(),
                    None => {
                        tracing::warn!(confidence = bbox.confidence, "skipping face: no landmarks");
                        continue;
                    }
                },
            };
            faces.push(DetectedFace { bbox, descriptor });
        }

        tracing::debug!(faces = faces.len(), "frame analyzed");
        Ok(faces)
    }

    fn embedding_len(&self) -> Option<usize> {
        self.recognizer.as_ref().map(|_| ARCFACE_EMBEDDING_DIM)
    }
}

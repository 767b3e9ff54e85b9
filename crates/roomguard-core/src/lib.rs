//! roomguard-core — face descriptors and the authorization matcher.
//!
//! Detection (SCRFD) and recognition (ArcFace) run on ONNX Runtime; the
//! matcher compares what they produce against an enrolled identity.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use analyzer::{AnalyzerError, FaceAnalyzer, OnnxAnalyzer};
pub use matcher::{
    best_match, EmbeddingMatcher, GalleryMatch, InvalidInput, LandmarkLayout, LandmarkMatcher, MatchResult,
    MatchStrategy, Matcher, DEFAULT_EMBEDDING_TOLERANCE, DEFAULT_LANDMARK_THRESHOLD,
};
pub use types::{
    BoundingBox, DescriptorKind, DetectedFace, Embedding, EnrolledIdentity, FaceDescriptor, IdentityError,
    LandmarkSet,
};

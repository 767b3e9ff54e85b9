//! Descriptor matching: decide whether an observed face is the enrolled one.
//!
//! Two strategies exist and they are not interchangeable:
//!
//! * [`EmbeddingMatcher`] compares fixed-length embedding vectors by
//!   Euclidean distance. Default tolerance [`DEFAULT_EMBEDDING_TOLERANCE`] (0.6).
//! * [`LandmarkMatcher`] averages the Euclidean distances between the nose
//!   tip, left eye and right eye points of two landmark sets. Default
//!   threshold [`DEFAULT_LANDMARK_THRESHOLD`] is **0.7**. Older notes on this
//!   strategy quote 0.3 instead; nothing settles which one was intended, so
//!   treat the value as a deployment setting and calibrate it.
//!
//! Both accept when `distance <= tolerance`, which makes identical
//! descriptors match at any non-negative tolerance. Malformed input never
//! errors; it yields [`MatchResult::Invalid`], a definite non-match.

use crate::types::{DescriptorKind, EnrolledIdentity, FaceDescriptor, LandmarkSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_EMBEDDING_TOLERANCE: f32 = 0.6;
pub const DEFAULT_LANDMARK_THRESHOLD: f32 = 0.7;

/// Why a comparison could not be made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidInput {
    #[error("descriptor is empty")]
    Empty,
    #[error("cannot compare {enrolled:?} descriptor with {observed:?} descriptor")]
    KindMismatch {
        enrolled: DescriptorKind,
        observed: DescriptorKind,
    },
    #[error("embedding dimensions differ: enrolled {enrolled}, observed {observed}")]
    DimensionMismatch { enrolled: usize, observed: usize },
    #[error("landmark {index} missing (set has {len} points)")]
    MissingLandmark { index: usize, len: usize },
    #[error("descriptor contains a non-finite value")]
    NonFinite,
    #[error("no enrolled identities to compare against")]
    NoCandidates,
}

/// Per-point distances behind a landmark comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkDistances {
    pub nose: f32,
    pub left_eye: f32,
    pub right_eye: f32,
}

/// Distance used to reach a decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    pub value: f32,
    pub landmarks: Option<LandmarkDistances>,
}

/// Outcome of comparing one observed descriptor against one enrolled descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Match(Distance),
    Mismatch(Distance),
    Invalid(InvalidInput),
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match(_))
    }

    pub fn distance(&self) -> Option<f32> {
        match self {
            MatchResult::Match(d) | MatchResult::Mismatch(d) => Some(d.value),
            MatchResult::Invalid(_) => None,
        }
    }

    fn decide(distance: Distance, tolerance: f32) -> Self {
        // NaN or negative tolerance can never be satisfied.
        if distance.value <= tolerance {
            MatchResult::Match(distance)
        } else {
            MatchResult::Mismatch(distance)
        }
    }
}

/// Strategy for comparing an observed descriptor with an enrolled one.
pub trait Matcher {
    /// Descriptor kind this matcher can compare; anything else is `Invalid`.
    fn kind(&self) -> DescriptorKind;

    fn compare(
        &self,
        enrolled: &FaceDescriptor,
        observed: &FaceDescriptor,
        tolerance: f32,
    ) -> MatchResult;
}

/// Euclidean distance between embedding vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddingMatcher;

impl Matcher for EmbeddingMatcher {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Embedding
    }

    fn compare(
        &self,
        enrolled: &FaceDescriptor,
        observed: &FaceDescriptor,
        tolerance: f32,
    ) -> MatchResult {
        let (a, b) = match (enrolled, observed) {
            (FaceDescriptor::Embedding(a), FaceDescriptor::Embedding(b)) => (a, b),
            _ => {
                return MatchResult::Invalid(InvalidInput::KindMismatch {
                    enrolled: enrolled.kind(),
                    observed: observed.kind(),
                })
            }
        };

        if a.values.is_empty() || b.values.is_empty() {
            return MatchResult::Invalid(InvalidInput::Empty);
        }
        if a.values.len() != b.values.len() {
            return MatchResult::Invalid(InvalidInput::DimensionMismatch {
                enrolled: a.values.len(),
                observed: b.values.len(),
            });
        }

        let value = a.euclidean_distance(b);
        if !value.is_finite() {
            return MatchResult::Invalid(InvalidInput::NonFinite);
        }

        MatchResult::decide(
            Distance {
                value,
                landmarks: None,
            },
            tolerance,
        )
    }
}

/// Index convention of a landmark set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkLayout {
    /// Cloud vision API ordering: nose tip 0, left eye 1, right eye 3.
    #[default]
    VisionApi,
    /// Five-point detector ordering: left eye 0, right eye 1, nose 2.
    FivePoint,
}

impl LandmarkLayout {
    /// Indices of `[nose, left_eye, right_eye]`.
    pub fn indices(self) -> [usize; 3] {
        match self {
            LandmarkLayout::VisionApi => [0, 1, 3],
            LandmarkLayout::FivePoint => [2, 0, 1],
        }
    }
}

/// Average distance between the nose tip and both eyes of two landmark sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct LandmarkMatcher {
    pub layout: LandmarkLayout,
}

impl LandmarkMatcher {
    pub fn new(layout: LandmarkLayout) -> Self {
        Self { layout }
    }

    fn point_distance(a: &LandmarkSet, b: &LandmarkSet, index: usize) -> Result<f32, InvalidInput> {
        let pa = a.get(index).ok_or(InvalidInput::MissingLandmark {
            index,
            len: a.points.len(),
        })?;
        let pb = b.get(index).ok_or(InvalidInput::MissingLandmark {
            index,
            len: b.points.len(),
        })?;
        let d = ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2)).sqrt();
        if d.is_finite() {
            Ok(d)
        } else {
            Err(InvalidInput::NonFinite)
        }
    }

    fn distances(&self, a: &LandmarkSet, b: &LandmarkSet) -> Result<LandmarkDistances, InvalidInput> {
        if a.points.is_empty() || b.points.is_empty() {
            return Err(InvalidInput::Empty);
        }
        let [nose, left_eye, right_eye] = self.layout.indices();
        Ok(LandmarkDistances {
            nose: Self::point_distance(a, b, nose)?,
            left_eye: Self::point_distance(a, b, left_eye)?,
            right_eye: Self::point_distance(a, b, right_eye)?,
        })
    }
}

impl Matcher for LandmarkMatcher {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Landmarks
    }

    fn compare(
        &self,
        enrolled: &FaceDescriptor,
        observed: &FaceDescriptor,
        tolerance: f32,
    ) -> MatchResult {
        let (a, b) = match (enrolled, observed) {
            (FaceDescriptor::Landmarks(a), FaceDescriptor::Landmarks(b)) => (a, b),
            _ => {
                return MatchResult::Invalid(InvalidInput::KindMismatch {
                    enrolled: enrolled.kind(),
                    observed: observed.kind(),
                })
            }
        };

        match self.distances(a, b) {
            Ok(parts) => {
                let value = (parts.nose + parts.left_eye + parts.right_eye) / 3.0;
                tracing::trace!(
                    nose = parts.nose,
                    left_eye = parts.left_eye,
                    right_eye = parts.right_eye,
                    average = value,
                    "landmark distances"
                );
                MatchResult::decide(
                    Distance {
                        value,
                        landmarks: Some(parts),
                    },
                    tolerance,
                )
            }
            Err(invalid) => MatchResult::Invalid(invalid),
        }
    }
}

/// Which matcher a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Embedding,
    Landmark,
}

impl MatchStrategy {
    pub fn matcher(self, layout: LandmarkLayout) -> Box<dyn Matcher + Send> {
        match self {
            MatchStrategy::Embedding => Box::new(EmbeddingMatcher),
            MatchStrategy::Landmark => Box::new(LandmarkMatcher::new(layout)),
        }
    }

    pub fn default_tolerance(self) -> f32 {
        match self {
            MatchStrategy::Embedding => DEFAULT_EMBEDDING_TOLERANCE,
            MatchStrategy::Landmark => DEFAULT_LANDMARK_THRESHOLD,
        }
    }
}

/// Closest gallery entry for one observed face.
#[derive(Debug, Clone)]
pub struct GalleryMatch<'a> {
    /// Closest comparable identity; `None` if nothing was comparable.
    pub identity: Option<&'a EnrolledIdentity>,
    pub result: MatchResult,
}

impl GalleryMatch<'_> {
    pub fn is_match(&self) -> bool {
        self.result.is_match()
    }
}

/// Compare `observed` against every gallery entry and keep the closest.
///
/// Always visits every entry, no early exit on the first match.
pub fn best_match<'a>(
    matcher: &dyn Matcher,
    observed: &FaceDescriptor,
    gallery: &'a [EnrolledIdentity],
    tolerance: f32,
) -> GalleryMatch<'a> {
    let mut best: Option<(&EnrolledIdentity, MatchResult)> = None;
    let mut last_invalid = InvalidInput::NoCandidates;

    for identity in gallery {
        let result = matcher.compare(&identity.descriptor, observed, tolerance);
        let Some(distance) = result.distance() else {
            if let MatchResult::Invalid(reason) = result {
                last_invalid = reason;
            }
            continue;
        };
        let closer = match &best {
            None => true,
            Some((_, prev)) => prev.distance().map_or(true, |p| distance < p),
        };
        if closer {
            best = Some((identity, result));
        }
    }

    match best {
        Some((identity, result)) => GalleryMatch {
            identity: Some(identity),
            result,
        },
        None => GalleryMatch {
            identity: None,
            result: MatchResult::Invalid(last_invalid),
        },
    }
}

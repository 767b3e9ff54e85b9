use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (128-d for dlib-style encoders, 512-d for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance over the shared prefix of both vectors.
    ///
    /// Callers that care about dimension agreement must check it first;
    /// the matcher does.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Ordered 2D landmark points for one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    pub points: Vec<[f32; 2]>,
}

impl LandmarkSet {
    pub fn new(points: Vec<[f32; 2]>) -> Self {
        Self { points }
    }

    pub fn get(&self, index: usize) -> Option<[f32; 2]> {
        self.points.get(index).copied()
    }
}

impl From<[(f32, f32); 5]> for LandmarkSet {
    fn from(points: [(f32, f32); 5]) -> Self {
        Self {
            points: points.iter().map(|&(x, y)| [x, y]).collect(),
        }
    }
}

/// Which representation a detector produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Embedding,
    Landmarks,
}

/// Numeric representation of one detected face.
///
/// Serialized untagged: an embedding is a flat number array, a landmark
/// set is an array of `[x, y]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FaceDescriptor {
    Embedding(Embedding),
    Landmarks(LandmarkSet),
}

impl FaceDescriptor {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            FaceDescriptor::Embedding(_) => DescriptorKind::Embedding,
            FaceDescriptor::Landmarks(_) => DescriptorKind::Landmarks,
        }
    }

    /// Number of components (embedding dimensions or landmark points).
    pub fn len(&self) -> usize {
        match self {
            FaceDescriptor::Embedding(e) => e.values.len(),
            FaceDescriptor::Landmarks(l) => l.points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Embedding> for FaceDescriptor {
    fn from(e: Embedding) -> Self {
        FaceDescriptor::Embedding(e)
    }
}

impl From<LandmarkSet> for FaceDescriptor {
    fn from(l: LandmarkSet) -> Self {
        FaceDescriptor::Landmarks(l)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("enrolled descriptor for {0:?} is empty")]
    EmptyDescriptor(String),
}

/// A face designated as authorized. Read-only for the whole monitoring session.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrolledIdentity {
    /// Database row id; `None` for the single-file store.
    pub id: Option<i64>,
    pub name: String,
    pub descriptor: FaceDescriptor,
}

impl EnrolledIdentity {
    pub fn new(
        id: Option<i64>,
        name: impl Into<String>,
        descriptor: FaceDescriptor,
    ) -> Result<Self, IdentityError> {
        let name = name.into();
        if descriptor.is_empty() {
            return Err(IdentityError::EmptyDescriptor(name));
        }
        Ok(Self { id, name, descriptor })
    }
}

/// A face found in a frame: where it is and what it looks like.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub descriptor: FaceDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert_relative_eq!(a.euclidean_distance(&b), 5.0);
    }

    #[test]
    fn test_descriptor_json_embedding_is_flat_array() {
        let d = FaceDescriptor::from(Embedding::new(vec![0.5, -0.25]));
        assert_eq!(serde_json::to_string(&d).unwrap(), "[0.5,-0.25]");
        let back: FaceDescriptor = serde_json::from_str("[0.5,-0.25]").unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_descriptor_json_landmarks_are_pairs() {
        let parsed: FaceDescriptor = serde_json::from_str("[[1.0,2.0],[3.0,4.0]]").unwrap();
        assert_eq!(parsed.kind(), DescriptorKind::Landmarks);
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_descriptor_json_rejects_garbage() {
        assert!(serde_json::from_str::<FaceDescriptor>("{\"a\":1}").is_err());
        assert!(serde_json::from_str::<FaceDescriptor>("[[1.0]]").is_err());
    }

    #[test]
    fn test_identity_rejects_empty_descriptor() {
        let err = EnrolledIdentity::new(None, "alice", Embedding::new(vec![]).into()).unwrap_err();
        assert_eq!(err, IdentityError::EmptyDescriptor("alice".into()));
    }

    #[test]
    fn test_landmarks_from_five_point() {
        let set = LandmarkSet::from([(1.0, 2.0), (3.0, 4.0), (5.0, 6.0), (7.0, 8.0), (9.0, 10.0)]);
        assert_eq!(set.get(2), Some([5.0, 6.0]));
        assert_eq!(set.get(5), None);
    }
}

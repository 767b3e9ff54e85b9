use roomguard_core::{DescriptorKind, LandmarkLayout, MatchStrategy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Where enrolled identities are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Json,
    Sqlite,
}

/// Runtime configuration: defaults, then the TOML file named by
/// `ROOMGUARD_CONFIG`, then `ROOMGUARD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path. Unset means a room's own camera, else
    /// [`DEFAULT_CAMERA_DEVICE`].
    pub camera_device: Option<String>,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Frames discarded after opening the camera (exposure settling).
    pub warmup_frames: usize,
    /// Directory holding det_10g.onnx and w600k_r50.onnx.
    pub model_dir: PathBuf,
    pub storage: StorageBackend,
    pub json_path: PathBuf,
    pub db_path: PathBuf,
    pub strategy: MatchStrategy,
    /// Maximum embedding distance still accepted (default 0.6).
    pub embedding_tolerance: f32,
    /// Maximum average landmark distance still accepted (default 0.7).
    pub landmark_threshold: f32,
    pub landmark_layout: LandmarkLayout,
    /// If set, each annotated frame is written here.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            camera_device: None,
            camera_width: 640,
            camera_height: 480,
            warmup_frames: 4,
            model_dir: data_dir.join("models"),
            storage: StorageBackend::Json,
            json_path: data_dir.join("authorized_face.json"),
            db_path: data_dir.join("room_security.db"),
            strategy: MatchStrategy::Embedding,
            embedding_tolerance: roomguard_core::DEFAULT_EMBEDDING_TOLERANCE,
            landmark_threshold: roomguard_core::DEFAULT_LANDMARK_THRESHOLD,
            // The local detector emits five-point landmarks.
            landmark_layout: LandmarkLayout::FivePoint,
            snapshot_path: None,
        }
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("roomguard")
}

impl Config {
    /// Load from the environment of the current process.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("ROOMGUARD_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Override fields from `ROOMGUARD_*` variables. Unparseable values are
    /// logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROOMGUARD_CAMERA_DEVICE") {
            self.camera_device = (!v.is_empty()).then_some(v);
        }
        override_parsed(&lookup, "ROOMGUARD_CAMERA_WIDTH", &mut self.camera_width);
        override_parsed(&lookup, "ROOMGUARD_CAMERA_HEIGHT", &mut self.camera_height);
        override_parsed(&lookup, "ROOMGUARD_WARMUP_FRAMES", &mut self.warmup_frames);
        if let Some(v) = lookup("ROOMGUARD_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        override_enum(&lookup, "ROOMGUARD_STORAGE", &mut self.storage);
        if let Some(v) = lookup("ROOMGUARD_JSON_PATH") {
            self.json_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROOMGUARD_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        override_enum(&lookup, "ROOMGUARD_STRATEGY", &mut self.strategy);
        override_parsed(&lookup, "ROOMGUARD_EMBEDDING_TOLERANCE", &mut self.embedding_tolerance);
        override_parsed(&lookup, "ROOMGUARD_LANDMARK_THRESHOLD", &mut self.landmark_threshold);
        override_enum(&lookup, "ROOMGUARD_LANDMARK_LAYOUT", &mut self.landmark_layout);
        if let Some(v) = lookup("ROOMGUARD_SNAPSHOT_PATH") {
            self.snapshot_path = (!v.is_empty()).then(|| PathBuf::from(v));
        }
    }

    /// Device to capture from. An explicitly configured device always wins;
    /// otherwise a room's camera index maps to `/dev/video<N>`.
    pub fn capture_device(&self, room_camera: Option<i64>) -> String {
        match (&self.camera_device, room_camera) {
            (Some(device), _) => device.clone(),
            (None, Some(index)) => format!("/dev/video{index}"),
            (None, None) => DEFAULT_CAMERA_DEVICE.to_string(),
        }
    }

    /// Tolerance for the configured strategy.
    pub fn tolerance(&self) -> f32 {
        match self.strategy {
            MatchStrategy::Embedding => self.embedding_tolerance,
            MatchStrategy::Landmark => self.landmark_threshold,
        }
    }

    /// Descriptor the analyzer must produce for the configured strategy.
    pub fn descriptor_kind(&self) -> DescriptorKind {
        match self.strategy {
            MatchStrategy::Embedding => DescriptorKind::Embedding,
            MatchStrategy::Landmark => DescriptorKind::Landmarks,
        }
    }
}

fn override_parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(v) => *field = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable setting"),
        }
    }
}

fn override_enum<T: DeserializeOwned>(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut T) {
    if let Some(raw) = lookup(key) {
        match serde_json::from_value(serde_json::Value::String(raw.trim().to_ascii_lowercase())) {
            Ok(v) => *field = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unknown setting value"),
        }
    }
}

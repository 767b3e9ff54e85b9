//! Single authorized face in a JSON file.
//!
//! The file holds the bare descriptor: a flat number array for an
//! embedding, or an array of `[x, y]` pairs for landmarks.

use crate::{decode_descriptor, IdentityStore, StoreError};
use roomguard_core::{EnrolledIdentity, FaceDescriptor};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Name given to the identity loaded from a JSON file.
pub const AUTHORIZED_NAME: &str = "authorized";

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> Result<EnrolledIdentity, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotEnrolled(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let descriptor = decode_descriptor(&self.path.display().to_string(), &text)?;
        Ok(EnrolledIdentity::new(None, AUTHORIZED_NAME, descriptor)?)
    }
}

impl IdentityStore for JsonFileStore {
    fn load_gallery(&self, room: Option<i64>) -> Result<Vec<EnrolledIdentity>, StoreError> {
        if room.is_some() {
            return Err(StoreError::Unsupported("room permissions"));
        }
        let identity = self.load()?;
        tracing::info!(
            path = %self.path.display(),
            kind = ?identity.descriptor.kind(),
            components = identity.descriptor.len(),
            "loaded authorized face"
        );
        Ok(vec![identity])
    }

    /// Overwrites any previous enrollment. The file holds one face, so the
    /// identity is always named [`AUTHORIZED_NAME`] whatever `name` says.
    fn enroll(
        &mut self,
        name: &str,
        descriptor: &FaceDescriptor,
        room: Option<i64>,
    ) -> Result<EnrolledIdentity, StoreError> {
        if room.is_some() {
            return Err(StoreError::Unsupported("room permissions"));
        }
        if name != AUTHORIZED_NAME {
            tracing::warn!(name, stored_as = AUTHORIZED_NAME, "JSON store keeps no names");
        }
        let identity = EnrolledIdentity::new(None, AUTHORIZED_NAME, descriptor.clone())?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        let written = std::fs::write(&tmp, serde_json::to_vec(descriptor)?)
            .and_then(|()| std::fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        let written = std::fs::metadata(&self.path)?.len();
        if written == 0 {
            return Err(StoreError::Malformed {
                origin: self.path.display().to_string(),
                reason: "file is empty after save".into(),
            });
        }

        tracing::info!(path = %self.path.display(), bytes = written, "authorized face saved");
        Ok(identity)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

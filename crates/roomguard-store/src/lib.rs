//! roomguard-store — persistence for enrolled identities.
//!
//! Two backends: a single JSON file holding one descriptor, and a SQLite
//! database with users, rooms, and per-room permissions.

pub mod json_store;
pub mod sqlite_store;

use roomguard_core::{EnrolledIdentity, FaceDescriptor, IdentityError};
use std::path::PathBuf;
use thiserror::Error;

pub use json_store::JsonFileStore;
pub use sqlite_store::{Room, SqliteStore, UserRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no enrolled face at {0}; run `roomguard enroll` first")]
    NotEnrolled(PathBuf),
    #[error("malformed descriptor in {origin}: {reason}")]
    Malformed { origin: String, reason: String },
    #[error("{0}")]
    Identity(#[from] IdentityError),
    #[error("user {0} does not exist")]
    UnknownUser(i64),
    #[error("room {0} does not exist")]
    UnknownRoom(i64),
    #[error("{0} is not supported by the JSON file store; use the sqlite backend")]
    Unsupported(&'static str),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where enrolled identities live.
pub trait IdentityStore {
    /// Identities permitted to be seen. `room` restricts the gallery to
    /// users granted that room, where the backend supports rooms.
    fn load_gallery(&self, room: Option<i64>) -> Result<Vec<EnrolledIdentity>, StoreError>;

    /// Persist `descriptor` as an authorized identity.
    fn enroll(
        &mut self,
        name: &str,
        descriptor: &FaceDescriptor,
        room: Option<i64>,
    ) -> Result<EnrolledIdentity, StoreError>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// Parse the JSON text form of a descriptor.
pub(crate) fn decode_descriptor(origin: &str, text: &str) -> Result<FaceDescriptor, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Malformed {
        origin: origin.to_string(),
        reason: e.to_string(),
    })
}

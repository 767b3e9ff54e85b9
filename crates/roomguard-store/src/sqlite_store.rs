//! Users, rooms, and room permissions in SQLite.
//!
//! `users.face_encoding` holds the descriptor as JSON text, the same form
//! the JSON file store writes.

use crate::{decode_descriptor, IdentityStore, StoreError};
use roomguard_core::{DescriptorKind, EnrolledIdentity, FaceDescriptor};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY,
    name          TEXT    NOT NULL,
    face_encoding TEXT    NOT NULL,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS rooms (
    id        INTEGER PRIMARY KEY,
    name      TEXT    NOT NULL,
    camera_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_room_permissions (
    id      INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    room_id INTEGER NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    UNIQUE (user_id, room_id)
);
";

/// A user row, without the raw encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub created_at: String,
    /// `None` when the stored encoding cannot be decoded.
    pub kind: Option<DescriptorKind>,
    pub components: usize,
}

/// A monitored room and the camera index watching it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub camera_id: i64,
}

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database and its schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "sqlite store opened");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, face_encoding, is_active, created_at FROM users ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut users = Vec::new();
        for row in rows {
            let (id, name, encoding, is_active, created_at) = row?;
            let decoded = serde_json::from_str::<FaceDescriptor>(&encoding).ok();
            users.push(UserRecord {
                id,
                name,
                is_active,
                created_at,
                kind: decoded.as_ref().map(FaceDescriptor::kind),
                components: decoded.as_ref().map_or(0, FaceDescriptor::len),
            });
        }
        Ok(users)
    }

    /// Enable or disable a user without deleting the enrollment.
    pub fn set_active(&self, user_id: i64, active: bool) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute("UPDATE users SET is_active = ?1 WHERE id = ?2", params![active, user_id])?;
        if changed == 0 {
            return Err(StoreError::UnknownUser(user_id));
        }
        tracing::info!(user_id, active, "user activation changed");
        Ok(())
    }

    /// Delete a user and their permissions.
    pub fn remove_user(&self, user_id: i64) -> Result<(), StoreError> {
        let changed = self.conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        if changed == 0 {
            return Err(StoreError::UnknownUser(user_id));
        }
        tracing::info!(user_id, "user removed");
        Ok(())
    }

    pub fn add_room(&self, name: &str, camera_id: i64) -> Result<Room, StoreError> {
        self.conn.execute(
            "INSERT INTO rooms (name, camera_id) VALUES (?1, ?2)",
            params![name, camera_id],
        )?;
        let room = Room {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            camera_id,
        };
        tracing::info!(room_id = room.id, name, camera_id, "room added");
        Ok(room)
    }

    pub fn room(&self, room_id: i64) -> Result<Option<Room>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, camera_id FROM rooms WHERE id = ?1",
                params![room_id],
                |row| {
                    Ok(Room {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        camera_id: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id, name, camera_id FROM rooms ORDER BY id")?;
        let rooms = stmt
            .query_map([], |row| {
                Ok(Room {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    camera_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rooms)
    }

    /// Permit a user in a room. Granting twice is a no-op.
    pub fn grant(&self, user_id: i64, room_id: i64) -> Result<(), StoreError> {
        grant_on(&self.conn, user_id, room_id)
    }
}

fn grant_on(conn: &Connection, user_id: i64, room_id: i64) -> Result<(), StoreError> {
    let exists = |sql: &str, id: i64| -> Result<bool, rusqlite::Error> {
        conn.query_row(sql, params![id], |_| Ok(())).optional().map(|r| r.is_some())
    };
    if !exists("SELECT 1 FROM users WHERE id = ?1", user_id)? {
        return Err(StoreError::UnknownUser(user_id));
    }
    if !exists("SELECT 1 FROM rooms WHERE id = ?1", room_id)? {
        return Err(StoreError::UnknownRoom(room_id));
    }
    conn.execute(
        "INSERT OR IGNORE INTO user_room_permissions (user_id, room_id) VALUES (?1, ?2)",
        params![user_id, room_id],
    )?;
    tracing::info!(user_id, room_id, "room permission granted");
    Ok(())
}

impl IdentityStore for SqliteStore {
    fn load_gallery(&self, room: Option<i64>) -> Result<Vec<EnrolledIdentity>, StoreError> {
        let rows: Vec<(i64, String, String)> = match room {
            None => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT id, name, face_encoding FROM users WHERE is_active = 1 ORDER BY id")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<Result<_, _>>()?;
                rows
            }
            Some(room_id) => {
                if self.room(room_id)?.is_none() {
                    return Err(StoreError::UnknownRoom(room_id));
                }
                let mut stmt = self.conn.prepare(
                    "SELECT u.id, u.name, u.face_encoding
                       FROM users u
                       JOIN user_room_permissions p ON p.user_id = u.id
                      WHERE u.is_active = 1 AND p.room_id = ?1
                      ORDER BY u.id",
                )?;
                let rows = stmt
                    .query_map(params![room_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<Result<_, _>>()?;
                rows
            }
        };

        let mut gallery = Vec::with_capacity(rows.len());
        for (id, name, encoding) in rows {
            let decoded = decode_descriptor(&format!("users.id={id}"), &encoding)
                .and_then(|d| EnrolledIdentity::new(Some(id), name, d).map_err(StoreError::from));
            match decoded {
                Ok(identity) => gallery.push(identity),
                Err(e) => tracing::warn!(user_id = id, error = %e, "skipping user with unusable encoding"),
            }
        }

        tracing::info!(path = %self.path.display(), room, identities = gallery.len(), "gallery loaded");
        Ok(gallery)
    }

    fn enroll(
        &mut self,
        name: &str,
        descriptor: &FaceDescriptor,
        room: Option<i64>,
    ) -> Result<EnrolledIdentity, StoreError> {
        let encoding = serde_json::to_string(descriptor)?;
        let created_at = chrono::Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO users (name, face_encoding, is_active, created_at) VALUES (?1, ?2, 1, ?3)",
            params![name, encoding, created_at],
        )?;
        let id = tx.last_insert_rowid();
        let identity = EnrolledIdentity::new(Some(id), name, descriptor.clone())?;
        if let Some(room_id) = room {
            grant_on(&tx, id, room_id)?;
        }
        tx.commit()?;

        tracing::info!(user_id = id, name, room, "user enrolled");
        Ok(identity)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

//! Track catalog: the fixed presets plus the user's persisted uploads.

use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::{DrumProError, Result};

pub mod presets;

pub use presets::{preset, Preset, PRESETS};

/// Auto-incrementing key of a stored track.
pub type TrackId = i64;

/// Where a track's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackOrigin {
    /// Index into [`PRESETS`].
    Preset(usize),
    Stored(TrackId),
}

impl std::fmt::Display for TrackOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackOrigin::Preset(index) => write!(f, "preset:{index}"),
            TrackOrigin::Stored(id) => write!(f, "track:{id}"),
        }
    }
}

impl std::str::FromStr for TrackOrigin {
    type Err = DrumProError;

    fn from_str(value: &str) -> Result<Self> {
        let parse_err = || {
            DrumProError::validation(format!(
                "`{value}` is not a track reference (expected preset:N or track:ID)"
            ))
        };
        let (kind, key) = value.split_once(':').ok_or_else(parse_err)?;
        match kind {
            "preset" => key.parse().map(TrackOrigin::Preset).map_err(|_| parse_err()),
            "track" => key.parse().map(TrackOrigin::Stored).map_err(|_| parse_err()),
            _ => Err(parse_err()),
        }
    }
}

/// A playable track as handed to the engine. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,
    pub native_tempo_bpm: u32,
    pub audio_bytes: Vec<u8>,
    pub origin: TrackOrigin,
}

/// Library listing entry. The audio itself is fetched on selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTrack {
    pub id: TrackId,
    pub name: String,
    pub bpm: u32,
    /// Seconds since the Unix epoch.
    pub created_at: i64,
}

/// Key-value persistence for uploaded tracks.
pub trait TrackStore {
    fn create(&mut self, name: &str, bpm: u32, bytes: &[u8]) -> Result<TrackId>;
    fn list_all(&self) -> Result<Vec<StoredTrack>>;
    /// Returns the listing entry and verbatim audio bytes of a stored track.
    fn load(&self, id: TrackId) -> Result<(StoredTrack, Vec<u8>)>;
    /// Deleting an unknown id is not an error.
    fn delete_by_id(&mut self, id: TrackId) -> Result<()>;
    fn clear_all(&mut self) -> Result<()>;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    bpm INTEGER NOT NULL,
    audio BLOB NOT NULL,
    created_at INTEGER NOT NULL
)";

/// SQLite-backed [`TrackStore`]. Ids are never reused, even after `clear_all`.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl TrackStore for SqliteStore {
    fn create(&mut self, name: &str, bpm: u32, bytes: &[u8]) -> Result<TrackId> {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or_default();
        self.conn.execute(
            "INSERT INTO tracks (name, bpm, audio, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, bpm, bytes, created_at],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(id, name, bpm, bytes = bytes.len(), "stored track");
        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<StoredTrack>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, bpm, created_at FROM tracks ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredTrack {
                id: row.get(0)?,
                name: row.get(1)?,
                bpm: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn load(&self, id: TrackId) -> Result<(StoredTrack, Vec<u8>)> {
        self.conn
            .query_row(
                "SELECT id, name, bpm, created_at, audio FROM tracks WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        StoredTrack {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            bpm: row.get(2)?,
                            created_at: row.get(3)?,
                        },
                        row.get(4)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| DrumProError::AssetNotFound(format!("stored track {id}")))
    }

    fn delete_by_id(&mut self, id: TrackId) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM tracks WHERE id = ?1", params![id])?;
        tracing::info!(id, removed, "deleted track");
        Ok(())
    }

    fn clear_all(&mut self) -> Result<()> {
        let removed = self.conn.execute("DELETE FROM tracks", [])?;
        tracing::info!(removed, "cleared library");
        Ok(())
    }
}

/// Checks an upload form. The BPM arrives as text and must be a positive integer.
pub fn validate_upload(name: &str, bpm: &str, bytes: &[u8]) -> Result<(String, u32)> {
    if bytes.is_empty() {
        return Err(DrumProError::validation("choose an audio file to upload"));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(DrumProError::validation("give the track a name"));
    }
    let bpm = bpm
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|bpm| *bpm > 0)
        .ok_or_else(|| DrumProError::validation(format!("`{}` is not a valid BPM", bpm.trim())))?;
    Ok((name.to_string(), bpm))
}

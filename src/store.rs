use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use thiserror::Error;
use tracing::{debug, warn};

use crate::app_dirs::AppDirs;
use crate::fix::Coordinate;
use crate::placemark::Placemark;
use crate::tag::{LocationDraft, TaggedLocation};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored placemark is unreadable: {0}")]
    Placemark(#[from] serde_json::Error),
    #[error("no tagged location with id {0}")]
    NotFound(i64),
    #[error("no state directory available")]
    NoStateDir,
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Tagged(i64),
    Updated(i64),
}

impl SaveOutcome {
    pub fn id(&self) -> i64 {
        match self {
            SaveOutcome::Tagged(id) | SaveOutcome::Updated(id) => *id,
        }
    }

    /// Confirmation shown after saving
    pub fn label(&self) -> &'static str {
        match self {
            SaveOutcome::Tagged(_) => "Tagged",
            SaveOutcome::Updated(_) => "Updated",
        }
    }
}

/// Tagged locations in SQLite, their photos as files next to it
#[derive(Debug)]
pub struct TagStore {
    conn: Connection,
    photos_dir: PathBuf,
}

const SELECT_COLUMNS: &str =
    "SELECT id, description, category, latitude, longitude, date, placemark, photo_id FROM locations";

impl TagStore {
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(db_path: P, photos_dir: Q) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(db_path)?, photos_dir)
    }

    /// Opens the store under the application state directory
    pub fn open_default() -> Result<Self> {
        let db_path = AppDirs::db_path().ok_or(StoreError::NoStateDir)?;
        let photos_dir = AppDirs::photos_dir().ok_or(StoreError::NoStateDir)?;
        Self::open(db_path, photos_dir)
    }

    pub fn in_memory<Q: AsRef<Path>>(photos_dir: Q) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, photos_dir)
    }

    fn with_connection<Q: AsRef<Path>>(conn: Connection, photos_dir: Q) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                date TEXT NOT NULL,
                placemark TEXT,
                photo_id INTEGER
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_locations_date ON locations(date)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS counters (name TEXT PRIMARY KEY, value INTEGER NOT NULL)",
            [],
        )?;

        normalize_dates(&conn)?;

        Ok(TagStore {
            conn,
            photos_dir: photos_dir.as_ref().to_path_buf(),
        })
    }

    /// Inserts a new location or updates the one the draft was made from.
    /// A photo in the draft is written before the row is committed.
    pub fn save(&mut self, draft: &LocationDraft) -> Result<SaveOutcome> {
        let tx = self.conn.transaction()?;

        let existing_photo = match draft.id {
            Some(id) => {
                let row: Option<Option<i64>> = tx
                    .query_row(
                        "SELECT photo_id FROM locations WHERE id = ?1",
                        [id],
                        |row| row.get(0),
                    )
                    .optional()?;
                row.ok_or(StoreError::NotFound(id))?
            }
            None => None,
        };

        let photo_id = match (&draft.photo, existing_photo) {
            (Some(_), Some(id)) => Some(id),
            (Some(_), None) => Some(next_photo_id(&tx)?),
            (None, existing) => existing,
        };

        let placemark = draft
            .placemark
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let outcome = match draft.id {
            Some(id) => {
                tx.execute(
                    r#"
                    UPDATE locations
                    SET description = ?1, category = ?2, latitude = ?3, longitude = ?4,
                        date = ?5, placemark = ?6, photo_id = ?7
                    WHERE id = ?8
                    "#,
                    params![
                        draft.description,
                        draft.category,
                        draft.coordinate.latitude,
                        draft.coordinate.longitude,
                        stored_date(&draft.date),
                        placemark,
                        photo_id,
                        id,
                    ],
                )?;
                SaveOutcome::Updated(id)
            }
            None => {
                tx.execute(
                    r#"
                    INSERT INTO locations
                    (description, category, latitude, longitude, date, placemark, photo_id)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        draft.description,
                        draft.category,
                        draft.coordinate.latitude,
                        draft.coordinate.longitude,
                        stored_date(&draft.date),
                        placemark,
                        photo_id,
                    ],
                )?;
                SaveOutcome::Tagged(tx.last_insert_rowid())
            }
        };

        if let (Some(bytes), Some(id)) = (&draft.photo, photo_id) {
            write_photo(&self.photos_dir, id, bytes)?;
        }

        tx.commit()?;
        debug!(id = outcome.id(), outcome = outcome.label(), "location saved");
        Ok(outcome)
    }

    /// Newest first
    pub fn all(&self) -> Result<Vec<TaggedLocation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY date DESC, id DESC"))?;
        let rows = stmt.query_map([], read_row)?;

        let mut locations = Vec::new();
        for row in rows {
            locations.push(row??);
        }
        Ok(locations)
    }

    pub fn get(&self, id: i64) -> Result<TaggedLocation> {
        let found = self
            .conn
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], read_row)
            .optional()?;
        match found {
            Some(location) => location,
            None => Err(StoreError::NotFound(id)),
        }
    }

    /// Deletes the row and its photo file
    pub fn delete(&mut self, id: i64) -> Result<()> {
        let location = self.get(id)?;
        self.conn.execute("DELETE FROM locations WHERE id = ?1", [id])?;

        if let Some(path) = self.photo_path_for(&location) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove photo"),
            }
        }
        Ok(())
    }

    pub fn photo_path(&self, photo_id: i64) -> PathBuf {
        photo_file(&self.photos_dir, photo_id)
    }

    pub fn photo_path_for(&self, location: &TaggedLocation) -> Option<PathBuf> {
        location.photo_id.map(|id| self.photo_path(id))
    }
}

fn photo_file(photos_dir: &Path, photo_id: i64) -> PathBuf {
    photos_dir.join(format!("Photo-{photo_id}.jpg"))
}

/// Writes to a temporary file first so a photo is never half written
fn write_photo(photos_dir: &Path, photo_id: i64, bytes: &[u8]) -> Result<()> {
    fs::create_dir_all(photos_dir)?;
    let path = photo_file(photos_dir, photo_id);
    let tmp = path.with_extension("jpg.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

/// Hands out 0, 1, 2, ... across the life of the database
fn next_photo_id(tx: &Transaction<'_>) -> Result<i64> {
    let current: i64 = tx
        .query_row(
            "SELECT value FROM counters WHERE name = 'photo_id'",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    tx.execute(
        "INSERT INTO counters (name, value) VALUES ('photo_id', ?1)
         ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        [current + 1],
    )?;
    Ok(current)
}

/// Fixed-width UTC text, so ordering by the column orders by instant
fn stored_date(date: &DateTime<Local>) -> String {
    date.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Rewrites dates stored with a local offset into the UTC form
fn normalize_dates(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT id, date FROM locations WHERE date NOT LIKE '%Z'")?;
    let legacy = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (id, text) in legacy {
        match DateTime::parse_from_rfc3339(&text) {
            Ok(date) => {
                conn.execute(
                    "UPDATE locations SET date = ?1 WHERE id = ?2",
                    params![stored_date(&date.with_timezone(&Local)), id],
                )?;
            }
            Err(e) => warn!(id, date = %text, error = %e, "leaving unparsable date"),
        }
    }
    Ok(())
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<Result<TaggedLocation>> {
    let date_str: String = row.get(5)?;
    let date = DateTime::parse_from_rfc3339(&date_str)
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(5, "date".to_string(), rusqlite::types::Type::Text)
        })?
        .with_timezone(&Local);

    let placemark_json: Option<String> = row.get(6)?;
    let placemark = match placemark_json {
        Some(json) => match serde_json::from_str::<Placemark>(&json) {
            Ok(p) => Some(p),
            Err(e) => return Ok(Err(e.into())),
        },
        None => None,
    };

    Ok(Ok(TaggedLocation {
        id: row.get(0)?,
        description: row.get(1)?,
        category: row.get(2)?,
        coordinate: Coordinate::new(row.get(3)?, row.get(4)?),
        placemark,
        date,
        photo_id: row.get(7)?,
    }))
}

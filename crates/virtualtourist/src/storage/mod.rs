//! Storage layer for virtualtourist.
//!
//! This module provides `SQLite`-based persistent storage for pins and their
//! photos. Deleting a photo record also removes its image file, and deleting
//! a pin removes all of its photos. Every change is broadcast as a
//! [`StoreChange`] so a listing can refresh incrementally.

pub mod migrations;
pub mod schema;

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{Coordinate, NewPhoto, Photo, Pin};

/// How many unread changes a slow subscriber may lag behind.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

const PIN_COLUMNS: &str = "id, latitude, longitude, page_count, created_at";
const PHOTO_COLUMNS: &str = "id, pin_id, remote_url, local_path, title, downloaded, created_at";

/// An incremental change to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StoreChange {
    /// A pin was created.
    PinInserted {
        /// The new pin.
        pin_id: i64,
    },
    /// A pin's page count changed.
    PinUpdated {
        /// The updated pin.
        pin_id: i64,
    },
    /// A pin and all of its photos were removed.
    PinDeleted {
        /// The removed pin.
        pin_id: i64,
    },
    /// A photo record was created.
    PhotoInserted {
        /// The owning pin.
        pin_id: i64,
        /// The new photo.
        photo_id: i64,
    },
    /// A photo finished downloading.
    PhotoUpdated {
        /// The owning pin.
        pin_id: i64,
        /// The updated photo.
        photo_id: i64,
    },
    /// A photo record and its file were removed.
    PhotoDeleted {
        /// The owning pin.
        pin_id: i64,
        /// The removed photo.
        photo_id: i64,
    },
}

/// Storage engine for pins and photos.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Pin creation, listing and cascading deletion
/// - Photo creation, download tracking and file cleanup
/// - Change notifications for live listings
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
    /// Change notifications.
    changes: broadcast::Sender<StoreChange>,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let storage = Self::with_connection(path, conn)?;
        info!("Database opened successfully at {}", storage.path.display());
        Ok(storage)
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        Self::with_connection(PathBuf::from(":memory:"), conn)
    }

    fn with_connection(path: PathBuf, conn: Connection) -> Result<Self> {
        // Cascading deletes depend on this; SQLite leaves it off per connection
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            conn,
            changes,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscribe to changes made through this storage instance.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StoreChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }

    // === Pins ===

    /// Persist a new pin at `coordinate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinate is invalid or the database operation fails.
    pub fn insert_pin(&self, coordinate: Coordinate) -> Result<Pin> {
        let coordinate = coordinate.validate()?;
        let created_at = Utc::now();

        self.conn.execute(
            "INSERT INTO pins (latitude, longitude, page_count, created_at) VALUES (?1, ?2, 0, ?3)",
            params![
                coordinate.latitude,
                coordinate.longitude,
                created_at.to_rfc3339()
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted pin {} at {}", id, coordinate);
        self.notify(StoreChange::PinInserted { pin_id: id });

        Ok(Pin {
            id,
            coordinate,
            page_count: 0,
            created_at,
        })
    }

    /// Get a pin by its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_pin(&self, id: i64) -> Result<Option<Pin>> {
        let pin = self
            .conn
            .query_row(
                &format!("SELECT {PIN_COLUMNS} FROM pins WHERE id = ?1"),
                [id],
                Self::row_to_pin,
            )
            .optional()?;
        Ok(pin)
    }

    /// Get a pin by its ID, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PinNotFound`] if there is no such pin.
    pub fn require_pin(&self, id: i64) -> Result<Pin> {
        self.get_pin(id)?.ok_or(Error::PinNotFound(id))
    }

    /// All pins, ordered by latitude.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_pins(&self) -> Result<Vec<Pin>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PIN_COLUMNS} FROM pins ORDER BY latitude ASC, id ASC"
        ))?;

        let pins = stmt
            .query_map([], Self::row_to_pin)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(pins)
    }

    /// Record how many result pages the search API reports for a pin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PinNotFound`] if there is no such pin.
    pub fn set_page_count(&self, pin_id: i64, page_count: u32) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE pins SET page_count = ?1 WHERE id = ?2",
            params![page_count, pin_id],
        )?;
        if affected == 0 {
            return Err(Error::PinNotFound(pin_id));
        }

        self.notify(StoreChange::PinUpdated { pin_id });
        Ok(())
    }

    /// Delete a pin, its photos, and their image files.
    ///
    /// Returns `true` if a pin was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_pin(&self, id: i64) -> Result<bool> {
        let photos = self.photos_for_pin(id)?;

        let affected = self.conn.execute("DELETE FROM pins WHERE id = ?1", [id])?;
        if affected == 0 {
            return Ok(false);
        }

        for photo in &photos {
            remove_image_file(&photo.local_path);
            self.notify(StoreChange::PhotoDeleted {
                pin_id: id,
                photo_id: photo.id,
            });
        }
        if let Some(dir) = photos.first().and_then(|p| p.local_path.parent()) {
            // Only succeeds once the pin's directory is empty
            let _ = std::fs::remove_dir(dir);
        }

        info!("Deleted pin {} and {} photos", id, photos.len());
        self.notify(StoreChange::PinDeleted { pin_id: id });
        Ok(true)
    }

    // === Photos ===

    /// Persist a new, not yet downloaded, photo.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PinNotFound`] if the owning pin does not exist.
    pub fn insert_photo(&self, photo: &NewPhoto) -> Result<Photo> {
        let created_at = Utc::now();
        let local_path = photo.local_path.to_string_lossy();

        let result = self.conn.execute(
            r"
            INSERT INTO photos (pin_id, remote_url, local_path, title, downloaded, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            ",
            params![
                photo.pin_id,
                photo.remote_url,
                local_path,
                photo.title,
                created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(Error::PinNotFound(photo.pin_id));
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        debug!("Inserted photo {} for pin {}", id, photo.pin_id);
        self.notify(StoreChange::PhotoInserted {
            pin_id: photo.pin_id,
            photo_id: id,
        });

        Ok(Photo {
            id,
            pin_id: photo.pin_id,
            remote_url: photo.remote_url.clone(),
            local_path: photo.local_path.clone(),
            title: photo.title.clone(),
            downloaded: false,
            created_at,
        })
    }

    /// Get a photo by its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_photo(&self, id: i64) -> Result<Option<Photo>> {
        let photo = self
            .conn
            .query_row(
                &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?1"),
                [id],
                Self::row_to_photo,
            )
            .optional()?;
        Ok(photo)
    }

    /// All photos of a pin, ordered by local path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn photos_for_pin(&self, pin_id: i64) -> Result<Vec<Photo>> {
        self.query_photos(
            &format!(
                "SELECT {PHOTO_COLUMNS} FROM photos WHERE pin_id = ?1 ORDER BY local_path ASC"
            ),
            pin_id,
        )
    }

    /// Photos of a pin whose image has not been written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn pending_photos(&self, pin_id: i64) -> Result<Vec<Photo>> {
        self.query_photos(
            &format!(
                "SELECT {PHOTO_COLUMNS} FROM photos WHERE pin_id = ?1 AND downloaded = 0 ORDER BY local_path ASC"
            ),
            pin_id,
        )
    }

    fn query_photos(&self, sql: &str, pin_id: i64) -> Result<Vec<Photo>> {
        let mut stmt = self.conn.prepare(sql)?;
        let photos = stmt
            .query_map([pin_id], Self::row_to_photo)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    /// Flag a photo as downloaded.
    ///
    /// Returns `true` if the photo exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn mark_downloaded(&self, photo_id: i64) -> Result<bool> {
        let pin_id: Option<i64> = self
            .conn
            .query_row(
                "UPDATE photos SET downloaded = 1 WHERE id = ?1 RETURNING pin_id",
                [photo_id],
                |row| row.get(0),
            )
            .optional()?;

        match pin_id {
            Some(pin_id) => {
                self.notify(StoreChange::PhotoUpdated { pin_id, photo_id });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete a photo and its image file.
    ///
    /// Returns `true` if a photo was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_photo(&self, id: i64) -> Result<bool> {
        let Some(photo) = self.get_photo(id)? else {
            return Ok(false);
        };

        let affected = self.conn.execute("DELETE FROM photos WHERE id = ?1", [id])?;
        if affected == 0 {
            return Ok(false);
        }

        remove_image_file(&photo.local_path);
        self.notify(StoreChange::PhotoDeleted {
            pin_id: photo.pin_id,
            photo_id: id,
        });
        Ok(true)
    }

    /// Delete every photo of a pin along with the image files.
    ///
    /// Returns the number of photos deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_photos_for_pin(&self, pin_id: i64) -> Result<usize> {
        let photos = self.photos_for_pin(pin_id)?;
        let affected = self
            .conn
            .execute("DELETE FROM photos WHERE pin_id = ?1", [pin_id])?;

        for photo in &photos {
            remove_image_file(&photo.local_path);
            self.notify(StoreChange::PhotoDeleted {
                pin_id,
                photo_id: photo.id,
            });
        }

        if affected > 0 {
            info!("Deleted {} photos of pin {}", affected, pin_id);
        }
        Ok(affected)
    }

    // === Statistics ===

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let total_pins: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pins", [], |row| row.get(0))?;
        let (total_photos, downloaded_photos): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(downloaded), 0) FROM photos",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_pins,
            total_photos,
            downloaded_photos,
            db_size_bytes,
        })
    }

    fn row_to_pin(row: &rusqlite::Row) -> rusqlite::Result<Pin> {
        let created_at: String = row.get(4)?;
        Ok(Pin {
            id: row.get(0)?,
            coordinate: Coordinate {
                latitude: row.get(1)?,
                longitude: row.get(2)?,
            },
            page_count: row.get(3)?,
            created_at: parse_timestamp(&created_at),
        })
    }

    fn row_to_photo(row: &rusqlite::Row) -> rusqlite::Result<Photo> {
        let local_path: String = row.get(3)?;
        let created_at: String = row.get(6)?;
        Ok(Photo {
            id: row.get(0)?,
            pin_id: row.get(1)?,
            remote_url: row.get(2)?,
            local_path: PathBuf::from(local_path),
            title: row.get(4)?,
            downloaded: row.get(5)?,
            created_at: parse_timestamp(&created_at),
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(
        |_| {
            warn!("Unparseable timestamp {:?}, using now", value);
            Utc::now()
        },
        |dt| dt.with_timezone(&Utc),
    )
}

/// Remove a photo's image file. A file that is already gone is not an error.
fn remove_image_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Image {} already gone", path.display());
        }
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Total number of pins stored.
    pub total_pins: i64,
    /// Total number of photo records.
    pub total_photos: i64,
    /// Photo records whose image has been written.
    pub downloaded_photos: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

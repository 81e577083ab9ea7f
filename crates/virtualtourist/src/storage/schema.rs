//! `SQLite` schema for pins and photos.
//!
//! The schema is expressed as an ordered list of [`Migration`]s. A fresh
//! database runs all of them; an existing one runs the ones it has not seen.

/// Key-value table holding the schema version. Created before any migration.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Dropped map locations.
///
/// `page_count` is the number of result pages the search API reported for the
/// pin's bounding box; 0 means it has never been fetched.
pub const CREATE_PINS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS pins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
    longitude REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
    page_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)
";

/// Photos of a pin. Rows go away with their pin; image files are removed by
/// the store.
pub const CREATE_PHOTOS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pin_id INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
    remote_url TEXT NOT NULL,
    local_path TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    downloaded INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)
";

/// Pin listings are ordered by latitude.
pub const CREATE_PIN_LATITUDE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_pins_latitude ON pins(latitude)
";

/// Album listings and cascades look photos up by pin, ordered by path.
pub const CREATE_PHOTO_PIN_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_photos_pin ON photos(pin_id, local_path)
";

/// Finds photos still waiting for their image.
pub const CREATE_PENDING_PHOTO_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_photos_pending ON photos(pin_id) WHERE downloaded = 0
";

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version the database is at after this step.
    pub version: i32,
    /// Short description, logged when the step runs.
    pub description: &'static str,
    /// Statements executed in order inside one transaction.
    pub statements: &'static [&'static str],
}

/// Every migration, in version order starting at 1.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "pins and photos",
        statements: &[CREATE_PINS_TABLE, CREATE_PHOTOS_TABLE],
    },
    Migration {
        version: 2,
        description: "listing indexes",
        statements: &[
            CREATE_PIN_LATITUDE_INDEX,
            CREATE_PHOTO_PIN_INDEX,
            CREATE_PENDING_PHOTO_INDEX,
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_consecutive() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(usize::try_from(migration.version).unwrap(), i + 1);
            assert!(!migration.statements.is_empty());
            assert!(!migration.description.is_empty());
        }
    }

    #[test]
    fn test_pins_table_stores_coordinates_as_real() {
        assert!(CREATE_PINS_TABLE.contains("latitude REAL NOT NULL"));
        assert!(CREATE_PINS_TABLE.contains("longitude REAL NOT NULL"));
        assert!(CREATE_PINS_TABLE.contains("page_count INTEGER"));
    }

    #[test]
    fn test_photos_table_cascades() {
        assert!(CREATE_PHOTOS_TABLE.contains("REFERENCES pins(id) ON DELETE CASCADE"));
        assert!(CREATE_PHOTOS_TABLE.contains("downloaded INTEGER NOT NULL DEFAULT 0"));
    }

    #[test]
    fn test_photos_table_created_after_pins() {
        let first = MIGRATIONS[0].statements;
        let pins = first.iter().position(|s| *s == CREATE_PINS_TABLE).unwrap();
        let photos = first.iter().position(|s| *s == CREATE_PHOTOS_TABLE).unwrap();
        assert!(pins < photos);
    }
}

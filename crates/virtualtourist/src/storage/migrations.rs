//! Schema versioning.
//!
//! The version lives in the `metadata` table under `schema_version`. Each
//! pending [`Migration`] runs in its own transaction and bumps the version
//! when it commits, so an interrupted upgrade resumes where it stopped.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::schema::{Migration, CREATE_METADATA_TABLE, MIGRATIONS};

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// The version a fully migrated database is at.
#[must_use]
pub fn current_version() -> i32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Bring the schema up to [`current_version`].
///
/// # Errors
///
/// Returns [`Error::DatabaseMigration`] if the stored version is unreadable or
/// newer than this build knows, or if a migration statement fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute(CREATE_METADATA_TABLE, [])?;

    let version = schema_version(conn)?;
    let latest = current_version();
    if version > latest {
        return Err(Error::DatabaseMigration {
            message: format!("database schema v{version} is newer than supported v{latest}"),
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > version) {
        apply(conn, migration)?;
    }
    debug!("Schema at v{}", latest);
    Ok(())
}

/// Stored schema version, 0 for a fresh database.
fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    info!(
        "Migrating schema to v{} ({})",
        migration.version, migration.description
    );

    let tx = conn.unchecked_transaction()?;
    for statement in migration.statements {
        tx.execute(statement, []).map_err(|e| Error::DatabaseMigration {
            message: format!("v{} failed: {e}", migration.version),
        })?;
    }
    tx.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, migration.version.to_string()),
    )?;
    tx.commit()?;
    Ok(())
}

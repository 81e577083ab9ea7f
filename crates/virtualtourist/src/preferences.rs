//! User preferences remembered across launches.
//!
//! Currently this is the last-viewed map region, stored as a small JSON
//! document with the keys `latitude`, `longitude`, `latitudeDelta` and
//! `longitudeDelta`. All four being zero means "nothing remembered".

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Coordinate;

/// Extent of a map region in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// North-south extent.
    pub latitude_delta: f64,
    /// East-west extent.
    pub longitude_delta: f64,
}

impl Span {
    /// A square span of `degrees` on each side.
    #[must_use]
    pub fn square(degrees: f64) -> Self {
        Self {
            latitude_delta: degrees,
            longitude_delta: degrees,
        }
    }
}

/// A visible map region: a center and a span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Center of the region.
    pub center: Coordinate,
    /// Size of the region.
    pub span: Span,
}

impl Region {
    /// The same span, moved to a new center.
    #[must_use]
    pub fn recentered(self, center: Coordinate) -> Self {
        Self { center, ..self }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RegionRecord {
    latitude: f64,
    longitude: f64,
    latitude_delta: f64,
    longitude_delta: f64,
}

impl RegionRecord {
    fn is_unset(&self) -> bool {
        self.latitude == 0.0
            && self.longitude == 0.0
            && self.latitude_delta == 0.0
            && self.longitude_delta == 0.0
    }
}

impl From<&Region> for RegionRecord {
    fn from(region: &Region) -> Self {
        Self {
            latitude: region.center.latitude,
            longitude: region.center.longitude,
            latitude_delta: region.span.latitude_delta,
            longitude_delta: region.span.longitude_delta,
        }
    }
}

/// File-backed preferences store.
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
}

impl Preferences {
    /// Preferences stored at `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the preferences file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the remembered region, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the stored center is not a valid coordinate.
    pub fn load_region(&self) -> Result<Option<Region>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No preferences at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let record: RegionRecord = serde_json::from_str(&contents)?;
        if record.is_unset() {
            return Ok(None);
        }

        Ok(Some(Region {
            center: Coordinate::new(record.latitude, record.longitude)?,
            span: Span {
                latitude_delta: record.latitude_delta,
                longitude_delta: record.longitude_delta,
            },
        }))
    }

    /// Remember `region`.
    ///
    /// The file is replaced atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_region(&self, region: &Region) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let json = serde_json::to_string_pretty(&RegionRecord::from(region))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| Error::FileWrite {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path)?;

        debug!("Saved region centered at {}", region.center);
        Ok(())
    }

    /// Forget the remembered region.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear_region(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

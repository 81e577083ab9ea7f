//! Core data types for virtualtourist.
//!
//! A [`Pin`] is a saved geographic location; each pin owns a collection of
//! [`Photo`] records whose image bytes live on disk.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Smallest valid latitude.
pub const MIN_LATITUDE: f64 = -90.0;
/// Largest valid latitude.
pub const MAX_LATITUDE: f64 = 90.0;
/// Smallest valid longitude.
pub const MIN_LONGITUDE: f64 = -180.0;
/// Largest valid longitude.
pub const MAX_LONGITUDE: f64 = 180.0;

/// A validated geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in `[-180, 180]`.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting values outside the valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCoordinate`] if either component is out of
    /// range or not a number.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if Self::is_valid(latitude, longitude) {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(Error::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    /// Check whether the given latitude and longitude are in range.
    #[must_use]
    pub fn is_valid(latitude: f64, longitude: f64) -> bool {
        (MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude)
            && (MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude)
    }

    /// Re-check a coordinate that may have been built with struct literal syntax.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCoordinate`] if either component is out of range.
    pub fn validate(self) -> Result<Self> {
        Self::new(self.latitude, self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// A user-placed marker at a saved location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    /// Unique identifier assigned by the store.
    pub id: i64,
    /// Where the pin was dropped.
    pub coordinate: Coordinate,
    /// Number of result pages the search API reported for this location.
    /// Zero means no photos have been fetched yet.
    pub page_count: u32,
    /// When the pin was created.
    pub created_at: DateTime<Utc>,
}

impl Pin {
    /// Whether a search has ever completed for this pin.
    #[must_use]
    pub fn has_fetched(&self) -> bool {
        self.page_count > 0
    }
}

/// A single image belonging to a [`Pin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    /// Unique identifier assigned by the store.
    pub id: i64,
    /// The owning pin.
    pub pin_id: i64,
    /// Where the image is downloaded from.
    pub remote_url: String,
    /// Where the image bytes are (or will be) stored.
    pub local_path: PathBuf,
    /// Title reported by the search API.
    pub title: String,
    /// Set once the image bytes have been written to `local_path`.
    pub downloaded: bool,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// The fields needed to insert a new [`Photo`].
///
/// New photos always start out not downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPhoto {
    /// The owning pin.
    pub pin_id: i64,
    /// Where the image is downloaded from.
    pub remote_url: String,
    /// Where the image bytes will be stored.
    pub local_path: PathBuf,
    /// Title reported by the search API.
    pub title: String,
}

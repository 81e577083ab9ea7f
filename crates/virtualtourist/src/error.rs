//! Error types for virtualtourist.
//!
//! This module defines all error types used throughout the virtualtourist crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for virtualtourist operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// No pin exists with the given ID.
    #[error("pin {0} not found")]
    PinNotFound(i64),

    /// No photo with the given ID exists for the pin.
    #[error("photo {photo_id} not found for pin {pin_id}")]
    PhotoNotFound {
        /// The pin the photo was expected to belong to.
        pin_id: i64,
        /// The photo that was requested.
        photo_id: i64,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Model Errors ===
    /// Latitude or longitude outside of the valid range.
    #[error("invalid coordinate ({latitude}, {longitude}): latitude must be within [-90, 90] and longitude within [-180, 180]")]
    InvalidCoordinate {
        /// The rejected latitude.
        latitude: f64,
        /// The rejected longitude.
        longitude: f64,
    },

    // === Photo Search Errors ===
    /// No API key is configured for the photo-search service.
    #[error("no Flickr API key configured (set flickr.api_key or VIRTUALTOURIST_FLICKR__API_KEY)")]
    MissingApiKey,

    /// The HTTP request could not be completed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The response status code.
        status: u16,
        /// The requested URL (without query string).
        url: String,
    },

    /// The photo-search API reported a failure in its response envelope.
    #[error("Flickr API error {code}: {message}")]
    FlickrApi {
        /// API error code.
        code: i64,
        /// API error message.
        message: String,
    },

    /// The response envelope was missing required data.
    #[error("malformed search response: {0}")]
    MalformedResponse(String),

    /// The search succeeded but returned nothing usable.
    #[error("no photos found near ({latitude}, {longitude})")]
    NoPhotosFound {
        /// Latitude that was searched.
        latitude: f64,
        /// Longitude that was searched.
        longitude: f64,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("failed to write {path}: {source}")]
    FileWrite {
        /// Path that couldn't be written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for virtualtourist operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a malformed response error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Check if this error means a requested pin or photo does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PinNotFound(_) | Self::PhotoNotFound { .. })
    }

    /// Check if this error came from talking to the remote service.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::HttpStatus { .. } | Self::FlickrApi { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PinNotFound(7);
        assert_eq!(err.to_string(), "pin 7 not found");
    }

    #[test]
    fn test_invalid_coordinate_display() {
        let err = Error::InvalidCoordinate {
            latitude: -91.0,
            longitude: 0.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("-91"));
        assert!(msg.contains("[-90, 90]"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::PinNotFound(1).is_not_found());
        assert!(Error::PhotoNotFound {
            pin_id: 1,
            photo_id: 2
        }
        .is_not_found());
        assert!(!Error::MissingApiKey.is_not_found());
    }

    #[test]
    fn test_is_network_error() {
        let err = Error::HttpStatus {
            status: 503,
            url: "https://api.flickr.com/services/rest/".to_string(),
        };
        assert!(err.is_network_error());
        assert!(Error::FlickrApi {
            code: 100,
            message: "Invalid API Key".to_string()
        }
        .is_network_error());
        assert!(!Error::PinNotFound(1).is_network_error());
    }

    #[test]
    fn test_photo_not_found_display() {
        let err = Error::PhotoNotFound {
            pin_id: 3,
            photo_id: 42,
        };
        assert_eq!(err.to_string(), "photo 42 not found for pin 3");
    }

    #[test]
    fn test_flickr_api_error_display() {
        let err = Error::FlickrApi {
            code: 100,
            message: "Invalid API Key (Key has invalid format)".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("Invalid API Key"));
    }

    #[test]
    fn test_no_photos_found_display() {
        let err = Error::NoPhotosFound {
            latitude: 34.05,
            longitude: -118.25,
        };
        assert!(err.to_string().contains("34.05"));
    }

    #[test]
    fn test_conversions_keep_source_kind() {
        let err: Error = serde_json::from_str::<i32>("{").unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));

        // A missing row from the store is not the same as a missing pin
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::DatabaseQuery(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::invalid_config("per_page must be between 1 and 500");
        assert!(err.to_string().contains("per_page"));
    }

    #[test]
    fn test_file_write_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::FileWrite {
            path: PathBuf::from("/root/forbidden/photo.jpg"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden/photo.jpg"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }

    #[test]
    fn test_malformed_response_display() {
        let err = Error::malformed("missing photos object");
        assert_eq!(
            err.to_string(),
            "malformed search response: missing photos object"
        );
    }
}

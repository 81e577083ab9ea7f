//! `virtualtourist` - Drop pins on a map and browse photos taken near them
//!
//! This library provides pin and photo persistence, a Flickr photo-search
//! client, and the album workflow that downloads a collection of images for
//! each pin and cleans up image files when photos are removed.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod album;
pub mod cli;
pub mod config;
pub mod error;
pub mod flickr;
pub mod logging;
pub mod model;
pub mod preferences;
pub mod storage;

pub use album::{Album, CollectionReport};
pub use config::Config;
pub use error::{Error, Result};
pub use flickr::{FlickrClient, PhotoSource};
pub use logging::init_logging;
pub use model::{Coordinate, Photo, Pin};
pub use preferences::{Preferences, Region, Span};
pub use storage::{Storage, StorageStats, StoreChange};

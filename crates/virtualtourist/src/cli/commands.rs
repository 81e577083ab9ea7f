//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Pin management commands.
#[derive(Debug, Subcommand)]
pub enum PinCommand {
    /// Drop a new pin
    Add {
        /// Latitude in degrees (-90 to 90)
        #[arg(allow_negative_numbers = true)]
        latitude: f64,

        /// Longitude in degrees (-180 to 180)
        #[arg(allow_negative_numbers = true)]
        longitude: f64,

        /// Fetch the first photo collection right away
        #[arg(short, long)]
        fetch: bool,
    },

    /// List all pins
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove a pin together with its photos
    Remove {
        /// Pin ID
        id: i64,
    },
}

/// Photo album commands.
#[derive(Debug, Subcommand)]
pub enum AlbumCommand {
    /// Show a pin's photos, fetching the first collection if needed
    Show {
        /// Pin ID
        pin: i64,

        /// Only show what is stored, never fetch
        #[arg(long)]
        no_fetch: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Replace a pin's photos with a new collection
    New {
        /// Pin ID
        pin: i64,
    },

    /// Remove selected photos from a pin's album
    Remove {
        /// Pin ID
        pin: i64,

        /// Photo IDs to remove
        #[arg(required = true, num_args = 1..)]
        photos: Vec<i64>,
    },

    /// Download images that failed to download earlier
    Download {
        /// Pin ID
        pin: i64,
    },
}

/// Search command arguments.
#[derive(Debug, Args)]
pub struct SearchCommand {
    /// Latitude in degrees (-90 to 90)
    #[arg(allow_negative_numbers = true)]
    pub latitude: f64,

    /// Longitude in degrees (-180 to 180)
    #[arg(allow_negative_numbers = true)]
    pub longitude: f64,

    /// Result page to request
    #[arg(short, long, default_value = "1")]
    pub page: u32,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Remembered map region commands.
#[derive(Debug, Subcommand)]
pub enum RegionCommand {
    /// Show the remembered region
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Remember a region
    Set {
        /// Center latitude
        #[arg(allow_negative_numbers = true)]
        latitude: f64,

        /// Center longitude
        #[arg(allow_negative_numbers = true)]
        longitude: f64,

        /// North-south extent in degrees
        latitude_delta: f64,

        /// East-west extent in degrees
        longitude_delta: f64,
    },

    /// Forget the remembered region
    Clear,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Plain,
    /// Formatted table
    #[default]
    Table,
    /// JSON output
    Json,
}

//! Command-line interface for virtualtourist.
//!
//! This module provides the CLI structure for the `vtour` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    AlbumCommand, ConfigCommand, OutputFormat, PinCommand, RegionCommand, SearchCommand,
    StatusCommand,
};

/// vtour - Drop pins and browse photos taken near them
///
/// Saves locations, fetches photo collections for each one from Flickr, and
/// keeps the downloaded images on disk.
#[derive(Debug, Parser)]
#[command(name = "vtour")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Drop, list and remove pins
    #[command(subcommand)]
    Pin(PinCommand),

    /// Browse and edit a pin's photo album
    #[command(subcommand)]
    Album(AlbumCommand),

    /// Search photos near a location without saving anything
    Search(SearchCommand),

    /// Show or change the remembered map region
    #[command(subcommand)]
    Region(RegionCommand),

    /// Show storage status
    Status(StatusCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

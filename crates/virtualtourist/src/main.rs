//! `vtour` - CLI for virtualtourist
//!
//! This binary provides the command-line interface for dropping pins,
//! browsing their photo albums and managing local state.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::broadcast::{self, error::TryRecvError};

use virtualtourist::album::{ensure_photos_dir, Album};
use virtualtourist::cli::{
    AlbumCommand, Cli, Command, ConfigCommand, OutputFormat, PinCommand, RegionCommand,
    SearchCommand,
};
use virtualtourist::{
    init_logging, Config, Coordinate, Error, FlickrClient, Photo, PhotoSource, Pin, Preferences,
    Region, Span, Storage, StoreChange,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let config_path = cli.config.clone();
    let result = run(config_path.clone(), cli.command).await;

    if let Err(e) = &result {
        match e.downcast_ref::<Error>() {
            Some(Error::MissingApiKey) => tracing::warn!(
                "Set flickr.api_key in {} or VIRTUALTOURIST_FLICKR__API_KEY",
                config_path
                    .unwrap_or_else(Config::default_config_path)
                    .display()
            ),
            Some(err) if err.is_network_error() => {
                tracing::warn!("Check your network connection and Flickr API key");
            }
            _ => {}
        }
    }
    result
}

/// Dispatch a command. Config commands load the file themselves so a broken
/// file can still be located and validated.
async fn run(config_path: Option<PathBuf>, command: Command) -> anyhow::Result<()> {
    let load = || Config::load_from(config_path.clone()).context("loading configuration");

    match command {
        Command::Pin(pin_cmd) => handle_pin(&load()?, pin_cmd).await,
        Command::Album(album_cmd) => handle_album(&load()?, album_cmd).await,
        Command::Search(search_cmd) => handle_search(&load()?, &search_cmd).await,
        Command::Region(region_cmd) => handle_region(&load()?, region_cmd),
        Command::Status(status_cmd) => handle_status(&load()?, status_cmd.json),
        Command::Config(config_cmd) => handle_config(config_path, config_cmd),
    }
}

/// Open the store and make sure the image directory exists.
fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    ensure_photos_dir(&config.photos_dir())?;
    let storage = Storage::open(config.database_path())
        .with_context(|| format!("opening {}", config.database_path().display()))?;
    Ok(storage)
}

fn build_album<'a>(
    config: &Config,
    storage: &'a Storage,
    client: &'a FlickrClient,
) -> Album<'a, FlickrClient> {
    Album::new(
        storage,
        client,
        config.photos_dir(),
        config.flickr.max_concurrent_downloads,
    )
}

async fn handle_pin(config: &Config, cmd: PinCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;

    match cmd {
        PinCommand::Add {
            latitude,
            longitude,
            fetch,
        } => {
            let client = FlickrClient::new(&config.flickr)?;
            let album = build_album(config, &storage, &client);

            let pin = album.drop_pin(latitude, longitude)?;
            println!("Dropped pin {} at {}", pin.id, pin.coordinate);
            remember_pin_region(config, &pin);

            if fetch {
                let photos = album.open_album(pin.id).await?;
                print_photo_summary(&photos);
            }
        }
        PinCommand::List { format } => {
            let pins = storage.list_pins()?;
            print_pins(&storage, &pins, format)?;
        }
        PinCommand::Remove { id } => {
            let client = FlickrClient::new(&config.flickr)?;
            let album = build_album(config, &storage, &client);
            if !album.remove_pin(id)? {
                return Err(Error::PinNotFound(id).into());
            }
            println!("Removed pin {id}");
        }
    }
    Ok(())
}

/// Re-center the remembered region on a freshly dropped pin.
fn remember_pin_region(config: &Config, pin: &Pin) {
    let prefs = Preferences::new(config.preferences_path());
    let region = match prefs.load_region() {
        Ok(Some(region)) => region.recentered(pin.coordinate),
        Ok(None) => Region {
            center: pin.coordinate,
            span: Span::square(config.map.default_span_degrees),
        },
        Err(e) => {
            tracing::warn!("Ignoring unreadable preferences: {}", e);
            Region {
                center: pin.coordinate,
                span: Span::square(config.map.default_span_degrees),
            }
        }
    };
    if let Err(e) = prefs.save_region(&region) {
        tracing::warn!("Failed to remember region: {}", e);
    }
}

async fn handle_album(config: &Config, cmd: AlbumCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let client = FlickrClient::new(&config.flickr)?;
    let album = build_album(config, &storage, &client);
    let mut changes = storage.subscribe();

    match cmd {
        AlbumCommand::Show {
            pin,
            no_fetch,
            format,
        } => {
            let photos = if no_fetch {
                storage.require_pin(pin)?;
                storage.photos_for_pin(pin)?
            } else {
                album.open_album(pin).await?
            };
            print_photos(&photos, format)?;
        }
        AlbumCommand::New { pin } => {
            let report = album.new_collection(pin).await?;
            println!(
                "New collection for pin {}: page {} of {}, {} photos ({} downloaded, {} failed)",
                report.pin_id,
                report.page,
                report.pages,
                report.photos,
                report.downloaded,
                report.failed
            );
        }
        AlbumCommand::Remove { pin, photos } => {
            let removed = album.remove_photos(pin, &photos)?;
            println!("Removed {removed} photos from pin {pin}");
        }
        AlbumCommand::Download { pin } => {
            let (downloaded, failed) = album.download_pending(pin).await?;
            println!("Downloaded {downloaded} photos ({failed} failed)");
        }
    }

    report_changes(&mut changes);
    Ok(())
}

/// Log how the album changed while a command ran.
fn report_changes(changes: &mut broadcast::Receiver<StoreChange>) {
    let (mut added, mut updated, mut removed) = (0, 0, 0);
    loop {
        match changes.try_recv() {
            Ok(StoreChange::PhotoInserted { .. }) => added += 1,
            Ok(StoreChange::PhotoUpdated { .. }) => updated += 1,
            Ok(StoreChange::PhotoDeleted { .. }) => removed += 1,
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::debug!("Missed {} change notifications", skipped);
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    tracing::info!(
        "Album changes: {} photos added, {} downloaded, {} removed",
        added,
        updated,
        removed
    );
}

async fn handle_search(config: &Config, cmd: &SearchCommand) -> anyhow::Result<()> {
    let coordinate = Coordinate::new(cmd.latitude, cmd.longitude)?;
    let client = FlickrClient::new(&config.flickr)?;
    let results = client.search(coordinate, cmd.page).await?;

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Plain => {
            for photo in &results.photos {
                println!("{}", photo.remote_url);
            }
        }
        OutputFormat::Table => {
            println!(
                "Page {} of {} ({} photos total)",
                results.page, results.pages, results.total
            );
            println!("{:<14} {:<40} URL", "ID", "FILENAME");
            for photo in &results.photos {
                println!("{:<14} {:<40} {}", photo.id, photo.filename, photo.remote_url);
            }
        }
    }
    Ok(())
}

fn handle_region(config: &Config, cmd: RegionCommand) -> anyhow::Result<()> {
    let prefs = Preferences::new(config.preferences_path());

    match cmd {
        RegionCommand::Show { json } => match prefs.load_region()? {
            Some(region) if json => println!("{}", serde_json::to_string_pretty(&region)?),
            Some(region) => {
                println!("Center: {}", region.center);
                println!(
                    "Span:   {} x {} degrees",
                    region.span.latitude_delta, region.span.longitude_delta
                );
            }
            None if json => println!("null"),
            None => println!("No region remembered"),
        },
        RegionCommand::Set {
            latitude,
            longitude,
            latitude_delta,
            longitude_delta,
        } => {
            if !(latitude_delta > 0.0 && longitude_delta > 0.0) {
                bail!("span must be positive, got {latitude_delta} x {longitude_delta}");
            }
            let region = Region {
                center: Coordinate::new(latitude, longitude)?,
                span: Span {
                    latitude_delta,
                    longitude_delta,
                },
            };
            prefs.save_region(&region)?;
            println!("Remembered region centered at {}", region.center);
        }
        RegionCommand::Clear => {
            prefs.clear_region()?;
            println!("Forgot remembered region");
        }
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;
    let region = Preferences::new(config.preferences_path())
        .load_region()
        .unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable preferences: {}", e);
            None
        });

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "photos_dir": config.photos_dir(),
            "api_key_configured": config.has_api_key(),
            "stats": stats,
            "region": region,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("vtour status");
        println!("------------");
        println!("Database:      {}", config.database_path().display());
        println!("Images:        {}", config.photos_dir().display());
        println!(
            "API key:       {}",
            if config.has_api_key() { "configured" } else { "missing" }
        );
        println!("Pins:          {}", stats.total_pins);
        println!(
            "Photos:        {} ({} downloaded)",
            stats.total_photos, stats.downloaded_photos
        );
        println!("Database size: {} bytes", stats.db_size_bytes);
        match region {
            Some(region) => println!("Region:        {}", region.center),
            None => println!("Region:        none"),
        }
    }
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path).context("loading configuration")?;
            let mut shown = config.clone();
            if shown.flickr.api_key.is_some() {
                shown.flickr.api_key = Some("<redacted>".to_string());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Flickr]");
                println!(
                    "  API key:            {}",
                    shown.flickr.api_key.as_deref().unwrap_or("<not set>")
                );
                println!("  Base URL:           {}", shown.flickr.base_url);
                println!("  Per page:           {}", shown.flickr.per_page);
                println!("  Timeout (s):        {}", shown.flickr.timeout_secs);
                println!(
                    "  Parallel downloads: {}",
                    shown.flickr.max_concurrent_downloads
                );
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Images:             {}", config.photos_dir().display());
                println!("  Preferences:        {}", config.preferences_path().display());
                println!();
                println!("[Map]");
                println!("  Default span:       {}", shown.map.default_span_degrees);
            }
        }
        ConfigCommand::Path => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::validate_file(&path)
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

fn print_pins(storage: &Storage, pins: &[Pin], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(pins)?),
        OutputFormat::Plain => {
            for pin in pins {
                println!(
                    "{}\t{}\t{}",
                    pin.id, pin.coordinate.latitude, pin.coordinate.longitude
                );
            }
        }
        OutputFormat::Table => {
            if pins.is_empty() {
                println!("No pins yet. Drop one with `vtour pin add <LAT> <LON>`.");
                return Ok(());
            }
            println!(
                "{:>5}  {:>11}  {:>12}  {:>6}  {:>6}",
                "ID", "LATITUDE", "LONGITUDE", "PAGES", "PHOTOS"
            );
            for pin in pins {
                let photos = storage.photos_for_pin(pin.id)?.len();
                println!(
                    "{:>5}  {:>11.6}  {:>12.6}  {:>6}  {:>6}",
                    pin.id,
                    pin.coordinate.latitude,
                    pin.coordinate.longitude,
                    pin.page_count,
                    photos
                );
            }
        }
    }
    Ok(())
}

fn print_photos(photos: &[Photo], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(photos)?),
        OutputFormat::Plain => {
            for photo in photos.iter().filter(|p| p.downloaded) {
                println!("{}", photo.local_path.display());
            }
        }
        OutputFormat::Table => {
            if photos.is_empty() {
                println!("No images");
                return Ok(());
            }
            println!("{:>6}  {:<4}  {:<32}  PATH", "ID", "DONE", "TITLE");
            for photo in photos {
                let title: String = photo.title.chars().take(32).collect();
                println!(
                    "{:>6}  {:<4}  {:<32}  {}",
                    photo.id,
                    if photo.downloaded { "yes" } else { "no" },
                    title,
                    photo.local_path.display()
                );
            }
        }
    }
    Ok(())
}

fn print_photo_summary(photos: &[Photo]) {
    let downloaded = photos.iter().filter(|p| p.downloaded).count();
    println!("{} photos ({} downloaded)", photos.len(), downloaded);
}

//! Photo album workflow.
//!
//! Ties the [`Storage`] and a [`PhotoSource`] together: dropping pins,
//! fetching a pin's first collection, replacing it with a new collection from
//! a random result page, and removing selected photos.
//!
//! Image downloads run concurrently up to a fixed limit. There is no ordering
//! between downloads and no retry; a failed download leaves its photo marked
//! not downloaded.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::flickr::{PhotoSource, SearchResults};
use crate::model::{Coordinate, NewPhoto, Photo, Pin};
use crate::storage::Storage;

/// The search API never serves results past this many photos, whatever
/// `pages` it reports.
pub const MAX_SEARCHABLE_RESULTS: u32 = 4000;

/// Create the image directory if it does not exist yet.
///
/// # Errors
///
/// Returns [`Error::DirectoryCreate`] if the directory cannot be created.
pub fn ensure_photos_dir(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|source| Error::DirectoryCreate {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Created image directory {}", path.display());
    }
    Ok(path.to_path_buf())
}

/// Pick a result page for a new collection.
///
/// Pages are 1-based. Only pages within the searchable window are eligible.
pub fn choose_page<R: Rng + ?Sized>(page_count: u32, per_page: u32, rng: &mut R) -> u32 {
    let max_page = (MAX_SEARCHABLE_RESULTS / per_page.max(1)).max(1);
    let last = page_count.min(max_page);
    if last <= 1 {
        1
    } else {
        rng.gen_range(1..=last)
    }
}

/// `dir/filename`, numbered `-2`, `-3`, ... before the extension when the
/// name is already taken in `used`.
fn unique_path(dir: &Path, filename: &str, used: &mut HashSet<PathBuf>) -> PathBuf {
    let (stem, extension) = match filename.rsplit_once('.') {
        Some((stem, extension)) => (stem, format!(".{extension}")),
        None => (filename, String::new()),
    };

    let mut candidate = dir.join(filename);
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = dir.join(format!("{stem}-{n}{extension}"));
        n += 1;
    }
    candidate
}

/// Outcome of fetching a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    /// The pin the collection belongs to.
    pub pin_id: i64,
    /// Result page that was fetched.
    pub page: u32,
    /// Pages the API reported for the location.
    pub pages: u32,
    /// Photo records created.
    pub photos: usize,
    /// Images written to disk.
    pub downloaded: usize,
    /// Images that could not be fetched or written.
    pub failed: usize,
}

/// Album operations over a store, a photo source and an image directory.
#[derive(Debug)]
pub struct Album<'a, S> {
    storage: &'a Storage,
    source: &'a S,
    photos_dir: PathBuf,
    max_concurrent_downloads: usize,
}

impl<'a, S: PhotoSource> Album<'a, S> {
    /// Create an album writing images below `photos_dir`.
    #[must_use]
    pub fn new(
        storage: &'a Storage,
        source: &'a S,
        photos_dir: impl Into<PathBuf>,
        max_concurrent_downloads: usize,
    ) -> Self {
        Self {
            storage,
            source,
            photos_dir: photos_dir.into(),
            max_concurrent_downloads: max_concurrent_downloads.max(1),
        }
    }

    /// Directory holding the images of one pin.
    #[must_use]
    pub fn pin_dir(&self, pin_id: i64) -> PathBuf {
        self.photos_dir.join(format!("pin-{pin_id}"))
    }

    /// Validate and persist a new pin.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid coordinate or a failed insert.
    pub fn drop_pin(&self, latitude: f64, longitude: f64) -> Result<Pin> {
        let pin = self.storage.insert_pin(Coordinate::new(latitude, longitude)?)?;
        info!("Dropped pin {} at {}", pin.id, pin.coordinate);
        Ok(pin)
    }

    /// Delete a pin with its photos and remove its image directory.
    ///
    /// Returns `false` if there is no such pin.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn remove_pin(&self, pin_id: i64) -> Result<bool> {
        if !self.storage.delete_pin(pin_id)? {
            return Ok(false);
        }

        let dir = self.pin_dir(pin_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => debug!("Removed {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
        }
        Ok(true)
    }

    /// The photos of a pin, fetching the first collection if it has never
    /// been fetched.
    ///
    /// # Errors
    ///
    /// Returns an error if the pin does not exist, or if the first fetch fails.
    pub async fn open_album(&self, pin_id: i64) -> Result<Vec<Photo>> {
        let pin = self.storage.require_pin(pin_id)?;
        let photos = self.storage.photos_for_pin(pin_id)?;
        if !photos.is_empty() || pin.has_fetched() {
            return Ok(photos);
        }

        debug!("Pin {} has no photos yet, fetching first page", pin_id);
        self.fetch_page(&pin, 1).await?;
        self.storage.photos_for_pin(pin_id)
    }

    /// Replace a pin's photos with a collection from a random result page.
    ///
    /// # Errors
    ///
    /// Returns an error if the pin does not exist or the search fails. The
    /// old photos are already gone when a search fails.
    pub async fn new_collection(&self, pin_id: i64) -> Result<CollectionReport> {
        let pin = self.storage.require_pin(pin_id)?;

        let removed = self.storage.delete_photos_for_pin(pin_id)?;
        debug!("Removed {} photos before new collection", removed);

        let page = choose_page(pin.page_count, self.source.per_page(), &mut rand::thread_rng());
        self.fetch_page(&pin, page).await
    }

    /// Remove the selected photos of a pin.
    ///
    /// Every ID is checked before anything is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PhotoNotFound`] if any ID does not belong to the pin.
    pub fn remove_photos(&self, pin_id: i64, photo_ids: &[i64]) -> Result<usize> {
        self.storage.require_pin(pin_id)?;

        for &photo_id in photo_ids {
            match self.storage.get_photo(photo_id)? {
                Some(photo) if photo.pin_id == pin_id => {}
                _ => return Err(Error::PhotoNotFound { pin_id, photo_id }),
            }
        }

        let mut removed = 0;
        for &photo_id in photo_ids {
            if self.storage.delete_photo(photo_id)? {
                removed += 1;
            }
        }
        info!("Removed {} photos from pin {}", removed, pin_id);
        Ok(removed)
    }

    /// Download images for photos of a pin that are not downloaded yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the pin does not exist or the store fails.
    pub async fn download_pending(&self, pin_id: i64) -> Result<(usize, usize)> {
        self.storage.require_pin(pin_id)?;
        let pending = self.storage.pending_photos(pin_id)?;
        self.download(pending).await
    }

    async fn fetch_page(&self, pin: &Pin, page: u32) -> Result<CollectionReport> {
        let SearchResults {
            page,
            pages,
            photos: refs,
            ..
        } = self.source.search(pin.coordinate, page).await?;

        self.storage.set_page_count(pin.id, pages)?;

        let pin_dir = self.pin_dir(pin.id);
        let mut used = HashSet::new();
        let photos = refs
            .into_iter()
            .map(|photo_ref| {
                self.storage.insert_photo(&NewPhoto {
                    pin_id: pin.id,
                    local_path: unique_path(&pin_dir, &photo_ref.filename, &mut used),
                    remote_url: photo_ref.remote_url,
                    title: photo_ref.title,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let created = photos.len();
        let (downloaded, failed) = self.download(photos).await?;

        info!(
            "Pin {}: page {} of {}, {} photos, {} downloaded, {} failed",
            pin.id, page, pages, created, downloaded, failed
        );
        Ok(CollectionReport {
            pin_id: pin.id,
            page,
            pages,
            photos: created,
            downloaded,
            failed,
        })
    }

    /// Returns `(downloaded, failed)`.
    async fn download(&self, photos: Vec<Photo>) -> Result<(usize, usize)> {
        let mut downloads = stream::iter(photos)
            .map(|photo| async move {
                let result = self.fetch_and_write(&photo).await;
                (photo, result)
            })
            .buffer_unordered(self.max_concurrent_downloads);

        let (mut downloaded, mut failed) = (0, 0);
        while let Some((photo, result)) = downloads.next().await {
            match result {
                Ok(()) => {
                    self.storage.mark_downloaded(photo.id)?;
                    downloaded += 1;
                }
                Err(e) => {
                    warn!("Failed to download photo {} ({}): {}", photo.id, photo.remote_url, e);
                    failed += 1;
                }
            }
        }
        Ok((downloaded, failed))
    }

    async fn fetch_and_write(&self, photo: &Photo) -> Result<()> {
        let bytes = self.source.fetch_image(&photo.remote_url).await?;

        if let Some(dir) = photo.local_path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| Error::DirectoryCreate {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&photo.local_path, &bytes)
            .await
            .map_err(|source| Error::FileWrite {
                path: photo.local_path.clone(),
                source,
            })?;

        debug!("Wrote {} bytes to {}", bytes.len(), photo.local_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rand::rngs::mock::StepRng;

    use super::*;
    use crate::flickr::PhotoRef;
    use crate::logging::init_test_logging;

    /// Serves `count` photos per page and records which pages were asked for.
    struct FakeSource {
        count: usize,
        pages: u32,
        fail_urls: HashSet<String>,
        repeat_first: bool,
        requested_pages: Mutex<Vec<u32>>,
    }

    impl FakeSource {
        fn new(count: usize, pages: u32) -> Self {
            Self {
                count,
                pages,
                fail_urls: HashSet::new(),
                repeat_first: false,
                requested_pages: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, url: &str) -> Self {
            self.fail_urls.insert(url.to_string());
            self
        }

        /// Lists the first photo of every page twice.
        fn repeating_first(mut self) -> Self {
            self.repeat_first = true;
            self
        }

        fn requested_pages(&self) -> Vec<u32> {
            self.requested_pages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PhotoSource for FakeSource {
        fn per_page(&self) -> u32 {
            21
        }

        async fn search(&self, coordinate: Coordinate, page: u32) -> Result<SearchResults> {
            coordinate.validate()?;
            self.requested_pages.lock().unwrap().push(page);
            if self.count == 0 {
                return Err(Error::NoPhotosFound {
                    latitude: coordinate.latitude,
                    longitude: coordinate.longitude,
                });
            }
            let mut photos: Vec<PhotoRef> = (0..self.count)
                .map(|i| PhotoRef {
                    id: format!("{page}{i}"),
                    title: format!("photo {i}"),
                    remote_url: format!("https://example.test/{page}/{i}.jpg"),
                    filename: format!("photo-{i}-{page}{i}.jpg"),
                })
                .collect();
            if self.repeat_first {
                photos.push(photos[0].clone());
            }
            Ok(SearchResults {
                page,
                pages: self.pages,
                total: u64::from(self.pages) * self.count as u64,
                photos,
            })
        }

        async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
            if self.fail_urls.contains(url) {
                return Err(Error::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                });
            }
            Ok(url.as_bytes().to_vec())
        }
    }

    struct Fixture {
        storage: Storage,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            init_test_logging();
            Self {
                storage: Storage::open_in_memory().unwrap(),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn album<'a>(&'a self, source: &'a FakeSource) -> Album<'a, FakeSource> {
            Album::new(&self.storage, source, self.dir.path(), 3)
        }
    }

    #[test]
    fn test_choose_page_never_fetched() {
        let mut rng = StepRng::new(0, 1);
        assert_eq!(choose_page(0, 21, &mut rng), 1);
        assert_eq!(choose_page(1, 21, &mut rng), 1);
    }

    #[test]
    fn test_choose_page_within_bounds() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let page = choose_page(7, 21, &mut rng);
            assert!((1..=7).contains(&page));
        }
    }

    #[test]
    fn test_choose_page_capped_by_searchable_window() {
        let mut rng = rand::thread_rng();
        // 4000 / 21 = 190 reachable pages
        for _ in 0..200 {
            let page = choose_page(10_000, 21, &mut rng);
            assert!((1..=190).contains(&page));
        }
        assert_eq!(choose_page(10_000, 500, &mut StepRng::new(0, 0)), 1);
    }

    #[test]
    fn test_ensure_photos_dir() {
        let dir = tempfile::tempdir().unwrap();
        let photos = dir.path().join("VirtualTouristPhotos");

        assert_eq!(ensure_photos_dir(&photos).unwrap(), photos);
        assert!(photos.is_dir());
        // Existing directory is left alone
        ensure_photos_dir(&photos).unwrap();
    }

    #[test]
    fn test_drop_pin() {
        let fixture = Fixture::new();
        let source = FakeSource::new(3, 5);
        let album = fixture.album(&source);

        let pin = album.drop_pin(34.05, -118.25).unwrap();
        assert_eq!(pin.page_count, 0);
        assert_eq!(fixture.storage.list_pins().unwrap().len(), 1);

        assert!(matches!(
            album.drop_pin(-91.0, 0.0),
            Err(Error::InvalidCoordinate { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_album_fetches_first_page() {
        let fixture = Fixture::new();
        let source = FakeSource::new(4, 12);
        let album = fixture.album(&source);
        let pin = album.drop_pin(34.05, -118.25).unwrap();

        let photos = album.open_album(pin.id).await.unwrap();

        assert_eq!(photos.len(), 4);
        assert!(photos.iter().all(|p| p.downloaded));
        assert!(photos.iter().all(|p| p.local_path.exists()));
        assert!(photos
            .iter()
            .all(|p| p.local_path.starts_with(album.pin_dir(pin.id))));
        assert_eq!(source.requested_pages(), vec![1]);
        assert_eq!(fixture.storage.require_pin(pin.id).unwrap().page_count, 12);

        let bytes = std::fs::read(&photos[0].local_path).unwrap();
        assert_eq!(bytes, photos[0].remote_url.as_bytes());
    }

    #[tokio::test]
    async fn test_open_album_does_not_refetch() {
        let fixture = Fixture::new();
        let source = FakeSource::new(2, 3);
        let album = fixture.album(&source);
        let pin = album.drop_pin(10.5, 10.5).unwrap();

        album.open_album(pin.id).await.unwrap();
        let photos = album.open_album(pin.id).await.unwrap();

        assert_eq!(photos.len(), 2);
        assert_eq!(source.requested_pages(), vec![1]);
    }

    #[tokio::test]
    async fn test_open_album_missing_pin() {
        let fixture = Fixture::new();
        let source = FakeSource::new(2, 3);
        let err = fixture.album(&source).open_album(77).await.unwrap_err();
        assert!(matches!(err, Error::PinNotFound(77)));
    }

    #[tokio::test]
    async fn test_open_album_no_results() {
        let fixture = Fixture::new();
        let source = FakeSource::new(0, 0);
        let album = fixture.album(&source);
        let pin = album.drop_pin(0.5, -150.5).unwrap();

        let err = album.open_album(pin.id).await.unwrap_err();
        assert!(matches!(err, Error::NoPhotosFound { .. }));
        assert!(fixture.storage.photos_for_pin(pin.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_download_stays_pending() {
        let fixture = Fixture::new();
        let source = FakeSource::new(3, 1).failing("https://example.test/1/1.jpg");
        let album = fixture.album(&source);
        let pin = album.drop_pin(1.5, 1.5).unwrap();

        let photos = album.open_album(pin.id).await.unwrap();
        assert_eq!(photos.len(), 3);

        let pending = fixture.storage.pending_photos(pin.id).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].remote_url, "https://example.test/1/1.jpg");
        assert!(!pending[0].local_path.exists());

        // No retry happens by itself; an explicit pass still fails the same way
        assert_eq!(album.download_pending(pin.id).await.unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn test_new_collection_replaces_photos() {
        let fixture = Fixture::new();
        let source = FakeSource::new(3, 1);
        let album = fixture.album(&source);
        let pin = album.drop_pin(48.85, 2.35).unwrap();

        let old = album.open_album(pin.id).await.unwrap();
        let report = album.new_collection(pin.id).await.unwrap();

        assert_eq!(report.pin_id, pin.id);
        assert_eq!(report.page, 1);
        assert_eq!(report.photos, 3);
        assert_eq!(report.downloaded, 3);
        assert_eq!(report.failed, 0);

        let new = fixture.storage.photos_for_pin(pin.id).unwrap();
        assert_eq!(new.len(), 3);
        let old_ids: HashSet<i64> = old.iter().map(|p| p.id).collect();
        assert!(new.iter().all(|p| !old_ids.contains(&p.id)));
    }

    #[tokio::test]
    async fn test_new_collection_uses_known_page_count() {
        let fixture = Fixture::new();
        let source = FakeSource::new(1, 5);
        let album = fixture.album(&source);
        let pin = album.drop_pin(48.85, 2.35).unwrap();
        album.open_album(pin.id).await.unwrap();

        for _ in 0..10 {
            album.new_collection(pin.id).await.unwrap();
        }

        let pages = source.requested_pages();
        assert_eq!(pages[0], 1);
        assert!(pages.iter().all(|p| (1..=5).contains(p)));
    }

    #[tokio::test]
    async fn test_remove_photos() {
        let fixture = Fixture::new();
        let source = FakeSource::new(3, 1);
        let album = fixture.album(&source);
        let pin = album.drop_pin(1.5, 1.5).unwrap();
        let photos = album.open_album(pin.id).await.unwrap();

        let removed = album.remove_photos(pin.id, &[photos[0].id]).unwrap();

        assert_eq!(removed, 1);
        assert!(!photos[0].local_path.exists());
        assert!(photos[1].local_path.exists());
        assert_eq!(fixture.storage.photos_for_pin(pin.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_photos_rejects_foreign_ids() {
        let fixture = Fixture::new();
        let source = FakeSource::new(2, 1);
        let album = fixture.album(&source);
        let first = album.drop_pin(1.5, 1.5).unwrap();
        let second = album.drop_pin(2.5, 2.5).unwrap();
        let first_photos = album.open_album(first.id).await.unwrap();
        let second_photos = album.open_album(second.id).await.unwrap();

        let err = album
            .remove_photos(first.id, &[first_photos[0].id, second_photos[0].id])
            .unwrap_err();

        assert!(err.is_not_found());
        // Nothing was deleted
        assert_eq!(fixture.storage.photos_for_pin(first.id).unwrap().len(), 2);
    }

    #[test]
    fn test_unique_path() {
        let dir = Path::new("/photos/pin-1");
        let mut used = HashSet::new();

        assert_eq!(unique_path(dir, "a-1.jpg", &mut used), dir.join("a-1.jpg"));
        assert_eq!(unique_path(dir, "a-1.jpg", &mut used), dir.join("a-1-2.jpg"));
        assert_eq!(unique_path(dir, "a-1.jpg", &mut used), dir.join("a-1-3.jpg"));
        assert_eq!(unique_path(dir, "noext", &mut used), dir.join("noext"));
        assert_eq!(unique_path(dir, "noext", &mut used), dir.join("noext-2"));
    }

    #[tokio::test]
    async fn test_repeated_result_gets_its_own_file() {
        let fixture = Fixture::new();
        let source = FakeSource::new(2, 1).repeating_first();
        let album = fixture.album(&source);
        let pin = album.drop_pin(1.5, 1.5).unwrap();

        let photos = album.open_album(pin.id).await.unwrap();
        assert_eq!(photos.len(), 3);
        let paths: HashSet<_> = photos.iter().map(|p| p.local_path.clone()).collect();
        assert_eq!(paths.len(), 3);

        let repeated: Vec<&Photo> = photos
            .iter()
            .filter(|p| p.remote_url == "https://example.test/1/0.jpg")
            .collect();
        assert_eq!(repeated.len(), 2);
        album.remove_photos(pin.id, &[repeated[0].id]).unwrap();

        let survivor = fixture
            .storage
            .get_photo(repeated[1].id)
            .unwrap()
            .unwrap();
        assert!(survivor.downloaded);
        assert!(survivor.local_path.exists());
    }

    #[tokio::test]
    async fn test_remove_pin_removes_image_directory() {
        let fixture = Fixture::new();
        let source = FakeSource::new(2, 1);
        let album = fixture.album(&source);
        let pin = album.drop_pin(1.5, 1.5).unwrap();
        let photos = album.open_album(pin.id).await.unwrap();

        // An emptied album still leaves its directory behind
        let ids: Vec<i64> = photos.iter().map(|p| p.id).collect();
        album.remove_photos(pin.id, &ids).unwrap();
        assert!(album.pin_dir(pin.id).is_dir());

        assert!(album.remove_pin(pin.id).unwrap());
        assert!(!album.pin_dir(pin.id).exists());
        assert!(fixture.storage.get_pin(pin.id).unwrap().is_none());

        assert!(!album.remove_pin(pin.id).unwrap());
    }
}

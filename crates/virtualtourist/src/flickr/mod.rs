//! Photo-search client for the Flickr REST API.
//!
//! Given a coordinate and a result page, [`FlickrClient`] queries
//! `flickr.photos.search` for photos inside the surrounding whole-degree
//! bounding box and returns `(remote URL, suggested filename)` pairs.
//! Image bytes are fetched separately through the same [`PhotoSource`] trait
//! so callers can swap in a fake source.

pub mod query;
pub mod response;

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::FlickrConfig;
use crate::error::{Error, Result};
use crate::model::Coordinate;

pub use query::{BoundingBox, SearchQuery};
pub use response::{PhotoRef, SearchEnvelope, SearchResults};

/// User agent sent with every request.
const USER_AGENT: &str = concat!("virtualtourist/", env!("CARGO_PKG_VERSION"));

/// Something that can search for photos near a location and fetch image bytes.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Photos requested per result page.
    fn per_page(&self) -> u32;

    /// Search one page of photos around `coordinate`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid coordinates, failed requests, API
    /// failures, or when the search yields no photos.
    async fn search(&self, coordinate: Coordinate, page: u32) -> Result<SearchResults>;

    /// Download the bytes of one image.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server answers with a
    /// non-success status.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`PhotoSource`] backed by the Flickr REST API.
#[derive(Clone)]
pub struct FlickrClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    per_page: u32,
}

impl fmt::Debug for FlickrClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlickrClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("per_page", &self.per_page)
            .finish_non_exhaustive()
    }
}

impl FlickrClient {
    /// Build a client from configuration.
    ///
    /// A missing API key is allowed here and reported on the first search.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &FlickrConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            base_url: config.base_url.clone(),
            per_page: config.per_page,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(Error::MissingApiKey)
    }

    async fn get(&self, url: reqwest::Url) -> Result<reqwest::Response> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut url = url;
            url.set_query(None);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PhotoSource for FlickrClient {
    fn per_page(&self) -> u32 {
        self.per_page
    }

    async fn search(&self, coordinate: Coordinate, page: u32) -> Result<SearchResults> {
        let query = SearchQuery::new(coordinate, page, self.per_page)?;
        let url = query.url(&self.base_url, self.api_key()?)?;

        debug!(
            bbox = %query.bounding_box(),
            page = query.page,
            per_page = query.per_page,
            "Searching photos"
        );

        let body = self.get(url).await?.text().await?;
        let results = SearchEnvelope::parse(&body)?.into_results(coordinate)?;

        info!(
            "Found {} photos near {} (page {} of {}, {} total)",
            results.photos.len(),
            coordinate,
            results.page,
            results.pages,
            results.total
        );
        Ok(results)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| Error::malformed(format!("invalid image URL {url}: {e}")))?;
        let bytes = self.get(url).await?.bytes().await?;
        debug!("Fetched {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

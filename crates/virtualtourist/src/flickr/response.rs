//! Parsing of the `flickr.photos.search` JSON envelope.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::model::Coordinate;

/// Longest slug taken from a photo title.
const MAX_SLUG_LEN: usize = 48;

/// Top-level response object.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchEnvelope {
    /// `"ok"` or `"fail"`.
    pub stat: String,
    /// Present when `stat` is `"ok"`.
    pub photos: Option<PhotoPage>,
    /// Error code, present when `stat` is `"fail"`.
    pub code: Option<i64>,
    /// Error message, present when `stat` is `"fail"`.
    pub message: Option<String>,
}

/// The `photos` object of a successful response.
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoPage {
    /// Page number of this response.
    #[serde(deserialize_with = "lenient_u64")]
    pub page: u64,
    /// Total number of pages available.
    #[serde(deserialize_with = "lenient_u64")]
    pub pages: u64,
    /// Photos per page.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub perpage: u64,
    /// Total number of matching photos. The API sends this as a string.
    #[serde(deserialize_with = "lenient_u64")]
    pub total: u64,
    /// Photos on this page.
    #[serde(default)]
    pub photo: Vec<FlickrPhoto>,
}

/// One entry of `photos.photo`.
#[derive(Debug, Clone, Deserialize)]
pub struct FlickrPhoto {
    /// Flickr photo ID.
    pub id: String,
    /// Photo title, possibly empty.
    #[serde(default)]
    pub title: String,
    /// Medium-size image URL, present because `extras=url_m` was requested.
    pub url_m: Option<String>,
}

/// A remote image and where it should be saved locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoRef {
    /// Flickr photo ID.
    pub id: String,
    /// Photo title, possibly empty.
    pub title: String,
    /// Image URL.
    pub remote_url: String,
    /// Suggested file name, unique per search result.
    pub filename: String,
}

/// A decoded, non-empty search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    /// Page that was returned.
    pub page: u32,
    /// Total pages available for the location.
    pub pages: u32,
    /// Total photos available for the location.
    pub total: u64,
    /// Photos on this page that have a downloadable URL.
    pub photos: Vec<PhotoRef>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl SearchEnvelope {
    /// Parse a raw response body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the body is not a search envelope.
    pub fn parse(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Turn the envelope into usable results for `coordinate`.
    ///
    /// # Errors
    ///
    /// - [`Error::FlickrApi`] when the API reported a failure
    /// - [`Error::MalformedResponse`] when an `ok` response has no `photos`
    /// - [`Error::NoPhotosFound`] when nothing downloadable was returned
    ///
    /// A photo listed more than once on the page is kept once.
    pub fn into_results(self, coordinate: Coordinate) -> Result<SearchResults> {
        if self.stat != "ok" {
            return Err(Error::FlickrApi {
                code: self.code.unwrap_or(-1),
                message: self
                    .message
                    .unwrap_or_else(|| format!("request failed with stat '{}'", self.stat)),
            });
        }

        let page = self
            .photos
            .ok_or_else(|| Error::malformed("missing 'photos' object"))?;

        let no_photos = || Error::NoPhotosFound {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
        };

        if page.total == 0 {
            return Err(no_photos());
        }

        let mut seen = HashSet::new();
        let photos: Vec<PhotoRef> = page
            .photo
            .into_iter()
            .filter_map(|photo| {
                let remote_url = photo.url_m?;
                if !seen.insert(photo.id.clone()) {
                    return None;
                }
                let filename = suggested_filename(&photo.title, &photo.id, &remote_url);
                Some(PhotoRef {
                    id: photo.id,
                    title: photo.title,
                    remote_url,
                    filename,
                })
            })
            .collect();

        if photos.is_empty() {
            return Err(no_photos());
        }

        Ok(SearchResults {
            page: saturating_u32(page.page),
            pages: saturating_u32(page.pages),
            total: page.total,
            photos,
        })
    }
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn slug_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"))
}

/// Lowercased ASCII slug of `title`, or `untitled`.
#[must_use]
pub fn slugify(title: &str) -> String {
    let lowered = title.to_ascii_lowercase();
    let slug = slug_separator().replace_all(&lowered, "-");
    let mut slug: String = slug.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// `<slug>-<id>.<ext>`, with the extension taken from the URL path.
///
/// An ID with no usable characters is replaced by the URL's file stem, then by
/// `photo`.
#[must_use]
pub fn suggested_filename(title: &str, id: &str, remote_url: &str) -> String {
    let name = remote_url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or_default();
    let (stem, extension) = name.rsplit_once('.').unwrap_or((name, ""));

    let extension = extension.to_ascii_lowercase();
    let extension = if !extension.is_empty()
        && extension.len() <= 4
        && extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        extension
    } else {
        "jpg".to_string()
    };

    let token = [id, stem]
        .iter()
        .map(|raw| raw.chars().filter(char::is_ascii_alphanumeric).collect::<String>())
        .find(|token| !token.is_empty())
        .unwrap_or_else(|| "photo".to_string());

    format!("{}-{token}.{extension}", slugify(title))
}

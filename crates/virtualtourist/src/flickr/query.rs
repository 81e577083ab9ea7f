//! Query construction for `flickr.photos.search`.

use std::fmt;

use reqwest::Url;

use crate::error::{Error, Result};
use crate::model::{Coordinate, MAX_LATITUDE, MAX_LONGITUDE, MIN_LATITUDE, MIN_LONGITUDE};

/// API method name.
pub const SEARCH_METHOD: &str = "flickr.photos.search";

/// Response format.
pub const FORMAT: &str = "json";

/// Extra fields requested per photo (`url_m` is the medium-size image).
pub const EXTRAS: &str = "url_m";

/// A search box in degrees, serialized as `min_lon,min_lat,max_lon,max_lat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Western edge.
    pub min_longitude: f64,
    /// Southern edge.
    pub min_latitude: f64,
    /// Eastern edge.
    pub max_longitude: f64,
    /// Northern edge.
    pub max_latitude: f64,
}

impl BoundingBox {
    /// The whole-degree box containing `coordinate`.
    ///
    /// An integral component would give a zero-width edge, so the box is
    /// widened by one degree (downward when already at the upper bound).
    #[must_use]
    pub fn around(coordinate: Coordinate) -> Self {
        let (min_latitude, max_latitude) =
            whole_degrees(coordinate.latitude, MIN_LATITUDE, MAX_LATITUDE);
        let (min_longitude, max_longitude) =
            whole_degrees(coordinate.longitude, MIN_LONGITUDE, MAX_LONGITUDE);
        Self {
            min_longitude,
            min_latitude,
            max_longitude,
            max_latitude,
        }
    }

    /// Whether `coordinate` lies inside (or on the edge of) the box.
    #[must_use]
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&coordinate.latitude)
            && (self.min_longitude..=self.max_longitude).contains(&coordinate.longitude)
    }
}

fn whole_degrees(value: f64, lower: f64, upper: f64) -> (f64, f64) {
    let min = value.floor().max(lower);
    let max = value.ceil().min(upper);
    if min < max {
        (min, max)
    } else if max + 1.0 <= upper {
        (min, max + 1.0)
    } else {
        (min - 1.0, max)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_longitude, self.min_latitude, self.max_longitude, self.max_latitude
        )
    }
}

/// One page of a location search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchQuery {
    /// Location to search around.
    pub coordinate: Coordinate,
    /// 1-based result page.
    pub page: u32,
    /// Photos per page.
    pub per_page: u32,
}

impl SearchQuery {
    /// Build a query, validating the coordinate and clamping `page` to at least 1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCoordinate`] for out-of-range coordinates.
    pub fn new(coordinate: Coordinate, page: u32, per_page: u32) -> Result<Self> {
        Ok(Self {
            coordinate: coordinate.validate()?,
            page: page.max(1),
            per_page,
        })
    }

    /// The bounding box sent with this query.
    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::around(self.coordinate)
    }

    /// Query parameters, in a stable order.
    #[must_use]
    pub fn params(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("method", SEARCH_METHOD.to_string()),
            ("api_key", api_key.to_string()),
            ("format", FORMAT.to_string()),
            ("nojsoncallback", "1".to_string()),
            ("extras", EXTRAS.to_string()),
            ("bbox", self.bounding_box().to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", self.page.to_string()),
        ]
    }

    /// The full request URL against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL.
    pub fn url(&self, base_url: &str, api_key: &str) -> Result<Url> {
        Url::parse_with_params(base_url, self.params(api_key))
            .map_err(|e| Error::invalid_config(format!("invalid base_url {base_url}: {e}")))
    }
}

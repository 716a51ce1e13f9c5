//! Query normalisation and cache-key construction for house searches.
//!
//! Equivalent requests must map to the same cache key. Every builder here
//! works on normalised input, rounds coordinates so nearby viewports share an
//! entry, and formats numbers with Rust's locale-independent `Display`.

use serde::{Deserialize, Serialize};

/// Default and maximum page sizes.
pub const DEFAULT_PAGE_SIZE: i32 = 250;
pub const MAX_PAGE_SIZE: i32 = 1000;

/// Radius used when the caller sends none, and its bounds.
pub const DEFAULT_RADIUS_KM: f64 = 10.0;
pub const MIN_RADIUS_KM: f64 = 1.0;
pub const MAX_RADIUS_KM: f64 = 250.0;

/// A house pin on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseLocation {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
}

/// Search request as received from the map client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSearchRequest {
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,

    /// Optional centre for radius search. Both coordinates are required.
    #[serde(default)]
    pub center_lat: Option<f64>,
    #[serde(default)]
    pub center_lng: Option<f64>,
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,

    #[serde(default)]
    pub south: Option<f64>,
    #[serde(default)]
    pub west: Option<f64>,
    #[serde(default)]
    pub north: Option<f64>,
    #[serde(default)]
    pub east: Option<f64>,

    #[serde(default = "default_page_number")]
    pub page_number: i32,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
}

fn default_radius_km() -> f64 {
    DEFAULT_RADIUS_KM
}

fn default_page_number() -> i32 {
    1
}

fn default_page_size() -> i32 {
    DEFAULT_PAGE_SIZE
}

impl Default for MapSearchRequest {
    fn default() -> Self {
        Self {
            postal_code: None,
            city: None,
            state: None,
            center_lat: None,
            center_lng: None,
            radius_km: default_radius_km(),
            south: None,
            west: None,
            north: None,
            east: None,
            page_number: default_page_number(),
            page_size: default_page_size(),
        }
    }
}

impl MapSearchRequest {
    /// Radius search centre, when both coordinates are present.
    pub fn center(&self) -> Option<(f64, f64)> {
        Some((self.center_lat?, self.center_lng?))
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::normalize(self.page_number, self.page_size)
    }

    pub fn listing_filter(&self) -> ListingFilter {
        ListingFilter::normalize(
            self.postal_code.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
        )
    }
}

/// Normalised page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pagination {
    pub page_number: i32,
    pub page_size: i32,
}

impl Pagination {
    /// Page ≤ 0 becomes 1, size ≤ 0 becomes [`DEFAULT_PAGE_SIZE`], and size
    /// is capped at [`MAX_PAGE_SIZE`].
    pub fn normalize(page_number: i32, page_size: i32) -> Self {
        let page_number = if page_number <= 0 { 1 } else { page_number };
        let page_size = if page_size <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size.clamp(1, MAX_PAGE_SIZE)
        };
        Self {
            page_number,
            page_size,
        }
    }

    /// Rows to skip.
    pub fn offset(&self) -> i64 {
        (i64::from(self.page_number) - 1).max(0) * i64::from(self.page_size)
    }

    /// Rows to take.
    pub fn take(&self) -> i32 {
        self.page_size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::normalize(1, DEFAULT_PAGE_SIZE)
    }
}

/// Viewport in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }
}

/// Normalised free-text listing filters. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ListingFilter {
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl ListingFilter {
    pub fn normalize(postal_code: Option<&str>, city: Option<&str>, state: Option<&str>) -> Self {
        Self {
            postal_code: normalize_text(postal_code),
            city: normalize_text(city),
            state: normalize_text(state),
        }
    }
}

/// Trim and lower-case; blank input becomes `None`.
pub fn normalize_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Missing or non-positive radius becomes [`DEFAULT_RADIUS_KM`]; the result
/// is clamped to `[MIN_RADIUS_KM, MAX_RADIUS_KM]`.
pub fn normalize_radius_km(radius_km: f64) -> f64 {
    let radius = if radius_km.is_nan() || radius_km <= 0.0 {
        DEFAULT_RADIUS_KM
    } else {
        radius_km
    };
    radius.clamp(MIN_RADIUS_KM, MAX_RADIUS_KM)
}

/// Round to `decimals` places, folding `-0` into `0`.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Key for a viewport query. Coordinates are rounded to 3 decimals
/// (roughly 100 m).
pub fn bounds_key(bounds: &Bounds) -> String {
    format!(
        "bounds:{}:{}:{}:{}",
        round_to(bounds.south, 3),
        round_to(bounds.west, 3),
        round_to(bounds.north, 3),
        round_to(bounds.east, 3)
    )
}

/// Key for a radius query. The centre is rounded to 4 decimals and the
/// radius, already normalised, to 2.
pub fn radius_key(center_lat: f64, center_lng: f64, radius_km: f64, page: &Pagination) -> String {
    format!(
        "radius:{}:{}:{}:{}:{}",
        round_to(center_lat, 4),
        round_to(center_lng, 4),
        round_to(radius_km, 2),
        page.page_number,
        page.page_size
    )
}

/// Key for a filtered listing page.
pub fn listing_key(filter: &ListingFilter, page: &Pagination) -> String {
    format!(
        "list:pc={}:city={}:state={}:{}:{}",
        key_text(filter.postal_code.as_deref()),
        key_text(filter.city.as_deref()),
        key_text(filter.state.as_deref()),
        page.page_number,
        page.page_size
    )
}

// Length-prefixed so free text containing ':' can't collide with another
// combination of fields.
fn key_text(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("{}~{v}", v.len()),
        None => "*".to_string(),
    }
}

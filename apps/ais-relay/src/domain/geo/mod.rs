//! Geographic Types
//!
//! Coordinates and the rectangular regions used to scope the upstream
//! subscription. Both are validated at construction so an out-of-range
//! box can never reach the wire.
//!
//! # Wire Format
//!
//! A bounding box serializes as a pair of `[lat, lon]` corners:
//!
//! ```json
//! [[40.55, -74.30], [40.90, -73.60]]
//! ```

use serde::{Deserialize, Serialize};

/// Errors raised when constructing geographic values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    /// Latitude outside [-90, 90] or not finite.
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180] or not finite.
    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),
}

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 2]", try_from = "[f64; 2]")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Create a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns `GeoError` if either component is out of range or not finite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(coord: Coordinate) -> Self {
        [coord.latitude, coord.longitude]
    }
}

impl TryFrom<[f64; 2]> for Coordinate {
    type Error = GeoError;

    fn try_from([latitude, longitude]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(latitude, longitude)
    }
}

/// A rectangular region given by its south-west and north-east corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[Coordinate; 2]", from = "[Coordinate; 2]")]
pub struct BoundingBox {
    south_west: Coordinate,
    north_east: Coordinate,
}

impl BoundingBox {
    /// Create a bounding box from its corners.
    #[must_use]
    pub const fn new(south_west: Coordinate, north_east: Coordinate) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// New York harbor and approaches.
    #[must_use]
    pub const fn nyc_harbor() -> Self {
        Self {
            south_west: Coordinate {
                latitude: 40.55,
                longitude: -74.30,
            },
            north_east: Coordinate {
                latitude: 40.90,
                longitude: -73.60,
            },
        }
    }

    /// South-west corner.
    #[must_use]
    pub const fn south_west(&self) -> Coordinate {
        self.south_west
    }

    /// North-east corner.
    #[must_use]
    pub const fn north_east(&self) -> Coordinate {
        self.north_east
    }
}

impl From<BoundingBox> for [Coordinate; 2] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.south_west, bbox.north_east]
    }
}

impl From<[Coordinate; 2]> for BoundingBox {
    fn from([south_west, north_east]: [Coordinate; 2]) -> Self {
        Self::new(south_west, north_east)
    }
}

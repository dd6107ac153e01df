use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{NapulitaError, Result};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Reject non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(NapulitaError::invalid("coordinates must be finite numbers"));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(NapulitaError::invalid(format!(
                "latitude {} outside [-90, 90]",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(NapulitaError::invalid(format!(
                "longitude {} outside [-180, 180]",
                self.lon
            )));
        }
        Ok(())
    }

    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        haversine_distance_meters(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Axis-aligned lon/lat rectangle. Construction validates; nothing is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        GeoPoint::new(min_lat, min_lon).validate()?;
        GeoPoint::new(max_lat, max_lon).validate()?;
        if min_lon > max_lon {
            return Err(NapulitaError::invalid(format!(
                "minLon {min_lon} is greater than maxLon {max_lon}"
            )));
        }
        if min_lat > max_lat {
            return Err(NapulitaError::invalid(format!(
                "minLat {min_lat} is greater than maxLat {max_lat}"
            )));
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    pub fn world() -> Self {
        Self {
            min_lon: -180.0,
            min_lat: -90.0,
            max_lon: 180.0,
            max_lat: 90.0,
        }
    }

    /// Inclusive on all edges.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lon >= self.min_lon
            && point.lon <= self.max_lon
            && point.lat >= self.min_lat
            && point.lat <= self.max_lat
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = NapulitaError;

    /// Parses `minLon,minLat,maxLon,maxLat`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| NapulitaError::invalid(format!("unparseable bounding box: {s}")))?;
        match parts.as_slice() {
            [min_lon, min_lat, max_lon, max_lat] => {
                Self::new(*min_lon, *min_lat, *max_lon, *max_lat)
            }
            _ => Err(NapulitaError::invalid(format!(
                "bounding box needs 4 values, got {}",
                parts.len()
            ))),
        }
    }
}

/// Haversine distance between two lat/lon points in meters.
pub fn haversine_distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg * PI / 180.0;

    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);

    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_METERS * c
}

//! Geographic helpers

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both coordinates are finite and inside their valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance to another point
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self, other)
    }

    /// Point displaced by the given distances north and east.
    ///
    /// Uses the local flat-earth approximation, accurate to well under a metre
    /// over the few kilometres used for store neighbourhoods.
    pub fn offset_km(&self, north_km: f64, east_km: f64) -> GeoPoint {
        let dlat = north_km / EARTH_RADIUS_KM;
        let dlon = east_km / (EARTH_RADIUS_KM * self.lat.to_radians().cos());
        GeoPoint {
            lat: self.lat + dlat.to_degrees(),
            lon: self.lon + dlon.to_degrees(),
        }
    }
}

/// Haversine distance between two points in kilometres
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

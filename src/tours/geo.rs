use serde::Deserialize;

use crate::error::AppError;
use crate::tours::repo_types::Tour;
use crate::visibility::Stage;

const EARTH_RADIUS_KM: f64 = 6378.1;
const EARTH_RADIUS_MI: f64 = 3963.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Mi,
    Km,
}

impl Unit {
    fn earth_radius(self) -> f64 {
        match self {
            Unit::Mi => EARTH_RADIUS_MI,
            Unit::Km => EARTH_RADIUS_KM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Parses `"lat,lng"`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let bad = || AppError::validation("please provide latitude and longitude as lat,lng");
        let (lat, lng) = raw.split_once(',').ok_or_else(bad)?;
        let lat: f64 = lat.trim().parse().map_err(|_| bad())?;
        let lng: f64 = lng.trim().parse().map_err(|_| bad())?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(bad());
        }
        Ok(Self { lat, lng })
    }

    /// Great-circle distance in `unit`.
    pub fn distance_to(&self, other: GeoPoint, unit: Unit) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * a.sqrt().asin() * unit.earth_radius()
    }
}

pub fn start_of(tour: &Tour) -> GeoPoint {
    GeoPoint {
        lat: tour.start_lat,
        lng: tour.start_lng,
    }
}

/// Stages keeping tours starting within `radius` of `center`, nearest first.
/// Expects input already narrowed to visible tours.
pub fn within(center: GeoPoint, radius: f64, unit: Unit) -> [Stage<Tour>; 2] {
    [
        Stage::matching(move |t: &Tour| center.distance_to(start_of(t), unit) <= radius),
        Stage::sorted_by(move |a: &Tour, b: &Tour| {
            center
                .distance_to(start_of(a), unit)
                .total_cmp(&center.distance_to(start_of(b), unit))
        }),
    ]
}

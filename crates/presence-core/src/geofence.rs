use crate::error::{PresenceError, Result};
use crate::types::{Position, Site};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// ---------------------------------------------------------------------------
// GeoFenceOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoFenceOutcome {
    pub distance_meters: u32,
    pub radius_meters: u32,
    pub within_radius: bool,
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(PresenceError::InvalidCoordinates(format!(
            "latitude {latitude} outside [-90, 90]"
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(PresenceError::InvalidCoordinates(format!(
            "longitude {longitude} outside [-180, 180]"
        )));
    }
    Ok(())
}

/// Haversine distance between two coordinates, rounded to whole meters.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<u32> {
    validate_coordinates(lat1, lon1)?;
    validate_coordinates(lat2, lon2)?;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Clamp guards against a > 1 from rounding on near-antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();
    Ok((EARTH_RADIUS_METERS * c).round() as u32)
}

/// Decide whether `position` lies inside `site`'s geofence.
pub fn evaluate(position: &Position, site: &Site) -> Result<GeoFenceOutcome> {
    let distance = distance_meters(
        position.latitude,
        position.longitude,
        site.latitude,
        site.longitude,
    )?;
    Ok(GeoFenceOutcome {
        distance_meters: distance,
        radius_meters: site.radius_meters,
        within_radius: distance <= site.radius_meters,
    })
}

/// Human-readable distance: meters below one kilometer, otherwise km with
/// two decimals.
pub fn format_distance(meters: u32) -> String {
    if meters >= 1000 {
        format!("{:.2} km", f64::from(meters) / 1000.0)
    } else {
        format!("{meters} m")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

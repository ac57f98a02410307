use crate::error::AppError;
use crate::models::participant::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance between two points, rounded to two decimals.
pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> Result<f64, AppError> {
    validate(a)?;
    validate(b)?;

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    Ok(round2(EARTH_RADIUS_KM * central_angle))
}

/// Variant for optional-location contexts: absent or out-of-range
/// coordinates yield `None` instead of an error.
pub fn distance_km_safe(a: Option<&GeoPoint>, b: Option<&GeoPoint>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => distance_km(a, b).ok(),
        _ => None,
    }
}

/// Human-readable rendering: meters under 1 km, one decimal up to 10 km,
/// whole kilometers beyond.
pub fn display_distance(distance_km: f64) -> String {
    if distance_km < 1.0 {
        format!("{} m", (distance_km * 1000.0) as i64)
    } else if distance_km < 10.0 {
        format!("{distance_km:.1} km")
    } else {
        format!("{} km", distance_km as i64)
    }
}

pub fn validate(point: &GeoPoint) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&point.lat) {
        return Err(AppError::InvalidCoordinate(format!(
            "latitude {} out of range [-90, 90]",
            point.lat
        )));
    }
    if !(-180.0..=180.0).contains(&point.lng) {
        return Err(AppError::InvalidCoordinate(format!(
            "longitude {} out of range [-180, 180]",
            point.lng
        )));
    }
    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

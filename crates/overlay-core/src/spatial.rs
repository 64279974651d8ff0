//! Geodesic and polar-map math.
//!
//! All functions are pure. Angles are degrees true (0 = north, clockwise),
//! distances are nautical miles.

use crate::models::AircraftState;
use serde::{Deserialize, Serialize};

/// Mean earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Nautical miles per degree of latitude.
pub const NM_PER_DEG_LAT: f64 = 60.0;

/// Great-circle distance between two points in nautical miles (haversine).
pub fn distance_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_NM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Initial bearing from point 1 to point 2, normalized to [0, 360).
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    normalize_deg(x.atan2(y).to_degrees())
}

/// Wrap an angle into [0, 360).
pub fn normalize_deg(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in (-180, 180].
pub fn angle_diff_deg(from: f64, to: f64) -> f64 {
    let diff = normalize_deg(to - from);
    if diff > 180.0 {
        diff - 360.0
    } else {
        diff
    }
}

/// Destination point after travelling `distance_nm` along `bearing_deg`.
pub fn offset_by_bearing(lat: f64, lon: f64, distance_nm: f64, bearing_deg: f64) -> (f64, f64) {
    if distance_nm.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let bearing_rad = bearing_deg.to_radians();
    let angular_distance = distance_nm / EARTH_RADIUS_NM;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Flat-earth east/north offset of `target` from `origin` in nautical miles.
///
/// Accurate enough inside a single map range; use `distance_nm` for anything
/// that crosses more than a few degrees.
pub fn local_offset_nm(origin_lat: f64, origin_lon: f64, target_lat: f64, target_lon: f64) -> (f64, f64) {
    let north = (target_lat - origin_lat) * NM_PER_DEG_LAT;
    let mut dlon = target_lon - origin_lon;
    if dlon > 180.0 {
        dlon -= 360.0;
    } else if dlon < -180.0 {
        dlon += 360.0;
    }
    let east = dlon * NM_PER_DEG_LAT * origin_lat.to_radians().cos().abs().max(0.01);
    (east, north)
}

/// Inverse of [`local_offset_nm`].
pub fn apply_local_offset_nm(origin_lat: f64, origin_lon: f64, east_nm: f64, north_nm: f64) -> (f64, f64) {
    let lat = origin_lat + north_nm / NM_PER_DEG_LAT;
    let lon = origin_lon
        + east_nm / (NM_PER_DEG_LAT * origin_lat.to_radians().cos().abs().max(0.01));
    (lat, lon)
}

/// Resolve a position given as bearing (degrees true) and distance from an origin.
pub fn polar_to_lat_lon(origin_lat: f64, origin_lon: f64, bearing_deg: f64, distance_nm: f64) -> (f64, f64) {
    offset_by_bearing(origin_lat, origin_lon, distance_nm, bearing_deg)
}

/// Map orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    #[default]
    HeadingUp,
    NorthUp,
    TrackUp,
}

impl RotationMode {
    /// Angle (degrees true) that points to the top of the screen.
    pub fn rotation_deg(self, aircraft: &AircraftState) -> f64 {
        match self {
            RotationMode::NorthUp => 0.0,
            RotationMode::HeadingUp => normalize_deg(aircraft.heading_deg),
            RotationMode::TrackUp => normalize_deg(aircraft.track_deg),
        }
    }
}

/// Screen offset from the map origin in pixels; +x right, +y down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenOffset {
    pub dx: f64,
    pub dy: f64,
}

/// Project a target onto the rotated polar map centred on the origin.
pub fn project(
    origin_lat: f64,
    origin_lon: f64,
    target_lat: f64,
    target_lon: f64,
    rotation_deg: f64,
    pixels_per_nm: f64,
) -> ScreenOffset {
    let distance = distance_nm(origin_lat, origin_lon, target_lat, target_lon);
    if distance <= f64::EPSILON {
        return ScreenOffset { dx: 0.0, dy: 0.0 };
    }
    let bearing = bearing_deg(origin_lat, origin_lon, target_lat, target_lon);
    project_polar(bearing - rotation_deg, distance, pixels_per_nm)
}

/// Project a screen-relative bearing and distance.
pub fn project_polar(screen_bearing_deg: f64, distance_nm: f64, pixels_per_nm: f64) -> ScreenOffset {
    let angle = screen_bearing_deg.to_radians();
    let radius = distance_nm * pixels_per_nm;
    ScreenOffset {
        dx: radius * angle.sin(),
        dy: -radius * angle.cos(),
    }
}

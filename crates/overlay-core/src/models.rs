//! Core data models shared by every overlay layer.

use serde::{Deserialize, Serialize};

/// Ownship state sampled from the simulator once per update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AircraftState {
    pub lat: f64,
    pub lon: f64,
    pub altitude_ft: f64,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default)]
    pub track_deg: f64,
    #[serde(default)]
    pub vertical_speed_fpm: f64,
    #[serde(default)]
    pub ground_speed_kt: f64,
}

impl AircraftState {
    /// Create a state with only position and altitude; motion fields are zero.
    pub fn new(lat: f64, lon: f64, altitude_ft: f64) -> Self {
        Self {
            lat,
            lon,
            altitude_ft,
            heading_deg: 0.0,
            track_deg: 0.0,
            vertical_speed_fpm: 0.0,
            ground_speed_kt: 0.0,
        }
    }

    /// Set heading and track (degrees true).
    pub fn with_heading(mut self, heading_deg: f64, track_deg: f64) -> Self {
        self.heading_deg = heading_deg;
        self.track_deg = track_deg;
        self
    }

    /// Set ground speed and vertical speed.
    pub fn with_motion(mut self, ground_speed_kt: f64, vertical_speed_fpm: f64) -> Self {
        self.ground_speed_kt = ground_speed_kt;
        self.vertical_speed_fpm = vertical_speed_fpm;
        self
    }

    pub fn position_is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

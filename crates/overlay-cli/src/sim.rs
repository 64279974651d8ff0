//! Seeded ownship and traffic simulator feeding the overlay loop.

use overlay_core::spatial::{normalize_deg, offset_by_bearing};
use overlay_core::{AircraftState, TrafficObservation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Clone)]
struct SimTarget {
    id: String,
    callsign: String,
    lat: f64,
    lon: f64,
    altitude_ft: f64,
    heading_deg: f64,
    ground_speed_kt: f64,
    vertical_speed_fpm: f64,
}

/// Ownship flying a slowly wandering track with a ring of nearby traffic.
///
/// Identical seeds produce identical runs.
pub struct FlightSimulator {
    ownship: AircraftState,
    targets: Vec<SimTarget>,
    rng: StdRng,
    turn_rate_dps: f64,
    elapsed_secs: f64,
    /// Chance per report that a target is not heard from
    dropout: f64,
}

impl FlightSimulator {
    pub fn new(start: AircraftState, traffic_count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let targets = (0..traffic_count)
            .map(|i| {
                let bearing = rng.random_range(0.0..360.0);
                let distance = rng.random_range(1.0..15.0);
                let (lat, lon) = offset_by_bearing(start.lat, start.lon, distance, bearing);
                SimTarget {
                    id: format!("{:06X}", 0xA0_0000 + i),
                    callsign: format!("SIM{}", 100 + i),
                    lat,
                    lon,
                    altitude_ft: (start.altitude_ft + rng.random_range(-2500.0..2500.0)).max(500.0),
                    heading_deg: rng.random_range(0.0..360.0),
                    ground_speed_kt: rng.random_range(90.0..250.0),
                    vertical_speed_fpm: rng.random_range(-800.0..800.0),
                }
            })
            .collect();

        Self {
            ownship: start,
            targets,
            rng,
            turn_rate_dps: 0.0,
            elapsed_secs: 0.0,
            dropout: 0.05,
        }
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout.clamp(0.0, 1.0);
        self
    }

    pub fn ownship(&self) -> &AircraftState {
        &self.ownship
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    /// Advance the simulation and return the new ownship state.
    pub fn step(&mut self, dt_secs: f64) -> AircraftState {
        if !dt_secs.is_finite() || dt_secs <= 0.0 {
            return self.ownship;
        }
        self.elapsed_secs += dt_secs;

        // Occasionally pick a new gentle turn rate
        if self.rng.random_bool((dt_secs / 20.0).min(1.0)) {
            self.turn_rate_dps = self.rng.random_range(-1.5..1.5);
        }

        let own = &mut self.ownship;
        own.heading_deg = normalize_deg(own.heading_deg + self.turn_rate_dps * dt_secs);
        own.track_deg = own.heading_deg;
        let distance_nm = own.ground_speed_kt * dt_secs / SECONDS_PER_HOUR;
        let (lat, lon) = offset_by_bearing(own.lat, own.lon, distance_nm, own.track_deg);
        own.lat = lat;
        own.lon = lon;
        own.altitude_ft = (own.altitude_ft + own.vertical_speed_fpm * dt_secs / 60.0).max(0.0);
        if own.altitude_ft == 0.0 {
            own.vertical_speed_fpm = 0.0;
        }

        for target in &mut self.targets {
            let distance_nm = target.ground_speed_kt * dt_secs / SECONDS_PER_HOUR;
            let (lat, lon) = offset_by_bearing(target.lat, target.lon, distance_nm, target.heading_deg);
            target.lat = lat;
            target.lon = lon;
            target.altitude_ft = (target.altitude_ft + target.vertical_speed_fpm * dt_secs / 60.0).max(0.0);
        }

        self.ownship
    }

    /// Current traffic reports relative to the ownship altitude. Some targets
    /// may be silent on a given call.
    pub fn traffic(&mut self) -> Vec<TrafficObservation> {
        let own_alt = self.ownship.altitude_ft;
        let dropout = self.dropout;
        let mut observations = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            if dropout > 0.0 && self.rng.random_bool(dropout) {
                continue;
            }
            observations.push(
                TrafficObservation::absolute(
                    target.id.clone(),
                    target.lat,
                    target.lon,
                    target.altitude_ft - own_alt,
                )
                .with_motion(target.ground_speed_kt, target.heading_deg, target.vertical_speed_fpm)
                .with_callsign(target.callsign.clone()),
            );
        }
        observations
    }
}

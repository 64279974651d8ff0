//! One moving-map instance and the layers it owns.

use crate::error::Result;
use crate::models::AircraftState;
use crate::rules::OverlayRules;
use crate::spatial::{project, RotationMode, ScreenOffset};
use crate::taws::{AlertEvent, TawsEngine};
use crate::terrain::{TerrainCache, TerrainGrid};
use crate::traffic::{SweepReport, TrafficObservation, TrafficStore, TrafficThreat};
use crate::weather::WeatherDataEngine;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Result of one session update.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub grid: Arc<TerrainGrid>,
    pub alert: Option<AlertEvent>,
    pub sweep: SweepReport,
}

/// Layers of a single map display. Sessions share nothing, so several maps
/// can run side by side.
pub struct OverlaySession<H> {
    range_nm: f64,
    rotation: RotationMode,
    terrain: TerrainCache,
    taws: TawsEngine,
    traffic: TrafficStore,
    weather: WeatherDataEngine<H>,
    grid: Option<Arc<TerrainGrid>>,
}

impl<H> OverlaySession<H> {
    pub fn new(rules: OverlayRules) -> Result<Self> {
        Ok(Self {
            range_nm: rules.range_nm,
            rotation: RotationMode::default(),
            terrain: TerrainCache::new(rules.terrain)?,
            taws: TawsEngine::new(rules.taws),
            traffic: TrafficStore::new(rules.traffic),
            weather: WeatherDataEngine::new(rules.weather)?,
            grid: None,
        })
    }

    /// Refresh the terrain grid, age out traffic and evaluate TAWS.
    pub fn update(
        &mut self,
        aircraft: &AircraftState,
        baseline_ft: Option<f64>,
        now: DateTime<Utc>,
    ) -> UpdateOutcome {
        let grid = self.terrain.get_grid_with_baseline(
            aircraft.lat,
            aircraft.lon,
            self.range_nm,
            baseline_ft,
            now,
        );
        let sweep = self.traffic.sweep(now);
        let alert = self.taws.evaluate(aircraft, Some(&grid), now);
        self.grid = Some(Arc::clone(&grid));
        UpdateOutcome { grid, alert, sweep }
    }

    pub fn ingest_traffic<I>(&mut self, observations: I, now: DateTime<Utc>) -> SweepReport
    where
        I: IntoIterator<Item = TrafficObservation>,
    {
        self.traffic.upsert_batch(observations, now)
    }

    pub fn threats(&self, ownship: &AircraftState) -> Vec<TrafficThreat> {
        self.traffic.threats(ownship)
    }

    /// Screen position of a point relative to the aircraft under the current rotation.
    pub fn project(&self, aircraft: &AircraftState, lat: f64, lon: f64, pixels_per_nm: f64) -> ScreenOffset {
        project(
            aircraft.lat,
            aircraft.lon,
            lat,
            lon,
            self.rotation.rotation_deg(aircraft),
            pixels_per_nm,
        )
    }

    pub fn range_nm(&self) -> f64 {
        self.range_nm
    }

    /// Non-positive or non-finite ranges are ignored.
    pub fn set_range_nm(&mut self, range_nm: f64) {
        if range_nm.is_finite() && range_nm > 0.0 {
            self.range_nm = range_nm;
        }
    }

    pub fn rotation(&self) -> RotationMode {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: RotationMode) {
        self.rotation = rotation;
    }

    pub fn current_grid(&self) -> Option<&Arc<TerrainGrid>> {
        self.grid.as_ref()
    }

    pub fn terrain(&self) -> &TerrainCache {
        &self.terrain
    }

    pub fn terrain_mut(&mut self) -> &mut TerrainCache {
        &mut self.terrain
    }

    pub fn taws(&self) -> &TawsEngine {
        &self.taws
    }

    pub fn taws_mut(&mut self) -> &mut TawsEngine {
        &mut self.taws
    }

    pub fn traffic(&self) -> &TrafficStore {
        &self.traffic
    }

    pub fn weather(&self) -> &WeatherDataEngine<H> {
        &self.weather
    }

    pub fn weather_mut(&mut self) -> &mut WeatherDataEngine<H> {
        &mut self.weather
    }
}

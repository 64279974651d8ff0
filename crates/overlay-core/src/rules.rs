//! Thresholds and limits for the overlay layers.

use serde::{Deserialize, Serialize};

/// Terrain grid generation and cache limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainRules {
    /// Cells per side of the square grid
    pub grid_size: usize,
    /// Cached grids younger than this are reused (seconds)
    pub freshness_secs: f64,
    /// Maximum number of cached grids
    pub capacity: usize,
    /// Seed for the synthetic elevation model
    pub synthetic_seed: u64,
    /// Fraction of the synthetic relief applied on top of an external baseline
    pub perturbation_scale: f64,
    /// Baseline drift (ft) tolerated before a cached grid is regenerated
    pub baseline_tolerance_ft: f64,
}

impl Default for TerrainRules {
    fn default() -> Self {
        Self {
            grid_size: 32,
            freshness_secs: 5.0,
            capacity: 20,
            synthetic_seed: 0,
            perturbation_scale: 0.25,
            baseline_tolerance_ft: 50.0,
        }
    }
}

/// TAWS alerting envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TawsRules {
    /// Lookahead applied to vertical speed for the predicted clearance (seconds)
    pub lookahead_secs: f64,
    /// Forward sector radius (nm)
    pub forward_range_nm: f64,
    /// Forward sector half-angle either side of track (degrees)
    pub forward_half_angle_deg: f64,
    pub pull_up_predicted_ft: f64,
    pub pull_up_clearance_ft: f64,
    pub terrain_ahead_ft: f64,
    pub terrain_sink_fpm: f64,
    pub dont_sink_altitude_ft: f64,
    pub dont_sink_fpm: f64,
    pub dont_sink_clearance_ft: f64,
    pub too_low_clearance_ft: f64,
    pub too_low_ground_speed_kt: f64,
    /// Self-test duration (seconds)
    pub test_duration_secs: f64,
    /// Minimum time a level is held before a geometric downgrade (seconds)
    pub downgrade_hold_secs: f64,
}

impl Default for TawsRules {
    fn default() -> Self {
        Self {
            lookahead_secs: 10.0,
            forward_range_nm: 2.0,
            forward_half_angle_deg: 30.0,
            pull_up_predicted_ft: 100.0,
            pull_up_clearance_ft: 50.0,
            terrain_ahead_ft: 300.0,
            terrain_sink_fpm: -300.0,
            dont_sink_altitude_ft: 1000.0,
            dont_sink_fpm: -500.0,
            dont_sink_clearance_ft: 500.0,
            too_low_clearance_ft: 500.0,
            too_low_ground_speed_kt: 50.0,
            test_duration_secs: 5.0,
            downgrade_hold_secs: 2.0,
        }
    }
}

/// Traffic store limits and threat tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficRules {
    pub max_targets: usize,
    /// Targets not refreshed within this window are dropped (milliseconds)
    pub stale_ms: i64,
    pub ra: ThreatTier,
    pub ta: ThreatTier,
    pub proximate: ThreatTier,
    /// Default trend projection horizon (seconds)
    pub trend_horizon_secs: f64,
}

impl Default for TrafficRules {
    fn default() -> Self {
        Self {
            max_targets: 100,
            stale_ms: 30_000,
            ra: ThreatTier { max_distance_nm: 2.0, max_relative_altitude_ft: 600.0 },
            ta: ThreatTier { max_distance_nm: 6.0, max_relative_altitude_ft: 1200.0 },
            proximate: ThreatTier { max_distance_nm: 10.0, max_relative_altitude_ft: 1200.0 },
            trend_horizon_secs: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThreatTier {
    pub max_distance_nm: f64,
    pub max_relative_altitude_ft: f64,
}

impl ThreatTier {
    pub fn contains(&self, distance_nm: f64, relative_altitude_ft: f64) -> bool {
        distance_nm <= self.max_distance_nm
            && relative_altitude_ft.abs() <= self.max_relative_altitude_ft
    }
}

/// Weather layer limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherRules {
    /// Maximum cached radar tiles
    pub tile_capacity: usize,
    /// Radar tile edge in pixels used in tile URLs
    pub tile_size: u32,
    /// Stations further than this are not listed as nearby (nm)
    pub nearby_radius_nm: f64,
}

impl Default for WeatherRules {
    fn default() -> Self {
        Self {
            tile_capacity: 100,
            tile_size: 256,
            nearby_radius_nm: 50.0,
        }
    }
}

/// Everything a session needs to construct its layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayRules {
    /// Map range shown around the aircraft (nm)
    pub range_nm: f64,
    pub terrain: TerrainRules,
    pub taws: TawsRules,
    pub traffic: TrafficRules,
    pub weather: WeatherRules,
}

impl Default for OverlayRules {
    fn default() -> Self {
        Self {
            range_nm: 10.0,
            terrain: TerrainRules::default(),
            taws: TawsRules::default(),
            traffic: TrafficRules::default(),
            weather: WeatherRules::default(),
        }
    }
}

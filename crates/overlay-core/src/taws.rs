//! Terrain awareness alerting.
//!
//! The engine evaluates the aircraft against the current terrain grid on every
//! update but only reports level changes. Missing or unusable terrain data
//! always resolves to CLEAR.

use crate::error::OverlayError;
use crate::models::AircraftState;
use crate::rules::TawsRules;
use crate::spatial::{angle_diff_deg, local_offset_nm};
use crate::terrain::TerrainGrid;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cells this close to the aircraft count as ahead regardless of track.
const OVERHEAD_RADIUS_NM: f64 = 0.5;

/// Alert levels in ascending severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    #[default]
    Clear,
    TooLowTerrain,
    DontSink,
    Terrain,
    PullUp,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Clear => "CLEAR",
            AlertLevel::TooLowTerrain => "TOO_LOW_TERRAIN",
            AlertLevel::DontSink => "DONT_SINK",
            AlertLevel::Terrain => "TERRAIN",
            AlertLevel::PullUp => "PULL_UP",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            AlertLevel::Clear => "",
            AlertLevel::TooLowTerrain => "TOO LOW TERRAIN",
            AlertLevel::DontSink => "DON'T SINK",
            AlertLevel::Terrain => "TERRAIN",
            AlertLevel::PullUp => "PULL UP",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            AlertLevel::Clear => "#00FF00",
            AlertLevel::TooLowTerrain | AlertLevel::DontSink | AlertLevel::Terrain => "#FFBF00",
            AlertLevel::PullUp => "#FF0000",
        }
    }

    pub fn aural_cue(self) -> Option<&'static str> {
        match self {
            AlertLevel::Clear => None,
            AlertLevel::TooLowTerrain => Some("too low, terrain"),
            AlertLevel::DontSink => Some("don't sink"),
            AlertLevel::Terrain => Some("terrain, terrain"),
            AlertLevel::PullUp => Some("pull up, pull up"),
        }
    }

    pub fn is_alert(self) -> bool {
        self != AlertLevel::Clear
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLevel {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLEAR" => Ok(AlertLevel::Clear),
            "TOO_LOW_TERRAIN" => Ok(AlertLevel::TooLowTerrain),
            "DONT_SINK" => Ok(AlertLevel::DontSink),
            "TERRAIN" => Ok(AlertLevel::Terrain),
            "PULL_UP" => Ok(AlertLevel::PullUp),
            _ => Err(OverlayError::UnknownAlertLevel(s.to_string())),
        }
    }
}

/// Presentation of the current level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertState {
    pub level: AlertLevel,
    pub message: &'static str,
    pub color: &'static str,
    pub aural_cue: Option<&'static str>,
}

impl From<AlertLevel> for AlertState {
    fn from(level: AlertLevel) -> Self {
        Self {
            level,
            message: level.message(),
            color: level.color(),
            aural_cue: level.aural_cue(),
        }
    }
}

/// Emitted once per level transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub level: AlertLevel,
    pub previous: AlertLevel,
    pub message: &'static str,
    pub color: &'static str,
    pub aural_cue: Option<&'static str>,
    pub at: DateTime<Utc>,
}

/// Clearances computed from one grid evaluation (feet).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Clearance {
    /// Lowest clearance over the whole grid
    pub min_ft: f64,
    /// Lowest clearance in the forward sector
    pub min_ahead_ft: f64,
    /// Forward clearance after the vertical-speed lookahead
    pub predicted_ft: f64,
}

/// Clearances of the aircraft over the grid, or `None` when the grid or the
/// aircraft state cannot be used.
pub fn compute_clearance(
    aircraft: &AircraftState,
    grid: &TerrainGrid,
    rules: &TawsRules,
) -> Option<Clearance> {
    if !grid.is_well_formed()
        || !aircraft.position_is_valid()
        || !aircraft.altitude_ft.is_finite()
        || !aircraft.vertical_speed_fpm.is_finite()
    {
        return None;
    }

    let mut min_ft = f64::INFINITY;
    let mut min_ahead_ft = f64::INFINITY;

    for cell in grid.cells() {
        let clearance = aircraft.altitude_ft - cell.elevation_ft;
        min_ft = min_ft.min(clearance);

        let (east, north) = local_offset_nm(aircraft.lat, aircraft.lon, cell.lat, cell.lon);
        let distance = east.hypot(north);
        if distance > rules.forward_range_nm {
            continue;
        }
        let bearing = east.atan2(north).to_degrees();
        let off_track = angle_diff_deg(aircraft.track_deg, bearing).abs();
        if distance <= OVERHEAD_RADIUS_NM || off_track <= rules.forward_half_angle_deg {
            min_ahead_ft = min_ahead_ft.min(clearance);
        }
    }

    if !min_ft.is_finite() {
        return None;
    }
    // Aircraft outside the grid: fall back to the whole-grid minimum
    if !min_ahead_ft.is_finite() {
        min_ahead_ft = min_ft;
    }

    let predicted_ft =
        min_ahead_ft + (aircraft.vertical_speed_fpm / 60.0) * rules.lookahead_secs;

    Some(Clearance {
        min_ft,
        min_ahead_ft,
        predicted_ft,
    })
}

/// First matching level in priority order.
pub fn classify_alert(aircraft: &AircraftState, clearance: &Clearance, rules: &TawsRules) -> AlertLevel {
    let vs = aircraft.vertical_speed_fpm;

    if clearance.predicted_ft < rules.pull_up_predicted_ft
        || clearance.min_ft < rules.pull_up_clearance_ft
    {
        AlertLevel::PullUp
    } else if clearance.min_ahead_ft < rules.terrain_ahead_ft && vs < rules.terrain_sink_fpm {
        AlertLevel::Terrain
    } else if aircraft.altitude_ft < rules.dont_sink_altitude_ft
        && vs < rules.dont_sink_fpm
        && clearance.min_ft < rules.dont_sink_clearance_ft
    {
        AlertLevel::DontSink
    } else if clearance.min_ft < rules.too_low_clearance_ft
        && aircraft.ground_speed_kt > rules.too_low_ground_speed_kt
    {
        AlertLevel::TooLowTerrain
    } else {
        AlertLevel::Clear
    }
}

/// Edge-triggered TAWS state machine.
#[derive(Debug, Clone)]
pub struct TawsEngine {
    rules: TawsRules,
    enabled: bool,
    inhibited: bool,
    test_until: Option<DateTime<Utc>>,
    current: AlertLevel,
    level_since: Option<DateTime<Utc>>,
    /// Whether `current` came from terrain geometry (subject to hold-down)
    geometric: bool,
    last_clearance: Option<Clearance>,
}

impl Default for TawsEngine {
    fn default() -> Self {
        Self::new(TawsRules::default())
    }
}

impl TawsEngine {
    pub fn new(rules: TawsRules) -> Self {
        Self {
            rules,
            enabled: true,
            inhibited: false,
            test_until: None,
            current: AlertLevel::Clear,
            level_since: None,
            geometric: false,
            last_clearance: None,
        }
    }

    pub fn rules(&self) -> &TawsRules {
        &self.rules
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_inhibited(&mut self, inhibited: bool) {
        self.inhibited = inhibited;
    }

    pub fn is_inhibited(&self) -> bool {
        self.inhibited
    }

    /// Force PULL UP for the configured test window starting at `now`.
    pub fn start_self_test(&mut self, now: DateTime<Utc>) {
        let millis = (self.rules.test_duration_secs * 1000.0) as i64;
        self.test_until = Some(now + Duration::milliseconds(millis));
        tracing::info!("TAWS self-test started");
    }

    pub fn self_test_active(&self, now: DateTime<Utc>) -> bool {
        self.test_until.map(|until| now < until).unwrap_or(false)
    }

    pub fn current_level(&self) -> AlertLevel {
        self.current
    }

    pub fn state(&self) -> AlertState {
        AlertState::from(self.current)
    }

    pub fn last_clearance(&self) -> Option<Clearance> {
        self.last_clearance
    }

    /// Evaluate one update. Returns an event only when the level changes.
    pub fn evaluate(
        &mut self,
        aircraft: &AircraftState,
        grid: Option<&TerrainGrid>,
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        if self.test_until.is_some() && !self.self_test_active(now) {
            self.test_until = None;
            tracing::info!("TAWS self-test finished");
        }

        self.last_clearance = grid.and_then(|grid| compute_clearance(aircraft, grid, &self.rules));

        let (target, geometric) = if !self.enabled {
            (AlertLevel::Clear, false)
        } else if self.self_test_active(now) {
            (AlertLevel::PullUp, false)
        } else if self.inhibited {
            (AlertLevel::Clear, false)
        } else {
            match self.last_clearance {
                Some(clearance) => (classify_alert(aircraft, &clearance, &self.rules), true),
                None => (AlertLevel::Clear, false),
            }
        };

        let target = if geometric && self.geometric && target < self.current && self.within_hold(now) {
            self.current
        } else {
            target
        };

        self.transition(target, geometric, now)
    }

    fn within_hold(&self, now: DateTime<Utc>) -> bool {
        let hold_ms = (self.rules.downgrade_hold_secs * 1000.0) as i64;
        self.level_since
            .map(|since| (now - since).num_milliseconds() < hold_ms)
            .unwrap_or(false)
    }

    fn transition(&mut self, target: AlertLevel, geometric: bool, now: DateTime<Utc>) -> Option<AlertEvent> {
        if target == self.current {
            self.geometric = geometric;
            return None;
        }

        let previous = self.current;
        self.current = target;
        self.level_since = Some(now);
        self.geometric = geometric;

        if target.is_alert() {
            tracing::warn!("TAWS {} -> {}", previous, target);
        } else {
            tracing::info!("TAWS {} -> {}", previous, target);
        }

        Some(AlertEvent {
            level: target,
            previous,
            message: target.message(),
            color: target.color(),
            aural_cue: target.aural_cue(),
            at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_grid(lat: f64, lon: f64, elevation_ft: f64) -> TerrainGrid {
        TerrainGrid::from_elevations(lat, lon, 5.0, 10, &[elevation_ft; 100], Utc::now())
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(AlertLevel::Clear < AlertLevel::TooLowTerrain);
        assert!(AlertLevel::TooLowTerrain < AlertLevel::DontSink);
        assert!(AlertLevel::DontSink < AlertLevel::Terrain);
        assert!(AlertLevel::Terrain < AlertLevel::PullUp);
    }

    #[test]
    fn level_names_round_trip() {
        assert_eq!("pull_up".parse::<AlertLevel>().unwrap(), AlertLevel::PullUp);
        assert!("SINK_RATE".parse::<AlertLevel>().is_err());
        assert_eq!(AlertLevel::DontSink.to_string(), "DONT_SINK");
    }

    #[test]
    fn below_terrain_is_pull_up() {
        let mut engine = TawsEngine::default();
        let aircraft = AircraftState::new(39.0, -105.0, 500.0);
        let grid = flat_grid(39.0, -105.0, 550.0);
        let event = engine.evaluate(&aircraft, Some(&grid), Utc::now()).unwrap();
        assert_eq!(event.level, AlertLevel::PullUp);
        assert_eq!(event.previous, AlertLevel::Clear);
        assert_eq!(event.message, "PULL UP");
        assert_eq!(engine.last_clearance().unwrap().min_ft, -50.0);
    }

    #[test]
    fn predicted_clearance_uses_vertical_speed() {
        let rules = TawsRules::default();
        let aircraft = AircraftState::new(39.0, -105.0, 1500.0).with_motion(120.0, -6000.0);
        let grid = flat_grid(39.0, -105.0, 500.0);
        let clearance = compute_clearance(&aircraft, &grid, &rules).unwrap();
        assert_eq!(clearance.min_ahead_ft, 1000.0);
        assert_eq!(clearance.predicted_ft, 0.0);
        assert_eq!(classify_alert(&aircraft, &clearance, &rules), AlertLevel::PullUp);
    }

    #[test]
    fn priority_order_of_lower_levels() {
        let rules = TawsRules::default();
        let clearance = |min: f64, ahead: f64, vs: f64| Clearance {
            min_ft: min,
            min_ahead_ft: ahead,
            predicted_ft: ahead + vs / 6.0,
        };

        let sinking = AircraftState::new(0.0, 0.0, 2000.0).with_motion(100.0, -400.0);
        assert_eq!(
            classify_alert(&sinking, &clearance(250.0, 250.0 + 100.0, -400.0), &rules),
            AlertLevel::TooLowTerrain
        );
        assert_eq!(
            classify_alert(&sinking, &clearance(250.0, 280.0, -400.0), &rules),
            AlertLevel::Terrain
        );

        let low = AircraftState::new(0.0, 0.0, 900.0).with_motion(40.0, -600.0);
        assert_eq!(
            classify_alert(&low, &clearance(400.0, 400.0, -600.0), &rules),
            AlertLevel::DontSink
        );

        let cruising = AircraftState::new(0.0, 0.0, 9000.0).with_motion(250.0, 0.0);
        assert_eq!(
            classify_alert(&cruising, &clearance(3000.0, 3000.0, 0.0), &rules),
            AlertLevel::Clear
        );
    }

    #[test]
    fn only_transitions_are_emitted() {
        let mut engine = TawsEngine::default();
        let aircraft = AircraftState::new(39.0, -105.0, 500.0);
        let grid = flat_grid(39.0, -105.0, 550.0);
        let now = Utc::now();
        assert!(engine.evaluate(&aircraft, Some(&grid), now).is_some());
        assert!(engine.evaluate(&aircraft, Some(&grid), now).is_none());
        assert!(engine.evaluate(&aircraft, Some(&grid), now + Duration::seconds(1)).is_none());
    }

    #[test]
    fn inhibit_forces_clear() {
        let mut engine = TawsEngine::default();
        let aircraft = AircraftState::new(39.0, -105.0, 500.0);
        let grid = flat_grid(39.0, -105.0, 550.0);
        let now = Utc::now();
        engine.evaluate(&aircraft, Some(&grid), now);
        engine.set_inhibited(true);
        let event = engine.evaluate(&aircraft, Some(&grid), now).unwrap();
        assert_eq!(event.level, AlertLevel::Clear);
        assert_eq!(engine.state().color, "#00FF00");
    }

    #[test]
    fn missing_grid_fails_safe_to_clear() {
        let mut engine = TawsEngine::default();
        let aircraft = AircraftState::new(39.0, -105.0, 500.0);
        let grid = flat_grid(39.0, -105.0, 550.0);
        let now = Utc::now();
        engine.evaluate(&aircraft, Some(&grid), now);
        let event = engine.evaluate(&aircraft, None, now).unwrap();
        assert_eq!(event.level, AlertLevel::Clear);

        let empty = TerrainGrid::from_elevations(39.0, -105.0, 5.0, 10, &[], now);
        assert!(engine.evaluate(&aircraft, Some(&empty), now).is_none());
        assert_eq!(engine.current_level(), AlertLevel::Clear);
    }

    #[test]
    fn self_test_holds_pull_up_for_five_seconds() {
        let mut engine = TawsEngine::default();
        let aircraft = AircraftState::new(39.0, -105.0, 12000.0);
        let grid = flat_grid(39.0, -105.0, 100.0);
        let now = Utc::now();
        engine.start_self_test(now);
        let event = engine.evaluate(&aircraft, Some(&grid), now).unwrap();
        assert_eq!(event.level, AlertLevel::PullUp);
        assert!(engine.evaluate(&aircraft, Some(&grid), now + Duration::milliseconds(4900)).is_none());
        let event = engine
            .evaluate(&aircraft, Some(&grid), now + Duration::seconds(5))
            .unwrap();
        assert_eq!(event.level, AlertLevel::Clear);
        assert!(!engine.self_test_active(now + Duration::seconds(5)));
    }

    #[test]
    fn disabled_engine_stays_clear() {
        let mut engine = TawsEngine::default();
        engine.set_enabled(false);
        let aircraft = AircraftState::new(39.0, -105.0, 500.0);
        let grid = flat_grid(39.0, -105.0, 550.0);
        assert!(engine.evaluate(&aircraft, Some(&grid), Utc::now()).is_none());
        assert_eq!(engine.current_level(), AlertLevel::Clear);
    }

    #[test]
    fn downgrade_is_held_but_upgrade_is_immediate() {
        let mut engine = TawsEngine::default();
        let grid = flat_grid(39.0, -105.0, 1000.0);
        let now = Utc::now();

        let too_low = AircraftState::new(39.0, -105.0, 1300.0).with_motion(120.0, 0.0);
        assert_eq!(
            engine.evaluate(&too_low, Some(&grid), now).unwrap().level,
            AlertLevel::TooLowTerrain
        );

        let climbing = AircraftState::new(39.0, -105.0, 1600.0).with_motion(120.0, 500.0);
        assert!(engine
            .evaluate(&climbing, Some(&grid), now + Duration::milliseconds(500))
            .is_none());
        assert_eq!(engine.current_level(), AlertLevel::TooLowTerrain);

        let event = engine
            .evaluate(&climbing, Some(&grid), now + Duration::milliseconds(2500))
            .unwrap();
        assert_eq!(event.level, AlertLevel::Clear);

        let diving = AircraftState::new(39.0, -105.0, 1040.0).with_motion(120.0, -2000.0);
        let event = engine
            .evaluate(&diving, Some(&grid), now + Duration::milliseconds(2600))
            .unwrap();
        assert_eq!(event.level, AlertLevel::PullUp);
    }

    #[test]
    fn forward_sector_ignores_terrain_behind() {
        let rules = TawsRules::default();
        let now = Utc::now();
        // 3x3 grid, 1 nm cells: high ground only in the southern row
        let elevations = [
            100.0, 100.0, 100.0,
            100.0, 100.0, 100.0,
            4000.0, 4000.0, 4000.0,
        ];
        let grid = TerrainGrid::from_elevations(0.0, 0.0, 1.5, 3, &elevations, now);
        let northbound = AircraftState::new(0.0, 0.0, 5000.0)
            .with_heading(0.0, 0.0)
            .with_motion(150.0, 0.0);
        let clearance = compute_clearance(&northbound, &grid, &rules).unwrap();
        assert_eq!(clearance.min_ft, 1000.0);
        assert_eq!(clearance.min_ahead_ft, 4900.0);

        let southbound = northbound.with_heading(180.0, 180.0);
        let clearance = compute_clearance(&southbound, &grid, &rules).unwrap();
        assert_eq!(clearance.min_ahead_ft, 1000.0);
    }
}

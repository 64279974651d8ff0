//! Traffic target store and advisory threat classification.
//!
//! The store owns every target. Observations are merged by id and stamped
//! with the ingestion time; stale targets are swept and the store is held to
//! its capacity on every insert, evicting the least recently seen target.

use crate::models::AircraftState;
use crate::rules::TrafficRules;
use crate::spatial::{bearing_deg, distance_nm, normalize_deg, offset_by_bearing, polar_to_lat_lon};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Where a target is, either absolute or relative to ownship.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetPosition {
    Absolute { lat: f64, lon: f64 },
    /// Bearing is clockwise from ownship heading
    Relative { bearing_deg: f64, distance_nm: f64 },
}

impl TargetPosition {
    fn is_finite(&self) -> bool {
        match *self {
            TargetPosition::Absolute { lat, lon } => lat.is_finite() && lon.is_finite(),
            TargetPosition::Relative { bearing_deg, distance_nm } => {
                bearing_deg.is_finite() && distance_nm.is_finite() && distance_nm >= 0.0
            }
        }
    }

    /// Absolute position given the ownship state.
    pub fn resolve(&self, ownship: &AircraftState) -> (f64, f64) {
        match *self {
            TargetPosition::Absolute { lat, lon } => (lat, lon),
            TargetPosition::Relative { bearing_deg, distance_nm } => polar_to_lat_lon(
                ownship.lat,
                ownship.lon,
                normalize_deg(ownship.heading_deg + bearing_deg),
                distance_nm,
            ),
        }
    }

    /// (bearing true, distance nm) from ownship.
    pub fn polar(&self, ownship: &AircraftState) -> (f64, f64) {
        match *self {
            TargetPosition::Absolute { lat, lon } => (
                bearing_deg(ownship.lat, ownship.lon, lat, lon),
                distance_nm(ownship.lat, ownship.lon, lat, lon),
            ),
            TargetPosition::Relative { bearing_deg, distance_nm } => {
                (normalize_deg(ownship.heading_deg + bearing_deg), distance_nm)
            }
        }
    }
}

/// One traffic report as delivered by the ingestion source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficObservation {
    pub id: String,
    pub position: TargetPosition,
    pub relative_altitude_ft: f64,
    #[serde(default)]
    pub vertical_speed_fpm: f64,
    #[serde(default)]
    pub ground_speed_kt: f64,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default)]
    pub callsign: Option<String>,
}

impl TrafficObservation {
    pub fn absolute(id: impl Into<String>, lat: f64, lon: f64, relative_altitude_ft: f64) -> Self {
        Self::new(id, TargetPosition::Absolute { lat, lon }, relative_altitude_ft)
    }

    pub fn relative(
        id: impl Into<String>,
        bearing_deg: f64,
        distance_nm: f64,
        relative_altitude_ft: f64,
    ) -> Self {
        Self::new(
            id,
            TargetPosition::Relative { bearing_deg, distance_nm },
            relative_altitude_ft,
        )
    }

    fn new(id: impl Into<String>, position: TargetPosition, relative_altitude_ft: f64) -> Self {
        Self {
            id: id.into(),
            position,
            relative_altitude_ft,
            vertical_speed_fpm: 0.0,
            ground_speed_kt: 0.0,
            heading_deg: 0.0,
            callsign: None,
        }
    }

    /// Set ground speed, heading and vertical speed.
    pub fn with_motion(mut self, ground_speed_kt: f64, heading_deg: f64, vertical_speed_fpm: f64) -> Self {
        self.ground_speed_kt = ground_speed_kt;
        self.heading_deg = heading_deg;
        self.vertical_speed_fpm = vertical_speed_fpm;
        self
    }

    pub fn with_callsign(mut self, callsign: impl Into<String>) -> Self {
        self.callsign = Some(callsign.into());
        self
    }

    fn is_usable(&self) -> bool {
        !self.id.trim().is_empty()
            && self.position.is_finite()
            && self.relative_altitude_ft.is_finite()
            && self.vertical_speed_fpm.is_finite()
            && self.ground_speed_kt.is_finite()
            && self.heading_deg.is_finite()
    }
}

/// A tracked target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficTarget {
    pub id: String,
    pub position: TargetPosition,
    pub relative_altitude_ft: f64,
    pub vertical_speed_fpm: f64,
    pub ground_speed_kt: f64,
    pub heading_deg: f64,
    pub callsign: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(skip)]
    update_seq: u64,
}

impl TrafficTarget {
    fn from_observation(observation: TrafficObservation, now: DateTime<Utc>, seq: u64) -> Self {
        Self {
            id: observation.id,
            position: observation.position,
            relative_altitude_ft: observation.relative_altitude_ft,
            vertical_speed_fpm: observation.vertical_speed_fpm,
            ground_speed_kt: observation.ground_speed_kt,
            heading_deg: observation.heading_deg,
            callsign: observation.callsign,
            first_seen: now,
            last_seen: now,
            update_seq: seq,
        }
    }

    fn update(&mut self, observation: TrafficObservation, now: DateTime<Utc>, seq: u64) {
        self.position = observation.position;
        self.relative_altitude_ft = observation.relative_altitude_ft;
        self.vertical_speed_fpm = observation.vertical_speed_fpm;
        self.ground_speed_kt = observation.ground_speed_kt;
        self.heading_deg = observation.heading_deg;
        if observation.callsign.is_some() {
            self.callsign = observation.callsign;
        }
        self.last_seen = now;
        self.update_seq = seq;
    }

    /// True once more than `stale_ms` has passed since the last report,
    /// compared at full clock precision.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_ms: i64) -> bool {
        now - self.last_seen > Duration::milliseconds(stale_ms)
    }

    fn eviction_key(&self) -> (DateTime<Utc>, u64) {
        (self.last_seen, self.update_seq)
    }
}

/// Advisory tiers in ascending severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThreatLevel {
    #[serde(rename = "OTHER")]
    Other,
    #[serde(rename = "PROXIMATE")]
    Proximate,
    #[serde(rename = "TA")]
    TrafficAdvisory,
    #[serde(rename = "RA")]
    ResolutionAdvisory,
}

/// Tier for a target at the given distance and relative altitude.
pub fn classify_threat(distance_nm: f64, relative_altitude_ft: f64, rules: &TrafficRules) -> ThreatLevel {
    if !distance_nm.is_finite() || !relative_altitude_ft.is_finite() {
        return ThreatLevel::Other;
    }
    if rules.ra.contains(distance_nm, relative_altitude_ft) {
        ThreatLevel::ResolutionAdvisory
    } else if rules.ta.contains(distance_nm, relative_altitude_ft) {
        ThreatLevel::TrafficAdvisory
    } else if rules.proximate.contains(distance_nm, relative_altitude_ft) {
        ThreatLevel::Proximate
    } else {
        ThreatLevel::Other
    }
}

/// Straight-line extrapolation of a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendProjection {
    pub horizon_secs: f64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub end_relative_altitude_ft: f64,
}

/// Project the target `horizon_secs` ahead along its heading at ground speed.
pub fn trend(target: &TrafficTarget, ownship: &AircraftState, horizon_secs: f64) -> TrendProjection {
    let (start_lat, start_lon) = target.position.resolve(ownship);
    let travelled_nm = target.ground_speed_kt.max(0.0) * horizon_secs / 3600.0;
    let (end_lat, end_lon) =
        offset_by_bearing(start_lat, start_lon, travelled_nm, normalize_deg(target.heading_deg));
    TrendProjection {
        horizon_secs,
        start_lat,
        start_lon,
        end_lat,
        end_lon,
        end_relative_altitude_ft: target.relative_altitude_ft
            + target.vertical_speed_fpm * horizon_secs / 60.0,
    }
}

/// A target with its current classification.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficThreat {
    pub id: String,
    pub level: ThreatLevel,
    pub distance_nm: f64,
    pub bearing_deg: f64,
    pub relative_altitude_ft: f64,
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub stale_removed: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone)]
pub struct TrafficStore {
    rules: TrafficRules,
    targets: HashMap<String, TrafficTarget>,
    next_seq: u64,
}

impl Default for TrafficStore {
    fn default() -> Self {
        Self::new(TrafficRules::default())
    }
}

impl TrafficStore {
    pub fn new(rules: TrafficRules) -> Self {
        Self {
            targets: HashMap::with_capacity(rules.max_targets.saturating_add(1)),
            rules,
            next_seq: 0,
        }
    }

    pub fn rules(&self) -> &TrafficRules {
        &self.rules
    }

    /// Merge a batch of observations stamped at `now`, then sweep.
    pub fn upsert_batch<I>(&mut self, observations: I, now: DateTime<Utc>) -> SweepReport
    where
        I: IntoIterator<Item = TrafficObservation>,
    {
        let mut evicted = 0;
        for observation in observations {
            evicted += self.upsert(observation, now);
        }
        let mut report = self.sweep(now);
        report.evicted += evicted;
        report
    }

    /// Merge one observation. Returns the number of targets evicted to stay
    /// within capacity.
    pub fn upsert(&mut self, observation: TrafficObservation, now: DateTime<Utc>) -> usize {
        if !observation.is_usable() {
            tracing::debug!("Dropping unusable traffic observation {:?}", observation.id);
            return 0;
        }
        let seq = self.next_seq;
        self.next_seq += 1;

        match self.targets.get_mut(&observation.id) {
            Some(target) => target.update(observation, now, seq),
            None => {
                let target = TrafficTarget::from_observation(observation, now, seq);
                self.targets.insert(target.id.clone(), target);
            }
        }
        self.enforce_capacity()
    }

    /// Drop stale targets, then evict least recently seen ones above capacity.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        let stale_ms = self.rules.stale_ms;
        let before = self.targets.len();
        self.targets.retain(|_, target| !target.is_stale(now, stale_ms));
        let stale_removed = before - self.targets.len();
        let evicted = self.enforce_capacity();
        if stale_removed > 0 || evicted > 0 {
            tracing::debug!(
                "Traffic sweep removed {} stale, evicted {}, {} remain",
                stale_removed,
                evicted,
                self.targets.len()
            );
        }
        SweepReport {
            stale_removed,
            evicted,
        }
    }

    fn enforce_capacity(&mut self) -> usize {
        let mut evicted = 0;
        while self.targets.len() > self.rules.max_targets {
            let Some(oldest) = self
                .targets
                .values()
                .min_by_key(|target| target.eviction_key())
                .map(|target| target.id.clone())
            else {
                break;
            };
            self.targets.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    pub fn get(&self, id: &str) -> Option<&TrafficTarget> {
        self.targets.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<TrafficTarget> {
        self.targets.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrafficTarget> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn classify(&self, target: &TrafficTarget, ownship: &AircraftState) -> ThreatLevel {
        let (_, distance) = target.position.polar(ownship);
        classify_threat(distance, target.relative_altitude_ft, &self.rules)
    }

    pub fn trend(&self, target: &TrafficTarget, ownship: &AircraftState) -> TrendProjection {
        trend(target, ownship, self.rules.trend_horizon_secs)
    }

    /// Every target classified, most severe first, then nearest first.
    pub fn threats(&self, ownship: &AircraftState) -> Vec<TrafficThreat> {
        let mut threats: Vec<TrafficThreat> = self
            .targets
            .values()
            .map(|target| {
                let (bearing, distance) = target.position.polar(ownship);
                TrafficThreat {
                    id: target.id.clone(),
                    level: classify_threat(distance, target.relative_altitude_ft, &self.rules),
                    distance_nm: distance,
                    bearing_deg: bearing,
                    relative_altitude_ft: target.relative_altitude_ft,
                }
            })
            .collect();
        threats.sort_by(|a, b| {
            b.level.cmp(&a.level).then_with(|| {
                a.distance_nm
                    .partial_cmp(&b.distance_nm)
                    .unwrap_or(Ordering::Equal)
            })
        });
        threats
    }
}

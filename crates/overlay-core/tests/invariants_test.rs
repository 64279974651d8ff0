//! Property tests for the bounded stores and classifiers.

use chrono::{DateTime, Duration, TimeZone, Utc};
use overlay_core::rules::{TerrainRules, TrafficRules};
use overlay_core::weather::category::classify_flight_category;
use overlay_core::{
    classify_threat, parse_metar, AircraftState, AlertLevel, FlightCategory, TawsEngine,
    TerrainCache, TileCache, TrafficObservation, TrafficStore,
};
use proptest::prelude::*;
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
}

fn observation_strategy() -> impl Strategy<Value = (u16, f64, f64, f64, i64)> {
    (
        0u16..400,
        0.0f64..360.0,
        0.0f64..20.0,
        -3000.0f64..3000.0,
        0i64..90_000,
    )
}

proptest! {
    /// Property: the store never exceeds its capacity, whatever the churn.
    #[test]
    fn prop_store_bounded_after_sweep(batch in prop::collection::vec(observation_strategy(), 0..600)) {
        let rules = TrafficRules::default();
        let max = rules.max_targets;
        let mut store = TrafficStore::new(rules);
        for (id, bearing, distance, rel_alt, offset_ms) in batch {
            let now = t0() + Duration::milliseconds(offset_ms);
            store.upsert(TrafficObservation::relative(format!("T{id}"), bearing, distance, rel_alt), now);
            prop_assert!(store.len() <= max);
        }
        store.sweep(t0() + Duration::milliseconds(90_000));
        prop_assert!(store.len() <= max);
    }

    /// Property: nothing older than the stale window survives a sweep.
    #[test]
    fn prop_sweep_drops_stale_targets(
        batch in prop::collection::vec(observation_strategy(), 1..200),
        sweep_at in 0i64..120_000,
        sweep_us in 0i64..1000,
    ) {
        let rules = TrafficRules::default();
        let stale_ms = rules.stale_ms;
        let mut store = TrafficStore::new(rules);
        for (id, bearing, distance, rel_alt, offset_ms) in batch {
            let now = t0() + Duration::milliseconds(offset_ms);
            store.upsert(TrafficObservation::relative(format!("T{id}"), bearing, distance, rel_alt), now);
        }
        let now = t0() + Duration::milliseconds(sweep_at) + Duration::microseconds(sweep_us);
        store.sweep(now);
        for target in store.iter() {
            prop_assert!(now - target.last_seen <= Duration::milliseconds(stale_ms));
        }
    }

    /// Property: threat severity never drops as a target closes in.
    #[test]
    fn prop_classification_monotonic(
        distance in 0.0f64..15.0,
        closer in 0.0f64..1.0,
        rel_alt in -2000.0f64..2000.0,
        lower in 0.0f64..1.0,
    ) {
        let rules = TrafficRules::default();
        let base = classify_threat(distance, rel_alt, &rules);
        prop_assert!(classify_threat(distance * closer, rel_alt, &rules) >= base);
        prop_assert!(classify_threat(distance, rel_alt * lower, &rules) >= base);
    }

    /// Property: the tile cache holds at most its capacity and evicts one tile at a time.
    #[test]
    fn prop_tile_cache_bounded(urls in prop::collection::vec(0u32..300, 0..400)) {
        let mut cache = TileCache::new(100).unwrap();
        for url in urls {
            let before = cache.len();
            let key = format!("https://tiles.example.com/{url}.png");
            let existed = cache.contains(&key);
            let evicted = cache.insert(key, url);
            prop_assert!(cache.len() <= 100);
            if evicted.is_some() {
                prop_assert!(!existed);
                prop_assert_eq!(before, 100);
            }
        }
    }

    /// Property: identical requests inside the freshness window share one grid.
    #[test]
    fn prop_grid_reused_within_freshness(
        lat in -60.0f64..60.0,
        lon in -179.0f64..179.0,
        range in 1.0f64..80.0,
        delay_ms in 0i64..4_999,
    ) {
        let mut cache = TerrainCache::new(TerrainRules { grid_size: 8, ..TerrainRules::default() }).unwrap();
        let first = cache.get_grid(lat, lon, range, t0());
        let second = cache.get_grid(lat, lon, range, t0() + Duration::milliseconds(delay_ms));
        prop_assert!(Arc::ptr_eq(&first, &second));
        prop_assert!(first.cells().iter().all(|cell| cell.elevation_ft >= 0.0));
    }

    /// Property: the parser never panics and always yields a category.
    #[test]
    fn prop_parser_total(raw in "[A-Z0-9/ +-]{0,80}") {
        let record = parse_metar(&raw);
        let expected = classify_flight_category(record.ceiling_ft(), record.visibility_sm());
        prop_assert_eq!(record.category, expected);
    }
}

#[test]
fn sweep_uses_full_clock_precision() {
    let mut store = TrafficStore::new(TrafficRules::default());
    store.upsert(TrafficObservation::relative("OLD", 0.0, 4.0, 0.0), t0());
    store.upsert(TrafficObservation::relative("EDGE", 0.0, 4.0, 0.0), t0() + Duration::microseconds(900));

    store.sweep(t0() + Duration::microseconds(30_000_900));
    assert!(store.get("OLD").is_none());
    assert!(store.get("EDGE").is_some());
}

#[test]
fn reference_report_decodes() {
    let record = parse_metar("KDEN 121053Z 18010KT 10SM FEW250 22/08 A3005");
    let wind = record.wind.unwrap();
    assert_eq!(wind.direction_deg, Some(180));
    assert_eq!(wind.speed_kt, 10);
    assert_eq!(record.visibility.unwrap().value, "10");
    assert_eq!(record.temp_c, Some(22));
    assert_eq!(record.dewpoint_c, Some(8));
    assert_eq!(record.altimeter.unwrap().value, "30.05");
    assert_eq!(record.category, FlightCategory::Vfr);
}

#[test]
fn ceiling_boundary_between_lifr_and_ifr() {
    assert_eq!(classify_flight_category(Some(499), None), FlightCategory::Lifr);
    assert_eq!(classify_flight_category(Some(500), None), FlightCategory::Ifr);
}

#[test]
fn inhibited_taws_stays_clear_over_terrain() {
    let mut cache = TerrainCache::new(TerrainRules::default()).unwrap();
    let mut taws = TawsEngine::default();
    taws.set_inhibited(true);
    let aircraft = AircraftState::new(39.6, -105.9, 0.0)
        .with_heading(270.0, 270.0)
        .with_motion(180.0, -3000.0);
    let grid = cache.get_grid(aircraft.lat, aircraft.lon, 10.0, t0());
    assert!(taws.evaluate(&aircraft, Some(&grid), t0()).is_none());
    assert_eq!(taws.current_level(), AlertLevel::Clear);
}

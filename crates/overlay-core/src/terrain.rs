//! Terrain elevation grids and their cache.
//!
//! Grids are keyed by position quantized to roughly one nautical mile plus the
//! map range. Without a real elevation model the grid is synthesized from a
//! deterministic multi-frequency relief function, so the same key and seed
//! always produce the same elevations.

use crate::bounded::BoundedMap;
use crate::error::Result;
use crate::rules::TerrainRules;
use crate::spatial::{apply_local_offset_nm, NM_PER_DEG_LAT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Centre value of the synthetic relief; baseline mode perturbs around it.
const SYNTHETIC_MEAN_FT: f64 = 1500.0;

/// Cache key: quantized centre (1/60 degree steps) and range in 0.1 nm steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridKey {
    pub lat_q: i32,
    pub lon_q: i32,
    pub range_dnm: u32,
}

impl GridKey {
    pub fn new(lat: f64, lon: f64, range_nm: f64) -> Self {
        Self {
            lat_q: (lat * NM_PER_DEG_LAT).round() as i32,
            lon_q: (lon * NM_PER_DEG_LAT).round() as i32,
            range_dnm: (range_nm.max(0.1) * 10.0).round() as u32,
        }
    }

    /// Centre of the quantized cell in degrees.
    pub fn center(&self) -> (f64, f64) {
        (
            self.lat_q as f64 / NM_PER_DEG_LAT,
            self.lon_q as f64 / NM_PER_DEG_LAT,
        )
    }

    pub fn range_nm(&self) -> f64 {
        self.range_dnm as f64 / 10.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainCell {
    pub lat: f64,
    pub lon: f64,
    pub elevation_ft: f64,
    /// (east, north) offset from the grid centre in nm
    pub offset_nm: (f64, f64),
}

/// Where a grid's elevations came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElevationSource {
    /// Purely synthetic relief
    Synthetic,
    /// Synthetic relief applied as a perturbation around an external ground elevation.
    /// An approximation, not a literal elevation model.
    Baseline { baseline_ft: f64 },
    /// Supplied by the host
    External,
}

/// Square elevation grid, row 0 at the northern edge, row-major.
#[derive(Debug, Clone, Serialize)]
pub struct TerrainGrid {
    pub key: GridKey,
    pub size: usize,
    pub range_nm: f64,
    pub generated_at: DateTime<Utc>,
    pub source: ElevationSource,
    cells: Vec<TerrainCell>,
}

impl TerrainGrid {
    /// Synthesize a grid for `key`.
    pub fn synthetic(key: GridKey, size: usize, seed: u64, now: DateTime<Utc>) -> Self {
        Self::build(key, size, now, ElevationSource::Synthetic, |lat, lon| {
            synthetic_elevation_ft(lat, lon, seed)
        })
    }

    /// Synthesize a grid as a perturbation of an external ground elevation.
    pub fn with_baseline(
        key: GridKey,
        size: usize,
        seed: u64,
        baseline_ft: f64,
        scale: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self::build(key, size, now, ElevationSource::Baseline { baseline_ft }, |lat, lon| {
            let relief = synthetic_elevation_ft(lat, lon, seed) - SYNTHETIC_MEAN_FT;
            (baseline_ft + relief * scale).max(0.0)
        })
    }

    /// Wrap host-supplied elevations (row-major, northern row first).
    ///
    /// A length other than `size * size` yields a grid that reports
    /// `is_well_formed() == false`.
    pub fn from_elevations(
        center_lat: f64,
        center_lon: f64,
        range_nm: f64,
        size: usize,
        elevations_ft: &[f64],
        now: DateTime<Utc>,
    ) -> Self {
        let key = GridKey::new(center_lat, center_lon, range_nm);
        let step = cell_step_nm(range_nm, size);
        let mut cells = Vec::with_capacity(elevations_ft.len());
        for (idx, elevation) in elevations_ft.iter().enumerate() {
            let row = idx / size.max(1);
            let col = idx % size.max(1);
            let east = -range_nm + (col as f64 + 0.5) * step;
            let north = range_nm - (row as f64 + 0.5) * step;
            let (lat, lon) = apply_local_offset_nm(center_lat, center_lon, east, north);
            cells.push(TerrainCell {
                lat,
                lon,
                elevation_ft: if elevation.is_finite() { *elevation } else { 0.0 },
                offset_nm: (east, north),
            });
        }
        Self {
            key,
            size,
            range_nm,
            generated_at: now,
            source: ElevationSource::External,
            cells,
        }
    }

    /// Grid with no cells, returned for unusable positions.
    pub fn empty(key: GridKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            size: 0,
            range_nm: key.range_nm(),
            generated_at: now,
            source: ElevationSource::Synthetic,
            cells: Vec::new(),
        }
    }

    fn build<F>(key: GridKey, size: usize, now: DateTime<Utc>, source: ElevationSource, elevation: F) -> Self
    where
        F: Fn(f64, f64) -> f64,
    {
        let range_nm = key.range_nm();
        let (center_lat, center_lon) = key.center();
        let step = cell_step_nm(range_nm, size);
        let mut cells = Vec::with_capacity(size * size);

        for row in 0..size {
            let north = range_nm - (row as f64 + 0.5) * step;
            for col in 0..size {
                let east = -range_nm + (col as f64 + 0.5) * step;
                let (lat, lon) = apply_local_offset_nm(center_lat, center_lon, east, north);
                cells.push(TerrainCell {
                    lat,
                    lon,
                    elevation_ft: elevation(lat, lon),
                    offset_nm: (east, north),
                });
            }
        }

        Self {
            key,
            size,
            range_nm,
            generated_at: now,
            source,
            cells,
        }
    }

    pub fn cells(&self) -> &[TerrainCell] {
        &self.cells
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&TerrainCell> {
        if row >= self.size || col >= self.size {
            return None;
        }
        self.cells.get(row * self.size + col)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell count matches the declared size and every elevation is finite.
    pub fn is_well_formed(&self) -> bool {
        self.size > 0
            && self.cells.len() == self.size * self.size
            && self.cells.iter().all(|cell| cell.elevation_ft.is_finite())
    }

    pub fn min_elevation_ft(&self) -> Option<f64> {
        self.cells.iter().map(|c| c.elevation_ft).reduce(f64::min)
    }

    pub fn max_elevation_ft(&self) -> Option<f64> {
        self.cells.iter().map(|c| c.elevation_ft).reduce(f64::max)
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.generated_at).num_milliseconds() as f64 / 1000.0
    }

    /// Display band for every cell at the given aircraft altitude.
    pub fn bands(&self, altitude_ft: f64) -> Vec<TerrainBand> {
        self.cells
            .iter()
            .map(|cell| TerrainBand::for_clearance(altitude_ft - cell.elevation_ft))
            .collect()
    }
}

fn cell_step_nm(range_nm: f64, size: usize) -> f64 {
    if size == 0 {
        return 0.0;
    }
    2.0 * range_nm / size as f64
}

/// Terrain display colouring relative to the aircraft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerrainBand {
    None,
    Green,
    Yellow,
    Red,
}

impl TerrainBand {
    pub fn for_clearance(clearance_ft: f64) -> Self {
        if clearance_ft < 100.0 {
            TerrainBand::Red
        } else if clearance_ft < 1000.0 {
            TerrainBand::Yellow
        } else if clearance_ft < 2000.0 {
            TerrainBand::Green
        } else {
            TerrainBand::None
        }
    }
}

/// Deterministic, non-negative relief: broad ridges, medium hills and local texture.
pub fn synthetic_elevation_ft(lat: f64, lon: f64, seed: u64) -> f64 {
    let phase = seed_phase(seed);
    let ridges = (lat * 4.0 + phase).sin() * (lon * 3.0 - phase).cos() * 2500.0;
    let hills = (lat * 23.0 + phase * 2.0).sin() * (lon * 19.0).sin() * 900.0;
    let local = (lat * 131.0 + lon * 113.0 + phase * 3.0).sin() * 150.0;
    (SYNTHETIC_MEAN_FT + ridges + hills + local).max(0.0)
}

fn seed_phase(seed: u64) -> f64 {
    if seed == 0 {
        return 0.0;
    }
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    (mixed >> 11) as f64 / (1u64 << 53) as f64 * std::f64::consts::TAU
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded cache of terrain grids.
#[derive(Debug)]
pub struct TerrainCache {
    rules: TerrainRules,
    entries: BoundedMap<GridKey, Arc<TerrainGrid>>,
    stats: CacheStats,
}

impl TerrainCache {
    pub fn new(rules: TerrainRules) -> Result<Self> {
        let entries = BoundedMap::new(rules.capacity)?;
        Ok(Self {
            rules,
            entries,
            stats: CacheStats::default(),
        })
    }

    pub fn rules(&self) -> &TerrainRules {
        &self.rules
    }

    /// Synthetic grid for the position and range, reusing a fresh cached one.
    pub fn get_grid(&mut self, lat: f64, lon: f64, range_nm: f64, now: DateTime<Utc>) -> Arc<TerrainGrid> {
        self.get_grid_with_baseline(lat, lon, range_nm, None, now)
    }

    /// Like [`get_grid`](Self::get_grid), but when `baseline_ft` is given the
    /// synthetic relief is applied as a perturbation around it.
    pub fn get_grid_with_baseline(
        &mut self,
        lat: f64,
        lon: f64,
        range_nm: f64,
        baseline_ft: Option<f64>,
        now: DateTime<Utc>,
    ) -> Arc<TerrainGrid> {
        let key = GridKey::new(lat, lon, range_nm);
        if !lat.is_finite() || !lon.is_finite() || !range_nm.is_finite() || range_nm <= 0.0 {
            tracing::debug!("Terrain request with unusable position {},{} range {}", lat, lon, range_nm);
            return Arc::new(TerrainGrid::empty(key, now));
        }
        let baseline_ft = baseline_ft.filter(|value| value.is_finite());

        if let Some(grid) = self.entries.get(&key) {
            if self.is_reusable(grid, baseline_ft, now) {
                self.stats.hits += 1;
                return Arc::clone(grid);
            }
        }

        self.stats.misses += 1;
        let grid = Arc::new(match baseline_ft {
            Some(baseline) => TerrainGrid::with_baseline(
                key,
                self.rules.grid_size,
                self.rules.synthetic_seed,
                baseline,
                self.rules.perturbation_scale,
                now,
            ),
            None => TerrainGrid::synthetic(key, self.rules.grid_size, self.rules.synthetic_seed, now),
        });
        tracing::debug!(
            "Generated terrain grid {:?} ({} cells, {:?})",
            key,
            grid.cells().len(),
            grid.source
        );
        self.store(key, Arc::clone(&grid));
        grid
    }

    /// Cache a host-supplied grid under its own key.
    pub fn insert(&mut self, grid: TerrainGrid) -> Arc<TerrainGrid> {
        let grid = Arc::new(grid);
        self.store(grid.key, Arc::clone(&grid));
        grid
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn store(&mut self, key: GridKey, grid: Arc<TerrainGrid>) {
        if let Some((evicted, _)) = self.entries.insert(key, grid) {
            self.stats.evictions += 1;
            tracing::debug!("Evicted terrain grid {:?}", evicted);
        }
    }

    fn is_reusable(&self, grid: &TerrainGrid, baseline_ft: Option<f64>, now: DateTime<Utc>) -> bool {
        let age = grid.age_secs(now);
        if !(0.0..self.rules.freshness_secs).contains(&age) {
            return false;
        }
        if !grid.is_well_formed() {
            tracing::debug!("Discarding malformed cached terrain grid {:?}", grid.key);
            return false;
        }
        match (grid.source, baseline_ft) {
            (ElevationSource::Synthetic, None) | (ElevationSource::External, _) => true,
            (ElevationSource::Baseline { baseline_ft: cached }, Some(requested)) => {
                (cached - requested).abs() <= self.rules.baseline_tolerance_ft
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cache() -> TerrainCache {
        TerrainCache::new(TerrainRules::default()).unwrap()
    }

    #[test]
    fn key_quantizes_to_about_one_nm() {
        let a = GridKey::new(39.8561, -104.6737, 10.0);
        let b = GridKey::new(39.8562, -104.6738, 10.0);
        assert_eq!(a, b);
        let c = GridKey::new(39.8561 + 1.0 / 60.0, -104.6737, 10.0);
        assert_ne!(a, c);
        assert_ne!(a, GridKey::new(39.8561, -104.6737, 20.0));
    }

    #[test]
    fn synthetic_grid_is_reproducible_and_non_negative() {
        let now = Utc::now();
        let key = GridKey::new(46.5, 8.0, 10.0);
        let a = TerrainGrid::synthetic(key, 16, 7, now);
        let b = TerrainGrid::synthetic(key, 16, 7, now + Duration::seconds(60));
        assert!(a.is_well_formed());
        let ea: Vec<f64> = a.cells().iter().map(|c| c.elevation_ft).collect();
        let eb: Vec<f64> = b.cells().iter().map(|c| c.elevation_ft).collect();
        assert_eq!(ea, eb);
        assert!(ea.iter().all(|e| *e >= 0.0));
    }

    #[test]
    fn different_seeds_change_relief() {
        let now = Utc::now();
        let key = GridKey::new(46.5, 8.0, 10.0);
        let a = TerrainGrid::synthetic(key, 8, 1, now);
        let b = TerrainGrid::synthetic(key, 8, 2, now);
        let ea: Vec<f64> = a.cells().iter().map(|c| c.elevation_ft).collect();
        let eb: Vec<f64> = b.cells().iter().map(|c| c.elevation_ft).collect();
        assert_ne!(ea, eb);
    }

    #[test]
    fn cell_layout_runs_north_to_south_and_west_to_east() {
        let grid = TerrainGrid::synthetic(GridKey::new(0.0, 0.0, 4.0), 4, 0, Utc::now());
        let nw = grid.cell(0, 0).unwrap();
        let se = grid.cell(3, 3).unwrap();
        assert!(nw.offset_nm.0 < 0.0 && nw.offset_nm.1 > 0.0);
        assert!(se.offset_nm.0 > 0.0 && se.offset_nm.1 < 0.0);
        assert!((nw.offset_nm.0 + 3.0).abs() < 1e-9);
        assert!(grid.cell(4, 0).is_none());
    }

    #[test]
    fn repeated_request_within_freshness_reuses_grid() {
        let mut cache = cache();
        let now = Utc::now();
        let first = cache.get_grid(39.85, -104.67, 10.0, now);
        let second = cache.get_grid(39.85, -104.67, 10.0, now + Duration::seconds(2));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn expired_grid_is_regenerated() {
        let mut cache = cache();
        let now = Utc::now();
        let first = cache.get_grid(39.85, -104.67, 10.0, now);
        let second = cache.get_grid(39.85, -104.67, 10.0, now + Duration::seconds(6));
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_never_exceeds_capacity() {
        let mut cache = cache();
        let now = Utc::now();
        for i in 0..30 {
            cache.get_grid(30.0 + i as f64 * 0.1, -100.0, 10.0, now);
            assert!(cache.len() <= 20);
        }
        assert_eq!(cache.len(), 20);
        assert_eq!(cache.stats().evictions, 10);
    }

    #[test]
    fn baseline_mode_perturbs_around_baseline() {
        let mut cache = cache();
        let now = Utc::now();
        let grid = cache.get_grid_with_baseline(46.5, 8.0, 10.0, Some(8000.0), now);
        assert_eq!(grid.source, ElevationSource::Baseline { baseline_ft: 8000.0 });
        let min = grid.min_elevation_ft().unwrap();
        let max = grid.max_elevation_ft().unwrap();
        assert!(min > 8000.0 - 1500.0 && max < 8000.0 + 1500.0, "{min}..{max}");
    }

    #[test]
    fn baseline_change_beyond_tolerance_is_a_miss() {
        let mut cache = cache();
        let now = Utc::now();
        let a = cache.get_grid_with_baseline(46.5, 8.0, 10.0, Some(8000.0), now);
        let b = cache.get_grid_with_baseline(46.5, 8.0, 10.0, Some(8020.0), now);
        assert!(Arc::ptr_eq(&a, &b));
        let c = cache.get_grid_with_baseline(46.5, 8.0, 10.0, Some(9000.0), now);
        assert!(!Arc::ptr_eq(&a, &c));
        let d = cache.get_grid(46.5, 8.0, 10.0, now);
        assert_eq!(d.source, ElevationSource::Synthetic);
    }

    #[test]
    fn malformed_cached_grid_is_regenerated() {
        let mut cache = cache();
        let now = Utc::now();
        let broken = TerrainGrid::from_elevations(39.85, -104.67, 10.0, 4, &[100.0; 5], now);
        assert!(!broken.is_well_formed());
        cache.insert(broken);
        let grid = cache.get_grid(39.85, -104.67, 10.0, now);
        assert!(grid.is_well_formed());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn invalid_position_yields_empty_grid() {
        let mut cache = cache();
        let grid = cache.get_grid(f64::NAN, 0.0, 10.0, Utc::now());
        assert!(grid.is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn bands_follow_clearance() {
        assert_eq!(TerrainBand::for_clearance(50.0), TerrainBand::Red);
        assert_eq!(TerrainBand::for_clearance(-500.0), TerrainBand::Red);
        assert_eq!(TerrainBand::for_clearance(500.0), TerrainBand::Yellow);
        assert_eq!(TerrainBand::for_clearance(1500.0), TerrainBand::Green);
        assert_eq!(TerrainBand::for_clearance(2500.0), TerrainBand::None);
    }
}

//! Radar frame index, slippy-map tile addressing and the bounded tile cache.

use crate::bounded::BoundedMap;
use crate::error::{OverlayError, Result};
use crate::spatial::NM_PER_DEG_LAT;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Highest zoom the radar source serves.
pub const MAX_RADAR_ZOOM: u8 = 12;
/// Latitude limit of the Web Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadarFrame {
    /// Unix seconds
    pub time: i64,
    pub path: String,
}

/// Response of the radar index endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadarIndex {
    pub host: String,
    #[serde(default)]
    pub radar: Vec<RadarFrame>,
}

impl RadarIndex {
    pub fn latest(&self) -> Option<&RadarFrame> {
        self.radar.iter().max_by_key(|frame| frame.time)
    }

    /// Frames oldest first, for animation loops.
    pub fn frames_chronological(&self) -> Vec<&RadarFrame> {
        let mut frames: Vec<&RadarFrame> = self.radar.iter().collect();
        frames.sort_by_key(|frame| frame.time);
        frames
    }

    pub fn tile_url(&self, frame: &RadarFrame, tile_size: u32, tile: TileCoord) -> String {
        tile_url(&self.host, &frame.path, tile_size, tile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, x: u32, y: u32) -> Result<Self> {
        let n = tiles_per_side(zoom)?;
        if x >= n || y >= n {
            return Err(OverlayError::TileOutOfRange { zoom, x, y });
        }
        Ok(Self { zoom, x, y })
    }

    /// Tile containing a position. Latitude is clamped to the Mercator limit.
    pub fn for_position(lat: f64, lon: f64, zoom: u8) -> Result<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(OverlayError::InvalidTilePosition { lat, lon });
        }
        let n = tiles_per_side(zoom)?;
        let (fx, fy) = mercator_fraction(lat, lon);
        let max = n - 1;
        let x = ((fx * n as f64).floor() as i64).clamp(0, max as i64) as u32;
        let y = ((fy * n as f64).floor() as i64).clamp(0, max as i64) as u32;
        Ok(Self { zoom, x, y })
    }
}

fn tiles_per_side(zoom: u8) -> Result<u32> {
    if zoom > MAX_RADAR_ZOOM {
        return Err(OverlayError::TileOutOfRange { zoom, x: 0, y: 0 });
    }
    Ok(1u32 << zoom)
}

/// Fractional Web Mercator position in `[0, 1)`.
fn mercator_fraction(lat: f64, lon: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let lon = ((lon + 180.0).rem_euclid(360.0)) - 180.0;
    let fx = (lon + 180.0) / 360.0;
    let fy = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0;
    (fx, fy)
}

/// Zoom whose single tile spans roughly the visible diameter.
pub fn zoom_for_range(range_nm: f64) -> u8 {
    if !range_nm.is_finite() || range_nm <= 0.0 {
        return MAX_RADAR_ZOOM;
    }
    let span_deg = (2.0 * range_nm / NM_PER_DEG_LAT).min(360.0);
    let zoom = (360.0 / span_deg).log2().floor();
    zoom.clamp(0.0, MAX_RADAR_ZOOM as f64) as u8
}

pub fn tile_url(host: &str, path: &str, tile_size: u32, tile: TileCoord) -> String {
    format!(
        "{}{}/{}/{}/{}/{}/2/1_1.png",
        host, path, tile_size, tile.zoom, tile.x, tile.y
    )
}

/// Tiles overlapping the square of half-width `range_nm` around a position.
pub fn tiles_covering(lat: f64, lon: f64, range_nm: f64, zoom: u8) -> Result<Vec<TileCoord>> {
    if !lat.is_finite() || !lon.is_finite() || !range_nm.is_finite() {
        return Err(OverlayError::InvalidTilePosition { lat, lon });
    }
    let n = tiles_per_side(zoom)?;
    let half_lat = range_nm.max(0.0) / NM_PER_DEG_LAT;
    let cos_lat = lat.to_radians().cos().abs().max(0.01);
    let half_lon = (half_lat / cos_lat).min(180.0);

    let north_west = TileCoord::for_position(lat + half_lat, lon - half_lon, zoom)?;
    let south_east = TileCoord::for_position(lat - half_lat, lon + half_lon, zoom)?;

    let xs: Vec<u32> = if half_lon >= 180.0 {
        (0..n).collect()
    } else if north_west.x <= south_east.x {
        (north_west.x..=south_east.x).collect()
    } else {
        // View straddles the antimeridian
        (north_west.x..n).chain(0..=south_east.x).collect()
    };

    let mut tiles = Vec::with_capacity(xs.len() * (south_east.y - north_west.y + 1) as usize);
    for y in north_west.y..=south_east.y {
        for &x in &xs {
            tiles.push(TileCoord { zoom, x, y });
        }
    }
    Ok(tiles)
}

#[derive(Debug, Clone, PartialEq)]
pub enum TileSlot<H> {
    /// Requested, response not yet received
    Pending,
    Ready(H),
}

/// URL to image-handle map bounded by insertion order.
///
/// Pending requests occupy a slot so overlapping requests for one URL
/// converge on a single fetch.
#[derive(Debug, Clone)]
pub struct TileCache<H> {
    slots: BoundedMap<String, TileSlot<H>>,
    evictions: u64,
}

impl<H> TileCache<H> {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            slots: BoundedMap::new(capacity)?,
            evictions: 0,
        })
    }

    /// Reserve `url` for fetching. Returns false when it is already pending or loaded.
    pub fn begin_fetch(&mut self, url: &str) -> bool {
        if self.slots.contains_key(url) {
            return false;
        }
        let evicted = self.slots.insert(url.to_string(), TileSlot::Pending);
        self.record_eviction(evicted);
        true
    }

    /// Store a loaded tile, returning the URL evicted to make room.
    pub fn insert(&mut self, url: impl Into<String>, handle: H) -> Option<String> {
        let evicted = self.slots.insert(url.into(), TileSlot::Ready(handle));
        self.record_eviction(evicted)
    }

    /// Drop a failed request so a later pass may retry it.
    pub fn fail(&mut self, url: &str) {
        if matches!(self.slots.get(url), Some(TileSlot::Pending)) {
            self.slots.remove(url);
        }
    }

    pub fn get(&self, url: &str) -> Option<&H> {
        match self.slots.get(url) {
            Some(TileSlot::Ready(handle)) => Some(handle),
            _ => None,
        }
    }

    pub fn is_pending(&self, url: &str) -> bool {
        matches!(self.slots.get(url), Some(TileSlot::Pending))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.slots.contains_key(url)
    }

    /// Loaded tiles among `urls`, in the given order. Unloaded tiles are skipped.
    pub fn ready_tiles<'a, S: AsRef<str>>(&'a self, urls: &'a [S]) -> Vec<(&'a str, &'a H)> {
        urls.iter()
            .filter_map(|url| {
                let url = url.as_ref();
                self.get(url).map(|handle| (url, handle))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    fn record_eviction(&mut self, evicted: Option<(String, TileSlot<H>)>) -> Option<String> {
        let (url, _) = evicted?;
        self.evictions += 1;
        tracing::debug!("Evicted radar tile {}", url);
        Some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> RadarIndex {
        serde_json::from_str(
            r#"{"host":"https://tilecache.example.com","radar":[
                {"time":1700000600,"path":"/v2/radar/b"},
                {"time":1700000000,"path":"/v2/radar/a"}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn latest_frame_and_url() {
        let index = index();
        let latest = index.latest().unwrap();
        assert_eq!(latest.path, "/v2/radar/b");
        let tile = TileCoord::new(6, 12, 24).unwrap();
        assert_eq!(
            index.tile_url(latest, 256, tile),
            "https://tilecache.example.com/v2/radar/b/256/6/12/24/2/1_1.png"
        );
        let ordered: Vec<i64> = index.frames_chronological().iter().map(|f| f.time).collect();
        assert_eq!(ordered, vec![1_700_000_000, 1_700_000_600]);
    }

    #[test]
    fn missing_frames_default_to_empty() {
        let index: RadarIndex = serde_json::from_str(r#"{"host":"h"}"#).unwrap();
        assert!(index.latest().is_none());
    }

    #[test]
    fn tile_for_known_positions() {
        assert_eq!(TileCoord::for_position(0.0, 0.0, 1).unwrap(), TileCoord { zoom: 1, x: 1, y: 1 });
        // Denver at zoom 6
        let tile = TileCoord::for_position(39.86, -104.67, 6).unwrap();
        assert_eq!((tile.x, tile.y), (13, 24));
        // Poles clamp into range
        let tile = TileCoord::for_position(90.0, 180.0, 3).unwrap();
        assert_eq!(tile.y, 0);
        assert_eq!(tile.x, 0);
    }

    #[test]
    fn rejects_bad_coordinates() {
        assert!(TileCoord::new(2, 4, 0).is_err());
        assert!(TileCoord::new(MAX_RADAR_ZOOM + 1, 0, 0).is_err());
        assert!(TileCoord::for_position(f64::NAN, 0.0, 3).is_err());
    }

    #[test]
    fn zoom_shrinks_with_range() {
        assert!(zoom_for_range(5.0) > zoom_for_range(80.0));
        assert_eq!(zoom_for_range(10_000.0), 0);
        assert_eq!(zoom_for_range(0.0), MAX_RADAR_ZOOM);
        assert_eq!(zoom_for_range(40.0), 8);
    }

    #[test]
    fn covering_tiles_include_center_and_wrap() {
        let tiles = tiles_covering(39.86, -104.67, 40.0, 8).unwrap();
        let center = TileCoord::for_position(39.86, -104.67, 8).unwrap();
        assert!(tiles.contains(&center));
        assert!(tiles.len() <= 9);

        let wrapped = tiles_covering(0.0, 179.9, 30.0, 4).unwrap();
        let xs: Vec<u32> = wrapped.iter().map(|t| t.x).collect();
        assert!(xs.contains(&15));
        assert!(xs.contains(&0));
    }

    #[test]
    fn cache_evicts_single_oldest_past_capacity() {
        let mut cache = TileCache::new(100).unwrap();
        for i in 0..100 {
            assert!(cache.insert(format!("tile-{i}"), i).is_none());
        }
        assert_eq!(cache.insert("tile-100", 100), Some("tile-0".to_string()));
        assert_eq!(cache.len(), 100);
        assert!(cache.get("tile-0").is_none());
        assert_eq!(cache.get("tile-1"), Some(&1));
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn pending_tiles_dedupe_and_are_skipped() {
        let mut cache: TileCache<u8> = TileCache::new(4).unwrap();
        assert!(cache.begin_fetch("a"));
        assert!(!cache.begin_fetch("a"));
        assert!(cache.is_pending("a"));
        cache.insert("b", 2);

        let urls = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(cache.ready_tiles(&urls), vec![("b", &2)]);

        cache.fail("a");
        assert!(!cache.contains("a"));
        assert!(cache.begin_fetch("a"));
        cache.insert("a", 1);
        assert_eq!(cache.get("a"), Some(&1));
        // Failing a loaded tile keeps it
        cache.fail("a");
        assert_eq!(cache.get("a"), Some(&1));
    }
}

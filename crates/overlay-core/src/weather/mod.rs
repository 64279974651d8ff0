//! Weather layer: METAR decoding, flight categories, radar tiles and wind barbs.

pub mod category;
pub mod metar;
pub mod radar;
pub mod wind;

pub use category::{ceiling_ft, classify_flight_category, FlightCategory};
pub use metar::{parse_metar, MetarRecord, Wind};
pub use radar::{tile_url, tiles_covering, zoom_for_range, RadarFrame, RadarIndex, TileCache, TileCoord};
pub use wind::{wind_barb, BarbElement, WindBarb};

use crate::error::Result;
use crate::rules::WeatherRules;
use crate::spatial::{bearing_deg, distance_nm};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of the nearby-METAR response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationReport {
    pub icao: String,
    pub lat: f64,
    pub lon: f64,
    pub raw: String,
    #[serde(default)]
    pub flight_rules: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationWeather {
    pub icao: String,
    pub position: Option<(f64, f64)>,
    pub record: MetarRecord,
    /// Category reported by the server, when it sent one we understand
    pub reported_category: Option<FlightCategory>,
}

impl StationWeather {
    /// Locally computed category.
    pub fn category(&self) -> FlightCategory {
        self.record.category
    }

    pub fn wind_barb(&self) -> Option<WindBarb> {
        let wind = self.record.wind?;
        let speed = wind.speed_kt as f64;
        match wind.direction_deg {
            Some(direction) => Some(wind_barb(direction as f64, speed)),
            // Variable wind has no staff bearing; only a calm circle can be drawn
            None if speed < wind::CALM_THRESHOLD_KT => Some(wind_barb(0.0, speed)),
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyStation<'a> {
    pub station: &'a StationWeather,
    pub distance_nm: f64,
    pub bearing_deg: f64,
}

pub struct WeatherDataEngine<H> {
    rules: WeatherRules,
    stations: HashMap<String, StationWeather>,
    radar: Option<RadarIndex>,
    tiles: TileCache<H>,
}

impl<H> WeatherDataEngine<H> {
    pub fn new(rules: WeatherRules) -> Result<Self> {
        let tiles = TileCache::new(rules.tile_capacity)?;
        Ok(Self {
            rules,
            stations: HashMap::new(),
            radar: None,
            tiles,
        })
    }

    pub fn rules(&self) -> &WeatherRules {
        &self.rules
    }

    /// Decode and store a station report. Returns false when an equal or newer
    /// observation for the station is already held.
    pub fn ingest(&mut self, report: StationReport) -> bool {
        let record = parse_metar(&report.raw);
        let icao = record
            .station
            .clone()
            .unwrap_or_else(|| report.icao.trim().to_ascii_uppercase());
        if icao.is_empty() {
            tracing::debug!("Dropping METAR without station: {}", report.raw);
            return false;
        }

        if let Some(existing) = self.stations.get(&icao) {
            let newer = match (record.time, existing.record.time) {
                (Some(incoming), Some(held)) => incoming.is_newer_than(&held),
                (None, Some(_)) => false,
                _ => record.raw != existing.record.raw,
            };
            if !newer {
                return false;
            }
        }

        let reported_category = report
            .flight_rules
            .as_deref()
            .and_then(|rules| rules.parse::<FlightCategory>().ok());
        if let Some(reported) = reported_category {
            if reported != record.category {
                tracing::debug!(
                    "{} reported {} but decodes as {}",
                    icao,
                    reported,
                    record.category
                );
            }
        }

        let position = (report.lat.is_finite() && report.lon.is_finite()).then_some((report.lat, report.lon));
        self.stations.insert(
            icao.clone(),
            StationWeather {
                icao,
                position,
                record,
                reported_category,
            },
        );
        true
    }

    /// Ingest a batch, returning how many records were stored.
    pub fn ingest_all(&mut self, reports: impl IntoIterator<Item = StationReport>) -> usize {
        let mut stored = 0;
        for report in reports {
            if self.ingest(report) {
                stored += 1;
            }
        }
        stored
    }

    /// Store a report for a station whose position is already known (or unknown).
    pub fn ingest_raw(&mut self, icao: &str, raw: &str) -> bool {
        let (lat, lon) = self
            .stations
            .get(&icao.to_ascii_uppercase())
            .and_then(|s| s.position)
            .unwrap_or((f64::NAN, f64::NAN));
        self.ingest(StationReport {
            icao: icao.to_string(),
            lat,
            lon,
            raw: raw.to_string(),
            flight_rules: None,
        })
    }

    pub fn station(&self, icao: &str) -> Option<&StationWeather> {
        self.stations.get(&icao.to_ascii_uppercase())
    }

    pub fn stations(&self) -> impl Iterator<Item = &StationWeather> {
        self.stations.values()
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// Stations within `radius_nm` of a position, nearest first.
    pub fn nearby(&self, lat: f64, lon: f64, radius_nm: f64) -> Vec<NearbyStation<'_>> {
        let mut nearby: Vec<NearbyStation<'_>> = self
            .stations
            .values()
            .filter_map(|station| {
                let (s_lat, s_lon) = station.position?;
                let distance = distance_nm(lat, lon, s_lat, s_lon);
                (distance <= radius_nm).then(|| NearbyStation {
                    station,
                    distance_nm: distance,
                    bearing_deg: bearing_deg(lat, lon, s_lat, s_lon),
                })
            })
            .collect();
        nearby.sort_by(|a, b| {
            a.distance_nm
                .total_cmp(&b.distance_nm)
                .then_with(|| a.station.icao.cmp(&b.station.icao))
        });
        nearby
    }

    /// Nearby stations using the configured radius.
    pub fn nearby_default(&self, lat: f64, lon: f64) -> Vec<NearbyStation<'_>> {
        self.nearby(lat, lon, self.rules.nearby_radius_nm)
    }

    pub fn wind_barb(&self, icao: &str) -> Option<WindBarb> {
        self.station(icao)?.wind_barb()
    }

    pub fn set_radar_index(&mut self, index: RadarIndex) {
        self.radar = Some(index);
    }

    pub fn radar_index(&self) -> Option<&RadarIndex> {
        self.radar.as_ref()
    }

    pub fn latest_radar_frame(&self) -> Option<&RadarFrame> {
        self.radar.as_ref()?.latest()
    }

    /// Tile URLs of the latest frame covering a view.
    pub fn radar_tile_urls(&self, lat: f64, lon: f64, range_nm: f64) -> Result<Vec<String>> {
        let Some(index) = self.radar.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(frame) = index.latest() else {
            return Ok(Vec::new());
        };
        let zoom = zoom_for_range(range_nm);
        Ok(tiles_covering(lat, lon, range_nm, zoom)?
            .into_iter()
            .map(|tile| index.tile_url(frame, self.rules.tile_size, tile))
            .collect())
    }

    pub fn tiles(&self) -> &TileCache<H> {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut TileCache<H> {
        &mut self.tiles
    }
}

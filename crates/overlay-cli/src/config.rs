//! Runtime configuration from environment.

use overlay_core::rules::OverlayRules;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub weather_url: String,
    pub elevation_url: String,
    pub range_nm: f64,
    pub tile_size: u32,
    pub metar_refresh_s: u64,
    pub radar_refresh_s: u64,
    pub elevation_refresh_s: u64,
    pub request_timeout_s: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset or unparsable values use defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str, default: u64| -> u64 {
            lookup(name)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            weather_url: lookup("OVERLAY_WEATHER_URL")
                .unwrap_or_else(|| "http://localhost:5000".to_string()),
            elevation_url: lookup("OVERLAY_ELEVATION_URL")
                .unwrap_or_else(|| "https://api.open-meteo.com/v1/elevation".to_string()),
            range_nm: lookup("OVERLAY_RANGE_NM")
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|range| range.is_finite() && *range > 0.0)
                .unwrap_or(10.0),
            tile_size: lookup("OVERLAY_TILE_SIZE")
                .and_then(|s| s.trim().parse().ok())
                .filter(|size: &u32| matches!(*size, 256 | 512))
                .unwrap_or(256),
            metar_refresh_s: number("OVERLAY_METAR_REFRESH_S", 300).max(2),
            radar_refresh_s: number("OVERLAY_RADAR_REFRESH_S", 120).max(2),
            elevation_refresh_s: number("OVERLAY_ELEVATION_REFRESH_S", 5).max(2),
            request_timeout_s: number("OVERLAY_REQUEST_TIMEOUT_S", 10).max(1),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_s)
    }

    pub fn overlay_rules(&self) -> OverlayRules {
        let mut rules = OverlayRules {
            range_nm: self.range_nm,
            ..OverlayRules::default()
        };
        rules.weather.tile_size = self.tile_size;
        rules
    }
}

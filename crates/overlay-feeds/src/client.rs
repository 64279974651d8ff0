//! HTTP clients for the weather backend and the ground elevation provider.

use crate::error::{FeedError, Result};
use overlay_core::weather::{RadarIndex, StationReport};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;

const FEET_PER_METER: f64 = 3.280_84;

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("overlay-feeds/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(FeedError::Client)
}

fn trim_base(base_url: impl Into<String>) -> String {
    base_url.into().trim().trim_end_matches('/').to_string()
}

async fn get_checked(client: &Client, url: &str) -> Result<Response> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FeedError::Request {
            url: url.to_string(),
            source,
        })?;
    if !response.status().is_success() {
        return Err(FeedError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    Ok(response)
}

async fn read_text(response: Response, url: &str) -> Result<String> {
    response.text().await.map_err(|source| FeedError::Request {
        url: url.to_string(),
        source,
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response, url: &str) -> Result<T> {
    let body = read_text(response, url).await?;
    serde_json::from_str(&body).map_err(|err| FeedError::malformed(url, err.to_string()))
}

#[derive(Debug, Deserialize)]
struct NearbyMetarResponse {
    #[serde(default)]
    metars: Vec<StationReport>,
}

#[derive(Debug, Deserialize)]
struct StationMetarResponse {
    raw: String,
}

/// Client for the METAR and radar endpoints of the weather backend.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: Client,
    base_url: String,
}

impl WeatherClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = trim_base(base_url);
        if base_url.is_empty() {
            return Err(FeedError::NotConfigured);
        }
        Ok(Self {
            client: build_client(timeout)?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reports for stations within `radius_nm` of a position.
    pub async fn nearby_metars(&self, lat: f64, lon: f64, radius_nm: f64) -> Result<Vec<StationReport>> {
        let url = format!(
            "{}/weather/metar/nearby?lat={:.4}&lon={:.4}&radius={:.0}",
            self.base_url, lat, lon, radius_nm
        );
        let response = get_checked(&self.client, &url).await?;
        let payload: NearbyMetarResponse = read_json(response, &url).await?;
        tracing::debug!("Fetched {} nearby METARs", payload.metars.len());
        Ok(payload.metars)
    }

    /// Raw report for one station. The backend answers with `{"raw": ...}` or a
    /// plain text body.
    pub async fn station_metar(&self, icao: &str) -> Result<String> {
        let icao = icao.trim().to_ascii_uppercase();
        if icao.is_empty() || !icao.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FeedError::malformed(&self.base_url, format!("invalid station id {:?}", icao)));
        }
        let url = format!("{}/weather/metar/{}", self.base_url, icao);
        let response = get_checked(&self.client, &url).await?;
        let body = read_text(response, &url).await?;

        let raw = match serde_json::from_str::<StationMetarResponse>(&body) {
            Ok(payload) => payload.raw,
            Err(_) => body,
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FeedError::malformed(&url, "empty report"));
        }
        Ok(raw.to_string())
    }

    pub async fn radar_index(&self) -> Result<RadarIndex> {
        let url = format!("{}/weather/radar", self.base_url);
        let response = get_checked(&self.client, &url).await?;
        let index: RadarIndex = read_json(response, &url).await?;
        if index.host.trim().is_empty() {
            return Err(FeedError::malformed(&url, "radar index without host"));
        }
        Ok(index)
    }

    /// Image bytes of one radar tile, addressed by its full URL.
    pub async fn radar_tile(&self, tile_url: &str) -> Result<Vec<u8>> {
        let response = get_checked(&self.client, tile_url).await?;
        let bytes = response.bytes().await.map_err(|source| FeedError::Request {
            url: tile_url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    elevation: Option<Vec<f64>>,
}

/// Ground elevation under a position from an Open-Meteo style provider.
#[derive(Debug, Clone)]
pub struct ElevationClient {
    client: Client,
    base_url: String,
}

impl ElevationClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = trim_base(base_url);
        if base_url.is_empty() {
            return Err(FeedError::NotConfigured);
        }
        Ok(Self {
            client: build_client(timeout)?,
            base_url,
        })
    }

    fn url_for(&self, lat: f64, lon: f64) -> String {
        let separator = if self.base_url.contains('?') { "&" } else { "?" };
        format!(
            "{}{}latitude={:.6}&longitude={:.6}",
            self.base_url, separator, lat, lon
        )
    }

    pub async fn elevation_ft(&self, lat: f64, lon: f64) -> Result<f64> {
        let url = self.url_for(lat, lon);
        if !lat.is_finite() || !lon.is_finite() {
            return Err(FeedError::malformed(&url, "position is not finite"));
        }
        let response = get_checked(&self.client, &url).await?;
        let payload: ElevationResponse = read_json(response, &url).await?;
        let meters = payload
            .elevation
            .and_then(|values| values.into_iter().next())
            .filter(|value| value.is_finite())
            .ok_or_else(|| FeedError::malformed(&url, "missing elevation"))?;
        Ok(meters * FEET_PER_METER)
    }
}

//! Client tests against an in-process fixture backend.

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use overlay_feeds::{ElevationClient, FeedError, LastKnownGood, WeatherClient};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

async fn nearby(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    assert!(params.contains_key("lat"));
    assert!(params.contains_key("lon"));
    assert!(params.contains_key("radius"));
    Json(json!({
        "metars": [
            {"icao": "KDEN", "lat": 39.86, "lon": -104.67,
             "raw": "KDEN 121053Z 18010KT 10SM FEW250 22/08 A3005", "flight_rules": "VFR"},
            {"icao": "KBJC", "lat": 39.91, "lon": -105.12,
             "raw": "KBJC 121050Z 27008KT 2SM BR OVC008 10/09 A3006"}
        ]
    }))
}

async fn station(Path(icao): Path<String>) -> impl IntoResponse {
    match icao.as_str() {
        "KDEN" => Json(json!({"raw": "KDEN 121053Z 18010KT 10SM FEW250 22/08 A3005"})).into_response(),
        "KBOS" => "KBOS 121054Z 36015G25KT 10SM SCT040 18/10 A2998\n".into_response(),
        "KEMP" => "   ".into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn radar() -> impl IntoResponse {
    Json(json!({
        "host": "https://tiles.example.com",
        "radar": [{"time": 1700000000, "path": "/v2/radar/1700000000"}]
    }))
}

async fn tile() -> impl IntoResponse {
    vec![0x89u8, b'P', b'N', b'G']
}

async fn elevation(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    if params.get("latitude").map(String::as_str) == Some("0.000000") {
        return Json(json!({"error": true})).into_response();
    }
    Json(json!({"elevation": [1609.0]})).into_response()
}

async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route("/weather/metar/nearby", get(nearby))
        .route("/weather/metar/:icao", get(station))
        .route("/weather/radar", get(radar))
        .route("/tiles/:z/:x/:y", get(tile))
        .route("/v1/elevation", get(elevation))
        .route("/broken/weather/radar", get(|| async { "not json" }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn weather_client(addr: SocketAddr) -> WeatherClient {
    WeatherClient::new(format!("http://{}", addr), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_nearby_metars_decode() {
    let addr = spawn_backend().await;
    let reports = weather_client(addr).nearby_metars(39.9, -105.0, 50.0).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].icao, "KDEN");
    assert_eq!(reports[0].flight_rules.as_deref(), Some("VFR"));
    assert_eq!(reports[1].flight_rules, None);
}

#[tokio::test]
async fn test_station_metar_json_and_text() {
    let addr = spawn_backend().await;
    let client = weather_client(addr);
    assert!(client.station_metar("kden").await.unwrap().starts_with("KDEN 121053Z"));
    assert_eq!(
        client.station_metar("KBOS").await.unwrap(),
        "KBOS 121054Z 36015G25KT 10SM SCT040 18/10 A2998"
    );
    assert!(matches!(
        client.station_metar("KEMP").await,
        Err(FeedError::Malformed { .. })
    ));
    assert!(matches!(
        client.station_metar("KZZZ").await,
        Err(FeedError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_radar_index_and_tile() {
    let addr = spawn_backend().await;
    let client = weather_client(addr);
    let index = client.radar_index().await.unwrap();
    assert_eq!(index.latest().unwrap().time, 1_700_000_000);

    let bytes = client
        .radar_tile(&format!("http://{}/tiles/6/12/24", addr))
        .await
        .unwrap();
    assert_eq!(&bytes[1..4], b"PNG");
}

#[tokio::test]
async fn test_malformed_radar_index() {
    let addr = spawn_backend().await;
    let client = WeatherClient::new(format!("http://{}/broken", addr), Duration::from_secs(5)).unwrap();
    assert!(matches!(client.radar_index().await, Err(FeedError::Malformed { .. })));
}

#[tokio::test]
async fn test_elevation_in_feet() {
    let addr = spawn_backend().await;
    let client = ElevationClient::new(format!("http://{}/v1/elevation", addr), Duration::from_secs(5)).unwrap();
    let feet = client.elevation_ft(39.74, -104.99).await.unwrap();
    assert!((feet - 5278.9).abs() < 1.0);
    assert!(matches!(
        client.elevation_ft(0.0, 0.0).await,
        Err(FeedError::Malformed { .. })
    ));
}

#[tokio::test]
async fn test_unreachable_source_falls_back() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ElevationClient::new(format!("http://{}/v1/elevation", addr), Duration::from_secs(2)).unwrap();
    let mut lkg = LastKnownGood::default();
    let now = Utc::now();
    lkg.store(5200.0, now);

    let outcome = client.elevation_ft(39.74, -104.99).await;
    assert!(matches!(outcome, Err(FeedError::Request { .. })));
    let value = lkg.resolve("elevation", outcome, now, || None).unwrap();
    assert_eq!(value.label(), "cached");
    assert_eq!(*value.value(), 5200.0);
}

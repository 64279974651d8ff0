//! Single-threaded overlay update loop.
//!
//! The render tick drives the simulator, traffic and TAWS. Network fetches run
//! as spawned tasks on the same current-thread runtime and report back over a
//! channel together with the ticket they were issued under, so a late stale
//! response is dropped instead of replacing fresher data.

use crate::config::Config;
use crate::sim::FlightSimulator;
use anyhow::Result;
use chrono::{DateTime, Utc};
use overlay_core::weather::StationReport;
use overlay_core::{
    AircraftState, AlertEvent, OverlaySession, RadarIndex, RequestSequencer, RotationMode,
    ThreatLevel, Ticket, TrafficObservation, TrafficThreat,
};
use overlay_feeds::{Backoff, ElevationClient, FeedError, LastKnownGood, Sourced, WeatherClient};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Scale used when reporting where an advisory would be drawn.
const SCREEN_PX_PER_NM: f64 = 20.0;

/// Radar tile image bytes.
pub type TileImage = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Metar,
    Radar,
    Elevation,
}

impl FeedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedKind::Metar => "metar",
            FeedKind::Radar => "radar",
            FeedKind::Elevation => "elevation",
        }
    }
}

/// Result of a spawned fetch.
#[derive(Debug)]
pub enum FeedUpdate {
    Metars {
        ticket: Ticket<FeedKind>,
        outcome: Result<Vec<StationReport>, FeedError>,
    },
    Radar {
        ticket: Ticket<FeedKind>,
        outcome: Result<RadarIndex, FeedError>,
    },
    Elevation {
        ticket: Ticket<FeedKind>,
        outcome: Result<f64, FeedError>,
    },
    Tile {
        url: String,
        outcome: Result<TileImage, FeedError>,
    },
}

/// What one render tick produced.
#[derive(Debug, Clone)]
pub struct TickSummary {
    pub alert: Option<AlertEvent>,
    /// Targets whose advisory tier rose to TA or RA on this tick
    pub new_advisories: Vec<TrafficThreat>,
    pub tracked_targets: usize,
}

/// Session plus the bookkeeping for the asynchronous feeds.
pub struct OverlayRuntime {
    session: OverlaySession<TileImage>,
    sequencer: RequestSequencer<FeedKind>,
    backoff: HashMap<FeedKind, Backoff>,
    elevation: LastKnownGood<f64>,
    baseline: Option<Sourced<f64>>,
    advisories: HashMap<String, ThreatLevel>,
}

impl OverlayRuntime {
    pub fn new(config: &Config) -> Result<Self> {
        let session = OverlaySession::new(config.overlay_rules())?;
        let backoff = [FeedKind::Metar, FeedKind::Radar, FeedKind::Elevation]
            .into_iter()
            .map(|kind| (kind, Backoff::new(Duration::from_secs(2), Duration::from_secs(300))))
            .collect();
        Ok(Self {
            session,
            sequencer: RequestSequencer::new(),
            backoff,
            elevation: LastKnownGood::new(Some(chrono::Duration::seconds(60))),
            baseline: None,
            advisories: HashMap::new(),
        })
    }

    pub fn session(&self) -> &OverlaySession<TileImage> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut OverlaySession<TileImage> {
        &mut self.session
    }

    /// Ground elevation currently applied as the terrain baseline.
    pub fn baseline(&self) -> Option<&Sourced<f64>> {
        self.baseline.as_ref()
    }

    /// Ticket for a new fetch, unless one is outstanding or the source is backing off.
    pub fn begin(&mut self, kind: FeedKind) -> Option<Ticket<FeedKind>> {
        if let Some(backoff) = self.backoff.get(&kind) {
            if !backoff.ready() {
                tracing::debug!("{} fetch deferred for {:?}", kind.as_str(), backoff.remaining());
                return None;
            }
        }
        self.sequencer.issue_if_idle(kind)
    }

    pub fn on_tick(
        &mut self,
        aircraft: &AircraftState,
        traffic: Vec<TrafficObservation>,
        now: DateTime<Utc>,
    ) -> TickSummary {
        self.session.ingest_traffic(traffic, now);
        let baseline = self.baseline.as_ref().map(|sourced| *sourced.value());
        let outcome = self.session.update(aircraft, baseline, now);

        if let Some(event) = &outcome.alert {
            if event.level.is_alert() {
                tracing::warn!("TAWS {} ({})", event.message, event.level);
            } else {
                tracing::info!("TAWS clear");
            }
        }

        let threats = self.session.threats(aircraft);
        let mut new_advisories = Vec::new();
        let mut current = HashMap::with_capacity(threats.len());
        for threat in threats {
            let previous = self.advisories.get(&threat.id).copied().unwrap_or(ThreatLevel::Other);
            if threat.level >= ThreatLevel::TrafficAdvisory && threat.level > previous {
                tracing::warn!(
                    "Traffic {:?} {} at {:.1} nm, {:+.0} ft",
                    threat.level,
                    threat.id,
                    threat.distance_nm,
                    threat.relative_altitude_ft
                );
                new_advisories.push(threat.clone());
            }
            current.insert(threat.id.clone(), threat.level);
        }
        self.advisories = current;

        TickSummary {
            alert: outcome.alert,
            new_advisories,
            tracked_targets: self.session.traffic().len(),
        }
    }

    /// Apply a finished fetch. Stale results are dropped and failures fall
    /// back without surfacing an error.
    pub fn apply(&mut self, update: FeedUpdate, now: DateTime<Utc>) {
        match update {
            FeedUpdate::Metars { ticket, outcome } => {
                if let Some(reports) = self.accept(&ticket, outcome) {
                    let stored = self.session.weather_mut().ingest_all(reports);
                    tracing::debug!("Stored {} METAR updates", stored);
                }
            }
            FeedUpdate::Radar { ticket, outcome } => {
                if let Some(index) = self.accept(&ticket, outcome) {
                    tracing::debug!("Radar index with {} frames", index.radar.len());
                    self.session.weather_mut().set_radar_index(index);
                }
            }
            FeedUpdate::Elevation { ticket, outcome } => {
                if !self.sequencer.complete(&ticket) {
                    return;
                }
                self.record_outcome(FeedKind::Elevation, outcome.is_ok());
                // Without a baseline the grid stays purely synthetic
                self.baseline = self.elevation.resolve("elevation", outcome, now, || None);
            }
            FeedUpdate::Tile { url, outcome } => match outcome {
                Ok(image) => {
                    self.session.weather_mut().tiles_mut().insert(url, image);
                }
                Err(err) => {
                    tracing::debug!("Radar tile {} failed: {}", url, err);
                    self.session.weather_mut().tiles_mut().fail(&url);
                }
            },
        }
    }

    /// Radar tiles of the current view not yet requested. Each returned URL is
    /// marked pending.
    pub fn tiles_to_fetch(&mut self, aircraft: &AircraftState) -> Vec<String> {
        let range = self.session.range_nm();
        let urls = match self
            .session
            .weather()
            .radar_tile_urls(aircraft.lat, aircraft.lon, range)
        {
            Ok(urls) => urls,
            Err(err) => {
                tracing::debug!("No radar tiles for view: {}", err);
                return Vec::new();
            }
        };
        let tiles = self.session.weather_mut().tiles_mut();
        urls.into_iter().filter(|url| tiles.begin_fetch(url)).collect()
    }

    fn accept<T>(&mut self, ticket: &Ticket<FeedKind>, outcome: Result<T, FeedError>) -> Option<T> {
        if !self.sequencer.complete(ticket) {
            return None;
        }
        match outcome {
            Ok(value) => {
                self.record_outcome(ticket.key, true);
                Some(value)
            }
            Err(err) => {
                self.record_outcome(ticket.key, false);
                tracing::warn!("{} fetch failed, keeping previous data: {}", ticket.key.as_str(), err);
                None
            }
        }
    }

    fn record_outcome(&mut self, kind: FeedKind, ok: bool) {
        if let Some(backoff) = self.backoff.get_mut(&kind) {
            if ok {
                backoff.succeed();
            } else {
                let delay = backoff.fail();
                tracing::debug!("{} retry in {:?}", kind.as_str(), delay);
            }
        }
    }
}

/// Options of one simulated run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub start: AircraftState,
    pub traffic: usize,
    pub seed: u64,
    pub tick: Duration,
    pub duration: Option<Duration>,
    /// Skip all network feeds
    pub offline: bool,
    pub rotation: RotationMode,
}

/// Run the overlay against the simulator until the duration elapses or Ctrl-C.
pub async fn run_overlay_loop(config: Config, options: RunOptions) -> Result<()> {
    let mut runtime = OverlayRuntime::new(&config)?;
    runtime.session_mut().set_rotation(options.rotation);
    let mut sim = FlightSimulator::new(options.start, options.traffic, options.seed);

    let (weather, elevation) = if options.offline {
        (None, None)
    } else {
        (
            client_or_warn("weather", WeatherClient::new(&config.weather_url, config.request_timeout())),
            client_or_warn("elevation", ElevationClient::new(&config.elevation_url, config.request_timeout())),
        )
    };

    let (tx, mut rx) = mpsc::channel::<FeedUpdate>(64);
    let mut render = interval(options.tick.max(Duration::from_millis(10)));
    render.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut metar_timer = interval(Duration::from_secs(config.metar_refresh_s));
    let mut radar_timer = interval(Duration::from_secs(config.radar_refresh_s));
    let mut elevation_timer = interval(Duration::from_secs(config.elevation_refresh_s));
    let deadline = tokio::time::sleep(options.duration.unwrap_or(Duration::from_secs(u32::MAX as u64)));
    tokio::pin!(deadline);

    tracing::info!(
        "Overlay running at {:.4},{:.4} range {} nm ({} targets)",
        options.start.lat,
        options.start.lon,
        config.range_nm,
        options.traffic
    );

    let dt = options.tick.as_secs_f64();
    loop {
        tokio::select! {
            _ = render.tick() => {
                let aircraft = sim.step(dt);
                let traffic = sim.traffic();
                let summary = runtime.on_tick(&aircraft, traffic, Utc::now());
                for threat in &summary.new_advisories {
                    if let Some(target) = runtime.session().traffic().get(&threat.id) {
                        let (lat, lon) = target.position.resolve(&aircraft);
                        let offset = runtime.session().project(&aircraft, lat, lon, SCREEN_PX_PER_NM);
                        tracing::debug!("{} drawn at ({:.0}, {:.0})", threat.id, offset.dx, offset.dy);
                    }
                }
                if let Some(client) = &weather {
                    for url in runtime.tiles_to_fetch(&aircraft) {
                        spawn_tile_fetch(client.clone(), url, tx.clone());
                    }
                }
            }
            _ = metar_timer.tick() => {
                if let Some(client) = &weather {
                    if let Some(ticket) = runtime.begin(FeedKind::Metar) {
                        let radius = runtime.session().weather().rules().nearby_radius_nm;
                        spawn_metar_fetch(client.clone(), ticket, *sim.ownship(), radius, tx.clone());
                    }
                }
            }
            _ = radar_timer.tick() => {
                if let Some(client) = &weather {
                    if let Some(ticket) = runtime.begin(FeedKind::Radar) {
                        spawn_radar_fetch(client.clone(), ticket, tx.clone());
                    }
                }
            }
            _ = elevation_timer.tick() => {
                if let Some(client) = &elevation {
                    if let Some(ticket) = runtime.begin(FeedKind::Elevation) {
                        spawn_elevation_fetch(client.clone(), ticket, *sim.ownship(), tx.clone());
                    }
                }
            }
            Some(update) = rx.recv() => {
                runtime.apply(update, Utc::now());
            }
            _ = &mut deadline => {
                tracing::info!("Run finished after {:.0} s simulated", sim.elapsed_secs());
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    let session = runtime.session();
    tracing::info!(
        "Final state: TAWS {}, {} targets, {} stations, {} radar tiles, terrain {:?}",
        session.taws().current_level(),
        session.traffic().len(),
        session.weather().station_count(),
        session.weather().tiles().len(),
        session.terrain().stats()
    );
    Ok(())
}

fn client_or_warn<T>(name: &str, client: Result<T, FeedError>) -> Option<T> {
    match client {
        Ok(client) => Some(client),
        Err(err) => {
            tracing::warn!("{} feed disabled: {}", name, err);
            None
        }
    }
}

fn spawn_metar_fetch(
    client: WeatherClient,
    ticket: Ticket<FeedKind>,
    at: AircraftState,
    radius_nm: f64,
    tx: mpsc::Sender<FeedUpdate>,
) {
    tokio::spawn(async move {
        let outcome = client.nearby_metars(at.lat, at.lon, radius_nm).await;
        let _ = tx.send(FeedUpdate::Metars { ticket, outcome }).await;
    });
}

fn spawn_radar_fetch(client: WeatherClient, ticket: Ticket<FeedKind>, tx: mpsc::Sender<FeedUpdate>) {
    tokio::spawn(async move {
        let outcome = client.radar_index().await;
        let _ = tx.send(FeedUpdate::Radar { ticket, outcome }).await;
    });
}

fn spawn_elevation_fetch(
    client: ElevationClient,
    ticket: Ticket<FeedKind>,
    at: AircraftState,
    tx: mpsc::Sender<FeedUpdate>,
) {
    tokio::spawn(async move {
        let outcome = client.elevation_ft(at.lat, at.lon).await;
        let _ = tx.send(FeedUpdate::Elevation { ticket, outcome }).await;
    });
}

fn spawn_tile_fetch(client: WeatherClient, url: String, tx: mpsc::Sender<FeedUpdate>) {
    tokio::spawn(async move {
        let outcome = client.radar_tile(&url).await;
        let _ = tx.send(FeedUpdate::Tile { url, outcome }).await;
    });
}

pub mod bounded;
pub mod error;
pub mod models;
pub mod rules;
pub mod sequence;
pub mod session;
pub mod spatial;
pub mod taws;
pub mod terrain;
pub mod traffic;
pub mod weather;

pub use bounded::BoundedMap;
pub use error::{OverlayError, Result};
pub use models::AircraftState;
pub use rules::{OverlayRules, TawsRules, TerrainRules, ThreatTier, TrafficRules, WeatherRules};
pub use sequence::{RequestSequencer, Ticket};
pub use session::{OverlaySession, UpdateOutcome};
pub use spatial::{bearing_deg, distance_nm, project, RotationMode, ScreenOffset};
pub use taws::{AlertEvent, AlertLevel, AlertState, Clearance, TawsEngine};
pub use terrain::{
    synthetic_elevation_ft, CacheStats, ElevationSource, GridKey, TerrainBand, TerrainCache,
    TerrainCell, TerrainGrid,
};
pub use traffic::{
    classify_threat, SweepReport, TargetPosition, ThreatLevel, TrafficObservation, TrafficStore,
    TrafficTarget, TrafficThreat, TrendProjection,
};
pub use weather::{
    parse_metar, FlightCategory, MetarRecord, RadarFrame, RadarIndex, StationReport,
    StationWeather, TileCache, TileCoord, WeatherDataEngine, WindBarb,
};

//! Error type shared by the overlay core.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OverlayError {
    #[error("unknown flight category: {0}")]
    UnknownFlightCategory(String),

    #[error("unknown alert level: {0}")]
    UnknownAlertLevel(String),

    #[error("capacity must be greater than zero")]
    InvalidCapacity,

    #[error("tile {x}/{y} out of range for zoom {zoom}")]
    TileOutOfRange { zoom: u8, x: u32, y: u32 },

    #[error("position {lat},{lon} cannot be mapped to a tile")]
    InvalidTilePosition { lat: f64, lon: f64 },

    #[error("report contains no recognizable METAR groups")]
    EmptyReport,
}

pub type Result<T> = std::result::Result<T, OverlayError>;

use super::metar::CloudLayer;
use crate::error::OverlayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Flight rules category derived from ceiling and visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FlightCategory {
    #[serde(rename = "VFR")]
    Vfr,
    #[serde(rename = "MVFR")]
    Mvfr,
    #[serde(rename = "IFR")]
    Ifr,
    #[serde(rename = "LIFR")]
    Lifr,
}

impl FlightCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightCategory::Vfr => "VFR",
            FlightCategory::Mvfr => "MVFR",
            FlightCategory::Ifr => "IFR",
            FlightCategory::Lifr => "LIFR",
        }
    }

    /// Conventional chart color for the station marker.
    pub fn color(&self) -> &'static str {
        match self {
            FlightCategory::Vfr => "#00C000",
            FlightCategory::Mvfr => "#0060FF",
            FlightCategory::Ifr => "#FF0000",
            FlightCategory::Lifr => "#FF00FF",
        }
    }
}

impl fmt::Display for FlightCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightCategory {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VFR" => Ok(FlightCategory::Vfr),
            "MVFR" => Ok(FlightCategory::Mvfr),
            "IFR" => Ok(FlightCategory::Ifr),
            "LIFR" => Ok(FlightCategory::Lifr),
            _ => Err(OverlayError::UnknownFlightCategory(s.to_string())),
        }
    }
}

/// Lowest broken, overcast or vertical-visibility base with a known height.
pub fn ceiling_ft(layers: &[CloudLayer]) -> Option<u32> {
    layers
        .iter()
        .filter(|layer| layer.cover.is_ceiling())
        .filter_map(|layer| layer.base_ft)
        .min()
}

/// A missing ceiling or visibility counts as unlimited.
pub fn classify_flight_category(ceiling_ft: Option<u32>, visibility_sm: Option<f64>) -> FlightCategory {
    let ceiling = ceiling_ft.map(f64::from).unwrap_or(f64::INFINITY);
    let visibility = visibility_sm.unwrap_or(f64::INFINITY);

    if ceiling < 500.0 || visibility < 1.0 {
        FlightCategory::Lifr
    } else if ceiling < 1000.0 || visibility < 3.0 {
        FlightCategory::Ifr
    } else if ceiling <= 3000.0 || visibility <= 5.0 {
        FlightCategory::Mvfr
    } else {
        FlightCategory::Vfr
    }
}

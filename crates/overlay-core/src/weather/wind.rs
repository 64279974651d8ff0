use crate::spatial::normalize_deg;
use serde::{Deserialize, Serialize};

/// Winds below this speed are drawn as a calm circle.
pub const CALM_THRESHOLD_KT: f64 = 3.0;

/// Speeds above this are drawn as this speed.
pub const MAX_BARB_SPEED_KT: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarbElement {
    /// 50 kt
    Pennant,
    /// 10 kt
    LongBarb,
    /// 5 kt
    ShortBarb,
}

/// Drawing instructions for a station wind barb.
///
/// The staff points toward the direction the wind is coming from; elements are
/// listed from the staff tip inward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindBarb {
    pub calm: bool,
    pub staff_bearing_deg: f64,
    pub speed_kt: u32,
    pub elements: Vec<BarbElement>,
}

impl WindBarb {
    pub fn pennants(&self) -> usize {
        self.count(BarbElement::Pennant)
    }

    pub fn long_barbs(&self) -> usize {
        self.count(BarbElement::LongBarb)
    }

    pub fn short_barbs(&self) -> usize {
        self.count(BarbElement::ShortBarb)
    }

    fn count(&self, element: BarbElement) -> usize {
        self.elements.iter().filter(|e| **e == element).count()
    }
}

pub fn wind_barb(direction_deg: f64, speed_kt: f64) -> WindBarb {
    let staff_bearing_deg = normalize_deg(direction_deg);
    if !speed_kt.is_finite() || speed_kt < CALM_THRESHOLD_KT {
        return WindBarb {
            calm: true,
            staff_bearing_deg,
            speed_kt: 0,
            elements: Vec::new(),
        };
    }

    let rounded = ((speed_kt.min(MAX_BARB_SPEED_KT) / 5.0).round() * 5.0) as u32;
    let mut remaining = rounded;
    let mut elements = Vec::new();
    while remaining >= 50 {
        elements.push(BarbElement::Pennant);
        remaining -= 50;
    }
    while remaining >= 10 {
        elements.push(BarbElement::LongBarb);
        remaining -= 10;
    }
    if remaining >= 5 {
        elements.push(BarbElement::ShortBarb);
    }

    WindBarb {
        calm: false,
        staff_bearing_deg,
        speed_kt: rounded,
        elements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_wind_is_calm() {
        let barb = wind_barb(270.0, 2.9);
        assert!(barb.calm);
        assert!(barb.elements.is_empty());
        assert!(!wind_barb(270.0, 3.0).calm);
    }

    #[test]
    fn sixty_five_knots() {
        let barb = wind_barb(180.0, 65.0);
        assert_eq!(barb.speed_kt, 65);
        assert_eq!(barb.pennants(), 1);
        assert_eq!(barb.long_barbs(), 1);
        assert_eq!(barb.short_barbs(), 1);
        assert_eq!(barb.elements[0], BarbElement::Pennant);
    }

    #[test]
    fn rounds_to_nearest_five() {
        assert_eq!(wind_barb(0.0, 12.0).speed_kt, 10);
        assert_eq!(wind_barb(0.0, 13.0).speed_kt, 15);
        // 3 kt rounds to a single short barb
        let barb = wind_barb(0.0, 3.0);
        assert_eq!(barb.speed_kt, 5);
        assert_eq!(barb.short_barbs(), 1);
    }

    #[test]
    fn extreme_speed_is_capped() {
        let barb = wind_barb(90.0, 1e12);
        assert_eq!(barb.speed_kt, 500);
        assert_eq!(barb.pennants(), 10);
        assert_eq!(barb.elements.len(), 10);
        assert_eq!(wind_barb(90.0, f64::INFINITY).elements.len(), 0);
    }

    #[test]
    fn staff_points_into_the_wind() {
        assert_eq!(wind_barb(-90.0, 20.0).staff_bearing_deg, 270.0);
        assert_eq!(wind_barb(360.0, 20.0).staff_bearing_deg, 0.0);
    }
}

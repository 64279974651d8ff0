//! METAR tokenizer.
//!
//! Groups are recognized left to right in their report order. A token that
//! does not fit any group still expected at its position is skipped, so a
//! damaged report still yields every group that could be read.

use super::category::{ceiling_ft, classify_flight_category, FlightCategory};
use crate::error::OverlayError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const METERS_PER_SM: f64 = 1609.344;
const KT_PER_MPS: f64 = 1.943_844;
const KT_PER_KMH: f64 = 0.539_957;
const HPA_TO_INHG: f64 = 0.029_53;

const DESCRIPTORS: [&str; 8] = ["MI", "PR", "BC", "DR", "BL", "SH", "TS", "FZ"];
const PHENOMENA: [&str; 22] = [
    "DZ", "RA", "SN", "SG", "IC", "PL", "GR", "GS", "UP", "BR", "FG", "FU", "VA", "DU", "SA",
    "HZ", "PY", "PO", "SQ", "FC", "SS", "DS",
];

/// Day of month and UTC time of observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationTime {
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl ObservationTime {
    fn minutes_in_month(&self) -> i32 {
        (self.day as i32 * 24 + self.hour as i32) * 60 + self.minute as i32
    }

    /// Ordering that tolerates a month rollover between the two reports.
    pub fn is_newer_than(&self, other: &ObservationTime) -> bool {
        let delta = self.minutes_in_month() - other.minutes_in_month();
        let half_month = 15 * 24 * 60;
        if delta.abs() > half_month {
            delta < 0
        } else {
            delta > 0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wind {
    /// `None` when reported as variable (VRB)
    pub direction_deg: Option<u16>,
    pub speed_kt: u16,
    pub gust_kt: Option<u16>,
    pub variable: bool,
    /// Extremes of a `dddVddd` variation group
    pub variable_range: Option<(u16, u16)>,
}

impl Wind {
    pub fn is_calm(&self) -> bool {
        self.speed_kt == 0 && self.gust_kt.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityUnit {
    StatuteMiles,
    Meters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityBound {
    /// `P6SM`: more than the value
    Above,
    /// `M1/4SM`: less than the value
    Below,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visibility {
    /// Value as reported, without unit or bound (`"10"`, `"1 1/2"`, `"9999"`)
    pub value: String,
    pub unit: VisibilityUnit,
    pub bound: Option<VisibilityBound>,
    pub statute_miles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunwayVisualRange {
    pub runway: String,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Light,
    Moderate,
    Heavy,
    Vicinity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherPhenomenon {
    pub raw: String,
    pub intensity: Intensity,
    pub descriptor: Option<String>,
    pub phenomena: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudCover {
    #[serde(rename = "FEW")]
    Few,
    #[serde(rename = "SCT")]
    Scattered,
    #[serde(rename = "BKN")]
    Broken,
    #[serde(rename = "OVC")]
    Overcast,
    #[serde(rename = "VV")]
    VerticalVisibility,
}

impl CloudCover {
    /// Layers that constitute a ceiling.
    pub fn is_ceiling(self) -> bool {
        matches!(
            self,
            CloudCover::Broken | CloudCover::Overcast | CloudCover::VerticalVisibility
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudType {
    #[serde(rename = "CB")]
    Cumulonimbus,
    #[serde(rename = "TCU")]
    ToweringCumulus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudLayer {
    pub cover: CloudCover,
    /// Base above ground in feet; `None` when reported as `///`
    pub base_ft: Option<u32>,
    pub cloud_type: Option<CloudType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AltimeterUnit {
    InchesHg,
    Hectopascals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Altimeter {
    /// Formatted setting: `"30.05"` for inHg, `"1013"` for hPa
    pub value: String,
    pub unit: AltimeterUnit,
}

impl Altimeter {
    pub fn inches_hg(&self) -> Option<f64> {
        let value: f64 = self.value.parse().ok()?;
        Some(match self.unit {
            AltimeterUnit::InchesHg => value,
            AltimeterUnit::Hectopascals => value * HPA_TO_INHG,
        })
    }
}

/// Structured form of one report. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetarRecord {
    pub raw: String,
    pub station: Option<String>,
    pub time: Option<ObservationTime>,
    pub automated: bool,
    pub corrected: bool,
    pub wind: Option<Wind>,
    pub visibility: Option<Visibility>,
    pub cavok: bool,
    pub runway_visual_range: Vec<RunwayVisualRange>,
    pub weather: Vec<WeatherPhenomenon>,
    pub clouds: Vec<CloudLayer>,
    pub sky_clear: bool,
    pub temp_c: Option<i32>,
    pub dewpoint_c: Option<i32>,
    pub altimeter: Option<Altimeter>,
    pub remarks: Option<String>,
    pub category: FlightCategory,
}

impl MetarRecord {
    fn blank(raw: &str) -> Self {
        Self {
            raw: raw.trim().to_string(),
            station: None,
            time: None,
            automated: false,
            corrected: false,
            wind: None,
            visibility: None,
            cavok: false,
            runway_visual_range: Vec::new(),
            weather: Vec::new(),
            clouds: Vec::new(),
            sky_clear: false,
            temp_c: None,
            dewpoint_c: None,
            altimeter: None,
            remarks: None,
            category: FlightCategory::Vfr,
        }
    }

    pub fn ceiling_ft(&self) -> Option<u32> {
        ceiling_ft(&self.clouds)
    }

    pub fn visibility_sm(&self) -> Option<f64> {
        self.visibility.as_ref().map(|v| v.statute_miles)
    }

    fn has_content(&self) -> bool {
        self.station.is_some()
            || self.time.is_some()
            || self.wind.is_some()
            || self.visibility.is_some()
            || !self.clouds.is_empty()
            || self.temp_c.is_some()
            || self.altimeter.is_some()
    }
}

impl FromStr for MetarRecord {
    type Err = OverlayError;

    /// Strict variant of [`parse_metar`]: rejects input with no recognizable group.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let record = parse_metar(s);
        if record.has_content() {
            Ok(record)
        } else {
            Err(OverlayError::EmptyReport)
        }
    }
}

/// Position in the report; groups are only accepted at or after the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Station,
    Time,
    Modifier,
    Wind,
    WindVariation,
    Visibility,
    RunwayVisualRange,
    Weather,
    Clouds,
    Temperature,
    Altimeter,
    Remarks,
}

const STAGES: [Stage; 11] = [
    Stage::Station,
    Stage::Time,
    Stage::Modifier,
    Stage::Wind,
    Stage::WindVariation,
    Stage::Visibility,
    Stage::RunwayVisualRange,
    Stage::Weather,
    Stage::Clouds,
    Stage::Temperature,
    Stage::Altimeter,
];

impl Stage {
    fn repeats(self) -> bool {
        matches!(
            self,
            Stage::Modifier | Stage::RunwayVisualRange | Stage::Weather | Stage::Clouds
        )
    }

    fn next(self) -> Stage {
        STAGES
            .iter()
            .copied()
            .find(|stage| *stage > self)
            .unwrap_or(Stage::Remarks)
    }
}

/// Parse a raw report. Never fails; unreadable tokens are skipped.
pub fn parse_metar(raw: &str) -> MetarRecord {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let mut record = MetarRecord::blank(raw);
    let mut stage = Stage::Station;
    let mut remarks: Vec<&str> = Vec::new();
    let mut idx = 0;

    if matches!(tokens.first(), Some(&"METAR") | Some(&"SPECI")) {
        idx = 1;
    }

    while idx < tokens.len() {
        let token = tokens[idx];
        if token == "RMK" {
            remarks.extend_from_slice(&tokens[idx + 1..]);
            break;
        }
        if stage == Stage::Remarks {
            remarks.push(token);
            idx += 1;
            continue;
        }

        let mut consumed = 0;
        for candidate in STAGES.iter().copied().filter(|s| *s >= stage) {
            if let Some(count) = parse_group(candidate, &mut record, &tokens, idx) {
                consumed = count;
                stage = if candidate.repeats() { candidate } else { candidate.next() };
                break;
            }
        }

        if consumed == 0 {
            tracing::trace!("Skipping unrecognized METAR token {}", token);
            idx += 1;
        } else {
            idx += consumed;
        }
    }

    if !remarks.is_empty() {
        record.remarks = Some(remarks.join(" "));
    }
    record.category = classify_flight_category(record.ceiling_ft(), record.visibility_sm());
    record
}

/// Try one group at `tokens[idx]`; returns the number of tokens consumed.
fn parse_group(stage: Stage, record: &mut MetarRecord, tokens: &[&str], idx: usize) -> Option<usize> {
    let token = tokens[idx];
    match stage {
        Stage::Station => {
            record.station = Some(parse_station(token)?);
            Some(1)
        }
        Stage::Time => {
            record.time = Some(parse_time(token)?);
            Some(1)
        }
        Stage::Modifier => match token {
            "AUTO" => {
                record.automated = true;
                Some(1)
            }
            "COR" | "CCA" => {
                record.corrected = true;
                Some(1)
            }
            _ => None,
        },
        Stage::Wind => {
            record.wind = Some(parse_wind(token)?);
            Some(1)
        }
        Stage::WindVariation => {
            let range = parse_wind_variation(token)?;
            let wind = record.wind.as_mut()?;
            wind.variable_range = Some(range);
            Some(1)
        }
        Stage::Visibility => {
            if token == "CAVOK" {
                record.cavok = true;
                record.sky_clear = true;
                record.visibility = Some(Visibility {
                    value: "9999".to_string(),
                    unit: VisibilityUnit::Meters,
                    bound: None,
                    statute_miles: 10_000.0 / METERS_PER_SM,
                });
                return Some(1);
            }
            let (visibility, consumed) = parse_visibility(tokens, idx)?;
            record.visibility = Some(visibility);
            Some(consumed)
        }
        Stage::RunwayVisualRange => {
            record.runway_visual_range.push(parse_rvr(token)?);
            Some(1)
        }
        Stage::Weather => {
            record.weather.push(parse_weather(token)?);
            Some(1)
        }
        Stage::Clouds => {
            if matches!(token, "SKC" | "CLR" | "NSC" | "NCD") {
                record.sky_clear = true;
                return Some(1);
            }
            record.clouds.push(parse_cloud(token)?);
            Some(1)
        }
        Stage::Temperature => {
            let (temp, dew) = parse_temperature(token)?;
            record.temp_c = Some(temp);
            record.dewpoint_c = dew;
            Some(1)
        }
        Stage::Altimeter => {
            record.altimeter = Some(parse_altimeter(token)?);
            Some(1)
        }
        Stage::Remarks => None,
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_station(token: &str) -> Option<String> {
    let bytes = token.as_bytes();
    if bytes.len() != 4 || !bytes[0].is_ascii_uppercase() {
        return None;
    }
    if !bytes.iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
        return None;
    }
    if matches!(token, "AUTO" | "NIL" | "NOSIG") {
        return None;
    }
    Some(token.to_string())
}

fn parse_time(token: &str) -> Option<ObservationTime> {
    let digits = token.strip_suffix('Z')?;
    if digits.len() != 6 || !all_digits(digits) {
        return None;
    }
    let day: u8 = digits[0..2].parse().ok()?;
    let hour: u8 = digits[2..4].parse().ok()?;
    let minute: u8 = digits[4..6].parse().ok()?;
    if !(1..=31).contains(&day) || hour > 23 || minute > 59 {
        return None;
    }
    Some(ObservationTime { day, hour, minute })
}

fn parse_wind(token: &str) -> Option<Wind> {
    let (body, factor) = if let Some(body) = token.strip_suffix("KT") {
        (body, 1.0)
    } else if let Some(body) = token.strip_suffix("MPS") {
        (body, KT_PER_MPS)
    } else if let Some(body) = token.strip_suffix("KMH") {
        (body, KT_PER_KMH)
    } else {
        return None;
    };
    if body.len() < 5 || !body.is_char_boundary(3) {
        return None;
    }

    let (dir_part, speed_part) = body.split_at(3);
    let (direction_deg, variable) = if dir_part == "VRB" {
        (None, true)
    } else if all_digits(dir_part) {
        let dir: u16 = dir_part.parse().ok()?;
        if dir > 360 {
            return None;
        }
        (Some(dir), false)
    } else {
        return None;
    };

    let (speed_raw, gust_raw) = match speed_part.split_once('G') {
        Some((speed, gust)) => (speed, Some(gust)),
        None => (speed_part, None),
    };
    let convert = |raw: &str| -> Option<u16> {
        if !(2..=3).contains(&raw.len()) || !all_digits(raw) {
            return None;
        }
        let value: f64 = raw.parse().ok()?;
        Some((value * factor).round() as u16)
    };

    let speed_kt = convert(speed_raw)?;
    let gust_kt = match gust_raw {
        Some(raw) => Some(convert(raw)?),
        None => None,
    };

    Some(Wind {
        direction_deg,
        speed_kt,
        gust_kt,
        variable,
        variable_range: None,
    })
}

fn parse_wind_variation(token: &str) -> Option<(u16, u16)> {
    let (from, to) = token.split_once('V')?;
    if from.len() != 3 || to.len() != 3 || !all_digits(from) || !all_digits(to) {
        return None;
    }
    let from: u16 = from.parse().ok()?;
    let to: u16 = to.parse().ok()?;
    if from > 360 || to > 360 {
        return None;
    }
    Some((from, to))
}

/// Parse `"1/2"`, `"10"` or `"1 1/2"` into a number.
fn parse_statute_value(value: &str) -> Option<f64> {
    let mut total = 0.0;
    for part in value.split(' ') {
        if let Some((num, den)) = part.split_once('/') {
            if !all_digits(num) || !all_digits(den) {
                return None;
            }
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            total += num / den;
        } else {
            if !all_digits(part) {
                return None;
            }
            total += part.parse::<f64>().ok()?;
        }
    }
    Some(total)
}

fn parse_visibility(tokens: &[&str], idx: usize) -> Option<(Visibility, usize)> {
    let token = tokens[idx];

    // Whole number followed by a fraction: "1 1/2SM"
    if all_digits(token) && token.len() == 1 {
        let next = tokens.get(idx + 1)?;
        let fraction = next.strip_suffix("SM")?;
        if !fraction.contains('/') {
            return None;
        }
        let value = format!("{} {}", token, fraction);
        let statute_miles = parse_statute_value(&value)?;
        return Some((
            Visibility {
                value,
                unit: VisibilityUnit::StatuteMiles,
                bound: None,
                statute_miles,
            },
            2,
        ));
    }

    if let Some(body) = token.strip_suffix("SM") {
        let (bound, value) = if let Some(rest) = body.strip_prefix('P') {
            (Some(VisibilityBound::Above), rest)
        } else if let Some(rest) = body.strip_prefix('M') {
            (Some(VisibilityBound::Below), rest)
        } else {
            (None, body)
        };
        let statute_miles = parse_statute_value(value)?;
        return Some((
            Visibility {
                value: value.to_string(),
                unit: VisibilityUnit::StatuteMiles,
                bound,
                statute_miles,
            },
            1,
        ));
    }

    // Metric visibility, optionally followed by a direction ("4000NE")
    let digits = token.get(0..4)?;
    let suffix = &token[4..];
    if !all_digits(digits) || !matches!(suffix, "" | "N" | "NE" | "E" | "SE" | "S" | "SW" | "W" | "NW" | "NDV") {
        return None;
    }
    let meters: f64 = digits.parse().ok()?;
    Some((
        Visibility {
            value: digits.to_string(),
            unit: VisibilityUnit::Meters,
            bound: if digits == "9999" { Some(VisibilityBound::Above) } else { None },
            statute_miles: meters / METERS_PER_SM,
        },
        1,
    ))
}

fn parse_rvr(token: &str) -> Option<RunwayVisualRange> {
    let body = token.strip_prefix('R')?;
    let (runway, range) = body.split_once('/')?;
    if !runway.get(0..2).is_some_and(all_digits) || range.is_empty() {
        return None;
    }
    Some(RunwayVisualRange {
        runway: runway.to_string(),
        raw: token.to_string(),
    })
}

fn parse_weather(token: &str) -> Option<WeatherPhenomenon> {
    let (intensity, rest) = if let Some(rest) = token.strip_prefix('+') {
        (Intensity::Heavy, rest)
    } else if let Some(rest) = token.strip_prefix('-') {
        (Intensity::Light, rest)
    } else if let Some(rest) = token.strip_prefix("VC") {
        (Intensity::Vicinity, rest)
    } else {
        (Intensity::Moderate, token)
    };

    if !rest.is_ascii() {
        return None;
    }

    let (descriptor, rest) = match rest.get(0..2) {
        Some(prefix) if DESCRIPTORS.contains(&prefix) => (Some(prefix.to_string()), &rest[2..]),
        _ => (None, rest),
    };

    if rest.len() % 2 != 0 {
        return None;
    }
    let mut phenomena = Vec::with_capacity(rest.len() / 2);
    for start in (0..rest.len()).step_by(2) {
        let code = &rest[start..start + 2];
        if !PHENOMENA.contains(&code) {
            return None;
        }
        phenomena.push(code.to_string());
    }
    if phenomena.is_empty() && descriptor.is_none() {
        return None;
    }

    Some(WeatherPhenomenon {
        raw: token.to_string(),
        intensity,
        descriptor,
        phenomena,
    })
}

fn parse_cloud(token: &str) -> Option<CloudLayer> {
    let (cover, rest) = if let Some(rest) = token.strip_prefix("FEW") {
        (CloudCover::Few, rest)
    } else if let Some(rest) = token.strip_prefix("SCT") {
        (CloudCover::Scattered, rest)
    } else if let Some(rest) = token.strip_prefix("BKN") {
        (CloudCover::Broken, rest)
    } else if let Some(rest) = token.strip_prefix("OVC") {
        (CloudCover::Overcast, rest)
    } else if let Some(rest) = token.strip_prefix("VV") {
        (CloudCover::VerticalVisibility, rest)
    } else {
        return None;
    };

    let height = rest.get(0..3)?;
    let base_ft = if height == "///" {
        None
    } else if all_digits(height) {
        Some(height.parse::<u32>().ok()? * 100)
    } else {
        return None;
    };

    let cloud_type = match &rest[3..] {
        "" | "///" => None,
        "CB" => Some(CloudType::Cumulonimbus),
        "TCU" => Some(CloudType::ToweringCumulus),
        _ => return None,
    };

    Some(CloudLayer {
        cover,
        base_ft,
        cloud_type,
    })
}

fn parse_signed_temp(raw: &str) -> Option<i32> {
    let (negative, digits) = match raw.strip_prefix('M') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    if digits.len() != 2 || !all_digits(digits) {
        return None;
    }
    let value: i32 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

fn parse_temperature(token: &str) -> Option<(i32, Option<i32>)> {
    let (temp, dew) = token.split_once('/')?;
    let temp = parse_signed_temp(temp)?;
    let dew = if dew.is_empty() || dew == "//" {
        None
    } else {
        Some(parse_signed_temp(dew)?)
    };
    Some((temp, dew))
}

fn parse_altimeter(token: &str) -> Option<Altimeter> {
    let (unit, digits) = if let Some(rest) = token.strip_prefix('A') {
        (AltimeterUnit::InchesHg, rest)
    } else if let Some(rest) = token.strip_prefix('Q') {
        (AltimeterUnit::Hectopascals, rest)
    } else {
        return None;
    };
    if digits.len() != 4 || !all_digits(digits) {
        return None;
    }
    let value = match unit {
        AltimeterUnit::InchesHg => format!("{}.{}", &digits[0..2], &digits[2..4]),
        AltimeterUnit::Hectopascals => digits.trim_start_matches('0').to_string(),
    };
    Some(Altimeter { value, unit })
}

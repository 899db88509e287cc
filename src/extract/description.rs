//! Parser for the CWA composite weather-description sentence
//! (天氣預報綜合描述).
//!
//! The sentence is a fixed template of period-delimited clauses, e.g.
//! `多雲。降雨機率20%。悶熱。體感舒適。溫度攝氏26至31度。東北風風速3-4級。相對濕度70至90%`.
//! Parsing is best-effort: a clause that fails to parse is logged and
//! skipped, never aborting the other fields.

use serde::Serialize;
use tracing::warn;

const CLAUSE_SEPARATOR: char = '。';
const RAIN_PROB_MARKER: &str = "降雨機率";
const TEMP_MARKER: &str = "溫度攝氏";
const DEGREE_TOKEN: char = '度';
const WIND_CUE: char = '風';
const WIND_SPEED_MARKER: &str = "風速";
const WIND_LEVEL_TOKEN: char = '級';
const HUMIDITY_MARKER: &str = "相對濕度";
const RANGE_SEPARATOR: char = '至';

/// Structured fields extracted from one description sentence.
///
/// Absent clauses leave their field `None`, and `None` fields are omitted
/// from the serialized document.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DescriptionFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(rename = "rainProb", skip_serializing_if = "Option::is_none")]
    pub rain_prob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comfort: Option<String>,
    #[serde(rename = "minTemp", skip_serializing_if = "Option::is_none")]
    pub min_temp: Option<f64>,
    #[serde(rename = "maxTemp", skip_serializing_if = "Option::is_none")]
    pub max_temp: Option<f64>,
    /// Single-point temperature, for clauses without a range.
    #[serde(rename = "Temp", skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(rename = "windDirection", skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<String>,
    #[serde(rename = "windSpeed", skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<String>,
}

/// Parses a description sentence into its structured fields.
///
/// The comfort text is positional, not marked: with a rain-probability
/// clause present it sits at clause index 3, otherwise at index 2. The
/// upstream template guarantees this layout; a template change upstream
/// would shift it silently.
pub fn parse_weather_description(description: &str) -> DescriptionFields {
    let mut data = DescriptionFields::default();
    let parts: Vec<&str> = description.split(CLAUSE_SEPARATOR).collect();

    if let Some(first) = parts.first() {
        if !first.is_empty() {
            data.weather = Some(first.trim().to_string());
        }
    }

    for part in &parts {
        if part.is_empty() {
            continue;
        }

        if let Some((_, prob)) = part.split_once(RAIN_PROB_MARKER) {
            data.rain_prob = Some(prob.trim().to_string());
            if parts.len() > 3 {
                data.comfort = Some(parts[3].trim().to_string());
            }
        } else if let Some((_, rest)) = part.split_once(TEMP_MARKER) {
            let temp_text = rest.split(DEGREE_TOKEN).next().unwrap_or("");
            parse_temperature(temp_text, &mut data);
        } else if part.contains(WIND_CUE) && part.contains(WIND_SPEED_MARKER) {
            parse_wind(part, &mut data);
        } else if let Some((_, rest)) = part.split_once(HUMIDITY_MARKER) {
            let humidity = rest.trim();
            data.humidity = Some(match humidity.split_once(RANGE_SEPARATOR) {
                Some((_, upper)) => upper.trim().to_string(),
                None => humidity.to_string(),
            });
        }
    }

    // Without a rain-probability clause the template shifts left by one.
    if data.rain_prob.is_none() && parts.len() > 2 {
        data.comfort = Some(parts[2].trim().to_string());
    }

    data
}

fn parse_temperature(temp_text: &str, data: &mut DescriptionFields) {
    if let Some((lo, hi)) = temp_text.split_once(RANGE_SEPARATOR) {
        match (lo.trim().parse::<f64>(), hi.trim().parse::<f64>()) {
            (Ok(lo), Ok(hi)) => {
                data.min_temp = Some(lo);
                data.max_temp = Some(hi);
            }
            _ => warn!(clause = %temp_text, "temperature range failed numeric conversion"),
        }
    } else {
        match temp_text.trim().parse::<f64>() {
            Ok(t) => data.temp = Some(t),
            Err(_) => warn!(clause = %temp_text, "temperature failed numeric conversion"),
        }
    }
}

fn parse_wind(part: &str, data: &mut DescriptionFields) {
    // Direction is everything before the first 風, e.g. 東北風 → 東北.
    if let Some(direction_end) = part.find(WIND_CUE) {
        if direction_end > 0 {
            data.wind_direction = Some(part[..direction_end].trim().to_string());
        }
    }

    let Some((_, speed_text)) = part.split_once(WIND_SPEED_MARKER) else {
        return;
    };
    let level = speed_text.split(WIND_LEVEL_TOKEN).next().unwrap_or("").trim();

    if level.contains('-') {
        // Range form like 3-4級: keep the upper bound.
        let upper = level.split('-').nth(1).unwrap_or("");
        match upper.trim().parse::<i64>() {
            Ok(v) => data.wind_speed = Some(v),
            Err(_) => warn!(clause = %part, "wind speed range failed numeric conversion"),
        }
    } else {
        // Single level, possibly with noise like `<= 1級`.
        let digits: String = level.chars().filter(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            match digits.parse::<i64>() {
                Ok(v) => data.wind_speed = Some(v),
                Err(_) => warn!(clause = %part, "wind speed failed numeric conversion"),
            }
        }
    }
}

//! Air quality extraction (MOENV hourly per-site feed).
//!
//! The feed is flat records with stringly-typed numerics and a mix of
//! empty-string and `--` placeholders, so every measurement goes
//! through a defaulting cast.

use super::{ExtractError, taipei, value_string};
use crate::store::{Document, location_hash};
use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

/// Placeholder written for measurements the site did not report.
const MISSING_MEASUREMENT: f64 = -99.0;

const PUBLISH_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurements {
    pub aqi: i64,
    pub status: Option<String>,
    pub so2: f64,
    pub co: f64,
    pub o3: f64,
    pub o3_8hr: f64,
    pub pm10: f64,
    pub pm2_5: f64,
    pub no2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AirQualityRecord {
    pub station_id: String,
    pub station_name: String,
    pub county: String,
    pub latitude: f64,
    pub longitude: f64,
    pub measurements: Measurements,
    pub publish_time: String,
    pub timestamp: f64,
}

impl Document for AirQualityRecord {
    fn collection(&self) -> &'static str {
        "air_quality"
    }

    fn doc_id(&self) -> String {
        format!("{}_{}", self.station_name, self.station_id)
    }

    fn to_document(&self) -> Result<Value> {
        Ok(json!({
            "id": self.doc_id(),
            "stationId": self.station_id,
            "stationName": self.station_name,
            "county": self.county,
            "location": {
                "latitude": self.latitude,
                "longitude": self.longitude,
            },
            "geohash": location_hash(self.latitude, self.longitude)?,
            "measurements": serde_json::to_value(&self.measurements)?,
            "publishTime": self.publish_time,
            "timestamp": self.timestamp,
        }))
    }
}

/// Extracts per-site air quality records. A site with an unparseable
/// publish time is skipped with a warning.
pub fn extract_air_quality(raw: &Value) -> Result<Vec<AirQualityRecord>> {
    let stations = raw
        .pointer("/records")
        .and_then(Value::as_array)
        .ok_or(ExtractError::MissingKey("records"))?;

    let mut records = Vec::new();
    for station in stations {
        let station_id = station
            .get("siteid")
            .and_then(value_string)
            .unwrap_or_default();
        let publish_time = station
            .get("publishtime")
            .and_then(value_string)
            .unwrap_or_default();
        let Some(timestamp) = publish_timestamp(&publish_time) else {
            warn!(station = %station_id, time = %publish_time, "bad publish time, site skipped");
            continue;
        };

        records.push(AirQualityRecord {
            station_id,
            station_name: station
                .get("sitename")
                .and_then(value_string)
                .unwrap_or_default(),
            county: station
                .get("county")
                .and_then(value_string)
                .unwrap_or_default(),
            latitude: safe_f64(station.get("latitude"), 0.0),
            longitude: safe_f64(station.get("longitude"), 0.0),
            measurements: Measurements {
                aqi: safe_i64(station.get("aqi"), MISSING_MEASUREMENT as i64),
                status: station.get("status").and_then(value_string),
                so2: safe_f64(station.get("so2"), MISSING_MEASUREMENT),
                co: safe_f64(station.get("co"), MISSING_MEASUREMENT),
                o3: safe_f64(station.get("o3"), MISSING_MEASUREMENT),
                o3_8hr: safe_f64(station.get("o3_8hr"), MISSING_MEASUREMENT),
                pm10: safe_f64(station.get("pm10"), MISSING_MEASUREMENT),
                pm2_5: safe_f64(station.get("pm2.5"), MISSING_MEASUREMENT),
                no2: safe_f64(station.get("no2"), MISSING_MEASUREMENT),
            },
            publish_time,
            timestamp,
        });
    }

    Ok(records)
}

/// Publish times come without an offset and mean Taiwan local time.
fn publish_timestamp(s: &str) -> Option<f64> {
    let naive = NaiveDateTime::parse_from_str(s, PUBLISH_TIME_FORMAT).ok()?;
    Some(naive.and_local_timezone(taipei()).single()?.timestamp() as f64)
}

/// Numeric cast tolerant of the feed's placeholders (`""`, `--`, null).
fn safe_f64(v: Option<&Value>, default: f64) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) if !s.is_empty() && s != "--" => {
            s.trim().parse().unwrap_or(default)
        }
        _ => default,
    }
}

fn safe_i64(v: Option<&Value>, default: i64) -> i64 {
    match v {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
        Some(Value::String(s)) if !s.is_empty() && s != "--" => {
            s.trim().parse().unwrap_or(default)
        }
        _ => default,
    }
}

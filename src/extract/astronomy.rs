//! Sunrise/sunset and moonrise/moonset extraction.
//!
//! The two almanac feeds are merged county-by-county on
//! `{county}_{date}`: sun entries define the set, moon entries only
//! augment matching ones. A moon entry without a sun counterpart is
//! dropped.

use super::{ExtractError, value_string};
use crate::store::Document;
use anyhow::Result;
use chrono::Utc;
use serde_json::{Value, json};

const MISSING_TIME: &str = "N/A";

#[derive(Debug, Clone, PartialEq)]
pub struct AstronomyRecord {
    pub county_name: String,
    pub date: String,
    pub sunrise_time: String,
    pub sunset_time: String,
    pub moonrise_time: String,
    pub moonset_time: String,
    pub timestamp: f64,
}

impl Document for AstronomyRecord {
    fn collection(&self) -> &'static str {
        "sunrise_sunset"
    }

    /// One document per county, overwritten daily.
    fn doc_id(&self) -> String {
        self.county_name.clone()
    }

    fn to_document(&self) -> Result<Value> {
        Ok(json!({
            "id": self.doc_id(),
            "countyName": self.county_name,
            "date": self.date,
            "sunriseTime": self.sunrise_time,
            "sunsetTime": self.sunset_time,
            "moonriseTime": self.moonrise_time,
            "moonsetTime": self.moonset_time,
            "timestamp": self.timestamp,
        }))
    }
}

/// Merges the sun and moon almanac payloads into per-county records,
/// preserving the sun feed's ordering.
pub fn merge_astronomy(sun: &Value, moon: &Value) -> Result<Vec<AstronomyRecord>> {
    let sun_locations = locations(sun)?;
    let moon_locations = locations(moon)?;
    let now = Utc::now().timestamp() as f64;

    let mut records: Vec<AstronomyRecord> = Vec::new();
    for location in sun_locations {
        let Some(county_name) = location.get("CountyName").and_then(value_string) else {
            continue;
        };
        for entry in times(location) {
            let Some(date) = entry.get("Date").and_then(value_string) else {
                continue;
            };
            records.push(AstronomyRecord {
                county_name: county_name.clone(),
                date,
                sunrise_time: time_field(entry, "SunRiseTime"),
                sunset_time: time_field(entry, "SunSetTime"),
                moonrise_time: MISSING_TIME.to_string(),
                moonset_time: MISSING_TIME.to_string(),
                timestamp: now,
            });
        }
    }

    for location in moon_locations {
        let Some(county_name) = location.get("CountyName").and_then(value_string) else {
            continue;
        };
        for entry in times(location) {
            let Some(date) = entry.get("Date").and_then(value_string) else {
                continue;
            };
            if let Some(record) = records
                .iter_mut()
                .find(|r| r.county_name == county_name && r.date == date)
            {
                record.moonrise_time = time_field(entry, "MoonRiseTime");
                record.moonset_time = time_field(entry, "MoonSetTime");
            }
        }
    }

    Ok(records)
}

fn locations(raw: &Value) -> Result<&[Value], ExtractError> {
    raw.pointer("/records/locations/location")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or(ExtractError::MissingKey("records.locations.location"))
}

fn times(location: &Value) -> &[Value] {
    location
        .get("time")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Polar-night style gaps leave a time absent; store the N/A marker.
fn time_field(entry: &Value, key: &str) -> String {
    entry
        .get(key)
        .and_then(value_string)
        .unwrap_or_else(|| MISSING_TIME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn almanac(entries: Value) -> Value {
        json!({ "records": { "locations": { "location": entries } } })
    }

    #[test]
    fn test_sun_and_moon_merged_by_county_and_date() {
        let sun = almanac(json!([{
            "CountyName": "臺北市",
            "time": [
                { "Date": "2025-06-01", "SunRiseTime": "05:04", "SunSetTime": "18:43" }
            ]
        }]));
        let moon = almanac(json!([{
            "CountyName": "臺北市",
            "time": [
                { "Date": "2025-06-01", "MoonRiseTime": "10:12", "MoonSetTime": "23:55" }
            ]
        }]));

        let records = merge_astronomy(&sun, &moon).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.sunrise_time, "05:04");
        assert_eq!(record.moonrise_time, "10:12");
        assert_eq!(record.doc_id(), "臺北市");
        assert_eq!(record.collection(), "sunrise_sunset");
    }

    #[test]
    fn test_unmatched_sun_entry_keeps_na_moon_times() {
        let sun = almanac(json!([{
            "CountyName": "高雄市",
            "time": [{ "Date": "2025-06-01", "SunRiseTime": "05:10", "SunSetTime": "18:40" }]
        }]));
        let moon = almanac(json!([{
            "CountyName": "高雄市",
            "time": [{ "Date": "2025-06-02", "MoonRiseTime": "11:00" }]
        }]));

        let records = merge_astronomy(&sun, &moon).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].moonrise_time, "N/A");
        assert_eq!(records[0].moonset_time, "N/A");
    }

    #[test]
    fn test_moon_only_entry_dropped() {
        let sun = almanac(json!([]));
        let moon = almanac(json!([{
            "CountyName": "基隆市",
            "time": [{ "Date": "2025-06-01", "MoonRiseTime": "09:00" }]
        }]));

        let records = merge_astronomy(&sun, &moon).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_missing_location_nesting_is_error() {
        let sun = json!({ "records": {} });
        let moon = almanac(json!([]));
        assert!(merge_astronomy(&sun, &moon).is_err());
    }

    #[test]
    fn test_sun_feed_order_preserved() {
        let sun = almanac(json!([
            { "CountyName": "宜蘭縣", "time": [{ "Date": "2025-06-01", "SunRiseTime": "05:00", "SunSetTime": "18:40" }] },
            { "CountyName": "花蓮縣", "time": [{ "Date": "2025-06-01", "SunRiseTime": "05:02", "SunSetTime": "18:41" }] }
        ]));
        let moon = almanac(json!([]));

        let records = merge_astronomy(&sun, &moon).unwrap();
        let counties: Vec<&str> = records.iter().map(|r| r.county_name.as_str()).collect();
        assert_eq!(counties, vec!["宜蘭縣", "花蓮縣"]);
    }
}

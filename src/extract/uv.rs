//! UV index extraction.

use super::observation::wgs84_coordinates;
use super::{ExtractError, local_timestamp, value_i64, value_string};
use crate::store::{Document, location_hash};
use anyhow::Result;
use serde_json::{Value, json};
use tracing::warn;

/// Sentinel the feed uses for stations without a UV reading.
const NO_READING: i64 = -99;

#[derive(Debug, Clone, PartialEq)]
pub struct UvRecord {
    pub station_id: String,
    pub station_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub uv_index: i64,
    pub timestamp: f64,
}

impl Document for UvRecord {
    fn collection(&self) -> &'static str {
        "uv_index"
    }

    fn doc_id(&self) -> String {
        format!("{}_{}", self.station_name, self.station_id)
    }

    fn to_document(&self) -> Result<Value> {
        Ok(json!({
            "id": self.doc_id(),
            "stationId": self.station_id,
            "stationName": self.station_name,
            "location": {
                "latitude": self.latitude,
                "longitude": self.longitude,
            },
            "geohash": location_hash(self.latitude, self.longitude)?,
            "uvIndex": self.uv_index,
            "timestamp": self.timestamp,
        }))
    }
}

/// Extracts UV readings. Stations without a WGS84 coordinate or with
/// the -99 no-reading sentinel are dropped entirely.
pub fn extract_uv_index(raw: &Value) -> Result<Vec<UvRecord>> {
    let stations = raw
        .pointer("/records/Station")
        .and_then(Value::as_array)
        .ok_or(ExtractError::MissingKey("records.Station"))?;

    let mut records = Vec::new();
    for station in stations {
        let Some((latitude, longitude)) = wgs84_coordinates(station) else {
            continue;
        };
        let uv_index = station
            .pointer("/WeatherElement/UVIndex")
            .and_then(value_i64)
            .unwrap_or(NO_READING);
        if uv_index == NO_READING {
            continue;
        }
        let station_id = station
            .get("StationId")
            .and_then(value_string)
            .unwrap_or_default();
        let Some(timestamp) = station
            .pointer("/ObsTime/DateTime")
            .and_then(Value::as_str)
            .and_then(local_timestamp)
        else {
            warn!(station = %station_id, "uv observation time unparseable, skipped");
            continue;
        };

        records.push(UvRecord {
            station_id,
            station_name: station
                .get("StationName")
                .and_then(value_string)
                .unwrap_or_default(),
            latitude,
            longitude,
            uv_index,
            timestamp,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn station(id: &str, uv: Value) -> Value {
        json!({
            "StationId": id,
            "StationName": "測站",
            "GeoInfo": { "Coordinates": [
                { "CoordinateName": "WGS84", "StationLatitude": 23.5, "StationLongitude": 120.5 }
            ]},
            "ObsTime": { "DateTime": "2025-06-01T12:00:00+08:00" },
            "WeatherElement": { "UVIndex": uv }
        })
    }

    #[test]
    fn test_valid_reading_extracted_with_string_coercion() {
        let raw = json!({ "records": { "Station": [station("A", json!("7"))] } });
        let records = extract_uv_index(&raw).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uv_index, 7);
        assert_eq!(records[0].doc_id(), "測站_A");
    }

    #[test]
    fn test_no_reading_sentinel_dropped() {
        let raw = json!({ "records": { "Station": [
            station("A", json!(-99)),
            station("B", json!(3)),
        ]}});
        let records = extract_uv_index(&raw).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].station_id, "B");
    }

    #[test]
    fn test_document_nests_location() {
        let raw = json!({ "records": { "Station": [station("A", json!(5))] } });
        let doc = extract_uv_index(&raw).unwrap()[0].to_document().unwrap();

        assert_eq!(doc["location"]["latitude"], 23.5);
        assert_eq!(doc["uvIndex"], 5);
        assert_eq!(doc["geohash"].as_str().unwrap().len(), 7);
    }
}

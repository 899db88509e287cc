//! Surface observation extraction (automatic weather stations).

use super::{ExtractError, local_timestamp, value_f64, value_string};
use crate::store::{Document, location_hash};
use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

/// Observed values for one station, passed through mostly as-is.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Observations {
    pub weather: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub precipitation: Option<f64>,
    #[serde(rename = "windDirection")]
    pub wind_direction: Option<f64>,
    #[serde(rename = "windSpeed")]
    pub wind_speed: Option<f64>,
    #[serde(rename = "dailyHigh")]
    pub daily_high: DailyExtreme,
    #[serde(rename = "dailyLow")]
    pub daily_low: DailyExtreme,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DailyExtreme {
    pub temperature: Option<f64>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub station_id: String,
    pub station_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub observations: Observations,
    pub timestamp: f64,
}

impl Document for ObservationRecord {
    fn collection(&self) -> &'static str {
        "observations"
    }

    fn doc_id(&self) -> String {
        format!("{}_{}", self.station_name, self.station_id)
    }

    fn to_document(&self) -> Result<Value> {
        Ok(json!({
            "id": self.doc_id(),
            "stationId": self.station_id,
            "stationName": self.station_name,
            "latitude": self.latitude,
            "longitude": self.longitude,
            "geohash": location_hash(self.latitude, self.longitude)?,
            "observations": serde_json::to_value(&self.observations)?,
            "timestamp": self.timestamp,
        }))
    }
}

/// Extracts station observations. Stations without a WGS84 coordinate
/// or a parseable observation time are skipped.
pub fn extract_observations(raw: &Value) -> Result<Vec<ObservationRecord>> {
    let stations = raw
        .pointer("/records/Station")
        .and_then(Value::as_array)
        .ok_or(ExtractError::MissingKey("records.Station"))?;

    let mut records = Vec::new();
    for station in stations {
        let Some((latitude, longitude)) = wgs84_coordinates(station) else {
            continue;
        };
        let station_id = station
            .get("StationId")
            .and_then(value_string)
            .unwrap_or_default();
        let Some(timestamp) = station
            .pointer("/ObsTime/DateTime")
            .and_then(Value::as_str)
            .and_then(local_timestamp)
        else {
            warn!(station = %station_id, "observation time missing or unparseable, skipped");
            continue;
        };

        let element = station.get("WeatherElement").cloned().unwrap_or(Value::Null);
        records.push(ObservationRecord {
            station_id,
            station_name: station
                .get("StationName")
                .and_then(value_string)
                .unwrap_or_default(),
            latitude,
            longitude,
            observations: observations_from(&element),
            timestamp,
        });
    }

    Ok(records)
}

/// Picks the WGS84 entry out of a station's coordinate list.
pub(crate) fn wgs84_coordinates(station: &Value) -> Option<(f64, f64)> {
    let coordinates = station
        .pointer("/GeoInfo/Coordinates")
        .and_then(Value::as_array)?;
    let wgs84 = coordinates
        .iter()
        .find(|c| c.get("CoordinateName").and_then(Value::as_str) == Some("WGS84"))?;
    let latitude = wgs84.get("StationLatitude").and_then(value_f64)?;
    let longitude = wgs84.get("StationLongitude").and_then(value_f64)?;
    Some((latitude, longitude))
}

fn observations_from(element: &Value) -> Observations {
    Observations {
        weather: element.get("Weather").and_then(value_string),
        temperature: element.get("AirTemperature").and_then(value_f64),
        humidity: element.get("RelativeHumidity").and_then(value_f64),
        pressure: element.get("AirPressure").and_then(value_f64),
        precipitation: element.pointer("/Now/Precipitation").and_then(value_f64),
        wind_direction: element.get("WindDirection").and_then(value_f64),
        wind_speed: element.get("WindSpeed").and_then(value_f64),
        daily_high: daily_extreme(element, "DailyHigh"),
        daily_low: daily_extreme(element, "DailyLow"),
    }
}

fn daily_extreme(element: &Value, key: &str) -> DailyExtreme {
    let info = element
        .pointer(&format!("/DailyExtreme/{key}/TemperatureInfo"))
        .cloned()
        .unwrap_or(Value::Null);
    DailyExtreme {
        temperature: info.get("AirTemperature").and_then(value_f64),
        time: info
            .pointer("/Occurred_at/DateTime")
            .and_then(value_string),
    }
}

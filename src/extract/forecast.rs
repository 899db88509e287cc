//! Township forecast extraction (three-hour and weekly feeds).
//!
//! Both feeds share the same envelope: counties under
//! `records.locations`, townships under `Location`, and per-element
//! time series under `WeatherElement`. The composite description
//! element defines the periods; apparent-temperature elements are
//! merged into matching periods by their start time.

use super::description::{DescriptionFields, parse_weather_description};
use super::{ExtractError, local_timestamp, value_f64, value_string};
use crate::store::Document;
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

const DESCRIPTION_ELEMENT: &str = "天氣預報綜合描述";
const APPARENT_TEMP_ELEMENT: &str = "體感溫度";
const MAX_APPARENT_TEMP_ELEMENT: &str = "最高體感溫度";
const MIN_APPARENT_TEMP_ELEMENT: &str = "最低體感溫度";

/// One three-hour forecast period. `apparent_temperature` serializes as
/// null when the companion element had no matching reading, so clients
/// see a stable shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyPeriod {
    #[serde(rename = "startTime")]
    pub start_time: String,
    #[serde(rename = "endTime")]
    pub end_time: String,
    pub timestamp: f64,
    #[serde(flatten)]
    pub fields: DescriptionFields,
    pub apparent_temperature: Option<f64>,
}

/// One weekly forecast period (half-day granularity upstream).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyPeriod {
    #[serde(rename = "startTime")]
    pub start_time: String,
    #[serde(rename = "endTime")]
    pub end_time: String,
    pub timestamp: f64,
    #[serde(flatten)]
    pub fields: DescriptionFields,
    pub max_apparent_temperature: Option<f64>,
    pub min_apparent_temperature: Option<f64>,
}

/// Forecast for one township, generic over the period shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TownForecast<P> {
    pub county_name: String,
    pub town_name: String,
    pub geocode: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub periods: Vec<P>,
    pub timestamp: f64,
}

pub type ThreeHourForecast = TownForecast<HourlyPeriod>;
pub type WeeklyForecast = TownForecast<WeeklyPeriod>;

impl<P> TownForecast<P> {
    fn id(&self) -> String {
        format!("{}_{}", self.county_name, self.town_name)
    }

    fn document(&self, periods_field: &str) -> Result<Value>
    where
        P: Serialize,
    {
        let mut doc = json!({
            "id": self.id(),
            "countyName": self.county_name,
            "townName": self.town_name,
            "location": {
                "latitude": self.latitude,
                "longitude": self.longitude,
            },
            "timestamp": self.timestamp,
        });
        doc[periods_field] = serde_json::to_value(&self.periods)?;
        Ok(doc)
    }
}

impl Document for ThreeHourForecast {
    fn collection(&self) -> &'static str {
        "weather_forecasts"
    }

    fn doc_id(&self) -> String {
        self.id()
    }

    fn to_document(&self) -> Result<Value> {
        self.document("hourly_forecast")
    }
}

impl Document for WeeklyForecast {
    fn collection(&self) -> &'static str {
        "weather_forecasts"
    }

    fn doc_id(&self) -> String {
        self.id()
    }

    fn to_document(&self) -> Result<Value> {
        self.document("weekly_forecast")
    }
}

/// Extracts per-township three-hour forecasts from the merged feed.
pub fn extract_three_hour_forecast(raw: &Value) -> Result<Vec<ThreeHourForecast>> {
    let now = Utc::now().timestamp() as f64;
    let mut towns = Vec::new();

    for (county_name, town) in town_entries(raw)? {
        let mut periods = Vec::new();
        for period in description_periods(town) {
            periods.push(HourlyPeriod {
                start_time: period.start_time,
                end_time: period.end_time,
                timestamp: period.timestamp,
                fields: period.fields,
                apparent_temperature: None,
            });
        }

        for (key, value) in companion_readings(town, APPARENT_TEMP_ELEMENT, "DataTime") {
            match periods.iter_mut().find(|p| p.start_time == key) {
                Some(period) => {
                    period.apparent_temperature = value.and_then(|v| value_f64(&v));
                }
                None => {
                    warn!(start = %key, "apparent temperature has no matching period, dropped")
                }
            }
        }

        towns.push(town_forecast(county_name, town, periods, now));
    }

    Ok(towns)
}

/// Extracts per-township weekly forecasts from the merged feed.
pub fn extract_weekly_forecast(raw: &Value) -> Result<Vec<WeeklyForecast>> {
    let now = Utc::now().timestamp() as f64;
    let mut towns = Vec::new();

    for (county_name, town) in town_entries(raw)? {
        let mut periods = Vec::new();
        for period in description_periods(town) {
            periods.push(WeeklyPeriod {
                start_time: period.start_time,
                end_time: period.end_time,
                timestamp: period.timestamp,
                fields: period.fields,
                max_apparent_temperature: None,
                min_apparent_temperature: None,
            });
        }

        for (key, value) in companion_readings(town, MAX_APPARENT_TEMP_ELEMENT, "StartTime") {
            if let Some(period) = periods.iter_mut().find(|p| p.start_time == key) {
                period.max_apparent_temperature = value.and_then(|v| value_f64(&v));
            }
        }
        for (key, value) in companion_readings(town, MIN_APPARENT_TEMP_ELEMENT, "StartTime") {
            if let Some(period) = periods.iter_mut().find(|p| p.start_time == key) {
                period.min_apparent_temperature = value.and_then(|v| value_f64(&v));
            }
        }

        towns.push(town_forecast(county_name, town, periods, now));
    }

    Ok(towns)
}

/// Yields `(county_name, town)` pairs from the merged payload.
fn town_entries(raw: &Value) -> Result<Vec<(String, &Value)>, ExtractError> {
    let locations = raw
        .pointer("/records/locations")
        .and_then(Value::as_array)
        .ok_or(ExtractError::MissingKey("records.locations"))?;

    let mut entries = Vec::new();
    for location in locations {
        let county_name = location
            .get("LocationsName")
            .and_then(value_string)
            .unwrap_or_default();
        let towns = location
            .get("Location")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for town in towns {
            entries.push((county_name.clone(), town));
        }
    }
    Ok(entries)
}

struct BasePeriod {
    start_time: String,
    end_time: String,
    timestamp: f64,
    fields: DescriptionFields,
}

/// Parses the composite-description element into the town's periods.
fn description_periods(town: &Value) -> Vec<BasePeriod> {
    let mut periods = Vec::new();
    for time_period in element_times(town, DESCRIPTION_ELEMENT) {
        let Some(start_time) = time_period.get("StartTime").and_then(value_string) else {
            warn!("forecast period missing StartTime, skipped");
            continue;
        };
        let Some(timestamp) = local_timestamp(&start_time) else {
            warn!(start = %start_time, "unparseable period start time, skipped");
            continue;
        };
        let end_time = time_period
            .get("EndTime")
            .and_then(value_string)
            .unwrap_or_default();
        let description = time_period
            .pointer("/ElementValue/0/WeatherDescription")
            .and_then(Value::as_str)
            .unwrap_or_default();

        periods.push(BasePeriod {
            start_time,
            end_time,
            timestamp,
            fields: parse_weather_description(description),
        });
    }
    periods
}

/// Yields `(time_key, first element value field)` pairs for a companion
/// element like apparent temperature.
fn companion_readings(
    town: &Value,
    element_name: &str,
    time_key: &str,
) -> Vec<(String, Option<Value>)> {
    let mut readings = Vec::new();
    for time_period in element_times(town, element_name) {
        let Some(key) = time_period.get(time_key).and_then(value_string) else {
            continue;
        };
        let value = time_period
            .pointer("/ElementValue/0")
            .and_then(|v| v.as_object())
            .and_then(|obj| obj.values().next())
            .cloned();
        readings.push((key, value));
    }
    readings
}

fn element_times<'a>(town: &'a Value, element_name: &str) -> Vec<&'a Value> {
    town.get("WeatherElement")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
        .iter()
        .filter(|e| {
            e.get("ElementName").and_then(Value::as_str) == Some(element_name)
        })
        .flat_map(|e| {
            e.get("Time")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[])
        })
        .collect()
}

fn town_forecast<P>(
    county_name: String,
    town: &Value,
    periods: Vec<P>,
    timestamp: f64,
) -> TownForecast<P> {
    TownForecast {
        county_name,
        town_name: town
            .get("LocationName")
            .and_then(value_string)
            .unwrap_or_default(),
        geocode: town.get("Geocode").and_then(value_string),
        latitude: town.get("Latitude").and_then(value_f64).unwrap_or(0.0),
        longitude: town.get("Longitude").and_then(value_f64).unwrap_or(0.0),
        periods,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn three_hour_payload() -> Value {
        json!({
            "records": {
                "locations": [{
                    "LocationsName": "臺北市",
                    "Location": [{
                        "LocationName": "信義區",
                        "Geocode": "63000010",
                        "Latitude": "25.033",
                        "Longitude": "121.565",
                        "WeatherElement": [
                            {
                                "ElementName": "天氣預報綜合描述",
                                "Time": [
                                    {
                                        "StartTime": "2025-06-01T06:00:00+08:00",
                                        "EndTime": "2025-06-01T09:00:00+08:00",
                                        "ElementValue": [{
                                            "WeatherDescription":
                                                "多雲。降雨機率20%。悶熱。體感舒適。溫度攝氏26至31度。東北風風速3-4級。相對濕度70至90%"
                                        }]
                                    },
                                    {
                                        "StartTime": "2025-06-01T09:00:00+08:00",
                                        "EndTime": "2025-06-01T12:00:00+08:00",
                                        "ElementValue": [{ "WeatherDescription": "晴。舒適。" }]
                                    }
                                ]
                            },
                            {
                                "ElementName": "體感溫度",
                                "Time": [
                                    {
                                        "DataTime": "2025-06-01T06:00:00+08:00",
                                        "ElementValue": [{ "ApparentTemperature": "28" }]
                                    },
                                    {
                                        "DataTime": "2025-06-01T23:00:00+08:00",
                                        "ElementValue": [{ "ApparentTemperature": "22" }]
                                    }
                                ]
                            }
                        ]
                    }]
                }]
            }
        })
    }

    #[test]
    fn test_three_hour_extraction_merges_apparent_temperature() {
        let towns = extract_three_hour_forecast(&three_hour_payload()).unwrap();

        assert_eq!(towns.len(), 1);
        let town = &towns[0];
        assert_eq!(town.county_name, "臺北市");
        assert_eq!(town.town_name, "信義區");
        assert_eq!(town.geocode.as_deref(), Some("63000010"));
        assert_eq!(town.periods.len(), 2);

        let first = &town.periods[0];
        assert_eq!(first.fields.weather.as_deref(), Some("多雲"));
        assert_eq!(first.apparent_temperature, Some(28.0));
        // 2025-06-01T06:00:00+08:00 == 2025-05-31T22:00:00Z
        assert_eq!(first.timestamp, 1748728800.0);

        // The 23:00 reading has no matching period and is dropped; the
        // unmatched period keeps a null apparent temperature.
        assert_eq!(town.periods[1].apparent_temperature, None);
    }

    #[test]
    fn test_three_hour_document_shape() {
        let towns = extract_three_hour_forecast(&three_hour_payload()).unwrap();
        let town = &towns[0];

        assert_eq!(town.collection(), "weather_forecasts");
        assert_eq!(town.doc_id(), "臺北市_信義區");

        let doc = town.to_document().unwrap();
        assert_eq!(doc["countyName"], "臺北市");
        assert_eq!(doc["location"]["latitude"], 25.033);
        let periods = doc["hourly_forecast"].as_array().unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0]["rainProb"], "20%");
        // Null, not absent.
        assert!(periods[1]["apparent_temperature"].is_null());
        assert!(periods[1].get("rainProb").is_none());
    }

    #[test]
    fn test_weekly_extraction_merges_extremes() {
        let raw = json!({
            "records": {
                "locations": [{
                    "LocationsName": "高雄市",
                    "Location": [{
                        "LocationName": "苓雅區",
                        "Latitude": 22.62,
                        "Longitude": 120.31,
                        "WeatherElement": [
                            {
                                "ElementName": "天氣預報綜合描述",
                                "Time": [{
                                    "StartTime": "2025-06-02T06:00:00+08:00",
                                    "EndTime": "2025-06-02T18:00:00+08:00",
                                    "ElementValue": [{
                                        "WeatherDescription": "晴。舒適。溫度攝氏25至32度。"
                                    }]
                                }]
                            },
                            {
                                "ElementName": "最高體感溫度",
                                "Time": [{
                                    "StartTime": "2025-06-02T06:00:00+08:00",
                                    "ElementValue": [{ "MaxApparentTemperature": "35" }]
                                }]
                            },
                            {
                                "ElementName": "最低體感溫度",
                                "Time": [{
                                    "StartTime": "2025-06-02T06:00:00+08:00",
                                    "ElementValue": [{ "MinApparentTemperature": "27" }]
                                }]
                            }
                        ]
                    }]
                }]
            }
        });

        let towns = extract_weekly_forecast(&raw).unwrap();
        let period = &towns[0].periods[0];

        assert_eq!(period.max_apparent_temperature, Some(35.0));
        assert_eq!(period.min_apparent_temperature, Some(27.0));
        assert_eq!(period.fields.min_temp, Some(25.0));
        assert_eq!(period.fields.max_temp, Some(32.0));

        let doc = towns[0].to_document().unwrap();
        assert!(doc.get("weekly_forecast").is_some());
        assert!(doc.get("hourly_forecast").is_none());
    }

    #[test]
    fn test_missing_locations_is_structural_error() {
        let raw = json!({ "records": {} });
        assert!(extract_three_hour_forecast(&raw).is_err());
    }

    #[test]
    fn test_unparseable_period_start_is_skipped() {
        let raw = json!({
            "records": {
                "locations": [{
                    "LocationsName": "臺北市",
                    "Location": [{
                        "LocationName": "信義區",
                        "WeatherElement": [{
                            "ElementName": "天氣預報綜合描述",
                            "Time": [{
                                "StartTime": "not-a-time",
                                "EndTime": "also-not",
                                "ElementValue": [{ "WeatherDescription": "晴。" }]
                            }]
                        }]
                    }]
                }]
            }
        });

        let towns = extract_three_hour_forecast(&raw).unwrap();
        assert_eq!(towns.len(), 1);
        assert!(towns[0].periods.is_empty());
        assert_eq!(towns[0].latitude, 0.0);
    }
}

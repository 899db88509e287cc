//! Clients for the CWA open-data API and the MOENV air-quality API.

use crate::fetch::{HttpClient, fetch_bytes, fetch_json};
use crate::settings::Settings;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use reqwest::Url;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{error, info, warn};

/// Township forecast dataset covering all counties in one endpoint.
const TOWNSHIP_FORECAST_ENDPOINT: &str = "F-D0047-093";
/// Per-county dataset IDs run 001..085 (three-hour) and 003..087
/// (weekly), stepping by 4.
const THREE_HOUR_FIRST_DATASET: u32 = 1;
const WEEKLY_FIRST_DATASET: u32 = 3;
const DATASET_STEP: u32 = 4;
const DATASET_COUNT: u32 = 22;

const OBSERVATION_ENDPOINT: &str = "O-A0001-001";
const UV_ENDPOINT: &str = "O-A0003-001";
const SUNRISE_ENDPOINT: &str = "A-B0062-001";
const MOONRISE_ENDPOINT: &str = "A-B0063-001";
const PROBE_ENDPOINT: &str = "F-C0032-001";

const THREE_HOUR_ELEMENTS: &str = "天氣預報綜合描述,體感溫度";
const WEEKLY_ELEMENTS: &str = "天氣預報綜合描述,最高體感溫度,最低體感溫度";

/// Location IDs requested per forecast call. The township endpoint
/// rejects larger batches.
const LOCATION_BATCH: usize = 5;
/// Pause between forecast batches so the API's rate limit is not hit.
const BATCH_PAUSE: Duration = Duration::from_millis(1500);

const AIR_QUALITY_FIELDS: &str = "sitename,county,aqi,pollutant,status,so2,co,o3,o3_8hr,pm10,pm2.5,no2,nox,no,wind_speed,wind_direc,publishtime,co_8hr,pm2.5_avg,pm10_avg,so2_avg,longitude,latitude,siteid";

/// Which upstream a reachability probe targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Cwa,
    Moenv,
}

pub struct WeatherApi<C: HttpClient> {
    client: C,
    cwa_api_key: String,
    moenv_api_key: String,
    cwa_base_url: String,
    radar_file_url: String,
    moenv_base_url: String,
}

impl<C: HttpClient> WeatherApi<C> {
    pub fn new(client: C, settings: &Settings) -> Self {
        WeatherApi {
            client,
            cwa_api_key: settings.cwa_api_key.clone(),
            moenv_api_key: settings.moenv_api_key.clone(),
            cwa_base_url: settings.cwa_base_url.clone(),
            radar_file_url: settings.radar_file_url.clone(),
            moenv_base_url: settings.moenv_base_url.clone(),
        }
    }

    fn cwa_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url> {
        let base = format!("{}/{}", self.cwa_base_url, endpoint);
        let mut pairs: Vec<(&str, &str)> = vec![
            ("Authorization", self.cwa_api_key.as_str()),
            ("format", "JSON"),
        ];
        pairs.extend_from_slice(params);
        Url::parse_with_params(&base, &pairs).with_context(|| format!("building url for {endpoint}"))
    }

    /// Current surface observations for all stations.
    pub async fn get_observations(&self) -> Result<Value> {
        let url = self.cwa_url(OBSERVATION_ENDPOINT, &[("GeoInfo", "Coordinates")])?;
        fetch_json(&self.client, url).await
    }

    /// Current UV index readings for all stations.
    pub async fn get_uv_index(&self) -> Result<Value> {
        let url = self.cwa_url(
            UV_ENDPOINT,
            &[("GeoInfo", "Coordinates"), ("WeatherElement", "UVIndex")],
        )?;
        fetch_json(&self.client, url).await
    }

    /// Three-hour township forecasts for the whole country, fetched in
    /// location batches and merged into one payload.
    pub async fn get_three_hour_forecast(&self) -> Result<Value> {
        let ids = dataset_ids(THREE_HOUR_FIRST_DATASET);
        self.get_township_forecast(&ids, THREE_HOUR_ELEMENTS).await
    }

    /// Weekly township forecasts for the whole country.
    pub async fn get_weekly_forecast(&self) -> Result<Value> {
        let ids = dataset_ids(WEEKLY_FIRST_DATASET);
        self.get_township_forecast(&ids, WEEKLY_ELEMENTS).await
    }

    /// Fetches `location_ids` in batches of [`LOCATION_BATCH`]. A failed
    /// batch is logged and skipped so one bad county does not lose the
    /// other 21 datasets.
    async fn get_township_forecast(
        &self,
        location_ids: &[String],
        element_names: &str,
    ) -> Result<Value> {
        let mut merged: Vec<Value> = Vec::new();
        let total_batches = location_ids.len().div_ceil(LOCATION_BATCH);

        for (index, batch) in location_ids.chunks(LOCATION_BATCH).enumerate() {
            let current = index + 1;
            info!(batch = current, total = total_batches, ids = ?batch, "fetching forecast batch");

            let location_id = batch.join(",");
            let result = async {
                let url = self.cwa_url(
                    TOWNSHIP_FORECAST_ENDPOINT,
                    &[
                        ("locationId", location_id.as_str()),
                        ("ElementName", element_names),
                    ],
                )?;
                fetch_json(&self.client, url).await
            }
            .await;

            match result {
                Ok(payload) => {
                    match payload.pointer("/records/Locations").and_then(Value::as_array) {
                        Some(locations) if !locations.is_empty() => {
                            merged.extend(locations.iter().cloned());
                        }
                        _ => error!(batch = current, "forecast batch returned no locations"),
                    }
                }
                Err(e) => error!(batch = current, error = %e, "forecast batch failed"),
            }

            if current < total_batches {
                tokio::time::sleep(BATCH_PAUSE).await;
            }
        }

        Ok(json!({ "records": { "locations": merged } }))
    }

    /// Hourly air quality for all sites from the MOENV API.
    pub async fn get_air_quality(&self) -> Result<Value> {
        let url = Url::parse_with_params(
            &self.moenv_base_url,
            &[
                ("api_key", self.moenv_api_key.as_str()),
                ("format", "JSON"),
                ("limit", "1000"),
                ("fields", AIR_QUALITY_FIELDS),
            ],
        )?;
        fetch_json(&self.client, url).await
    }

    /// Raw radar rainfall grid from the file API.
    pub async fn get_radar_rainfall(&self) -> Result<Value> {
        let url = Url::parse_with_params(
            &self.radar_file_url,
            &[
                ("Authorization", self.cwa_api_key.as_str()),
                ("downloadType", "WEB"),
                ("format", "JSON"),
            ],
        )?;
        fetch_json(&self.client, url).await
    }

    /// Radar echo composite image, fetched as raw bytes.
    pub async fn get_radar_image(&self, image_url: &str) -> Result<Vec<u8>> {
        fetch_bytes(&self.client, Url::parse(image_url)?).await
    }

    /// Today's sunrise/sunset times per county.
    pub async fn get_sunrise_sunset(&self) -> Result<Value> {
        self.get_almanac(SUNRISE_ENDPOINT, "SunRiseTime,SunSetTime")
            .await
    }

    /// Today's moonrise/moonset times per county.
    pub async fn get_moonrise_moonset(&self) -> Result<Value> {
        self.get_almanac(MOONRISE_ENDPOINT, "MoonRiseTime,MoonSetTime")
            .await
    }

    async fn get_almanac(&self, endpoint: &str, elements: &str) -> Result<Value> {
        let today = Utc::now()
            .with_timezone(&crate::extract::taipei())
            .format("%Y-%m-%d")
            .to_string();
        let url = self.cwa_url(
            endpoint,
            &[("Date", today.as_str()), ("WeatherElement", elements)],
        )?;
        let payload = fetch_json(&self.client, url).await?;

        // The almanac endpoints report failure in-band.
        if payload.get("success").and_then(Value::as_str) != Some("true") {
            bail!("almanac endpoint {endpoint} reported failure");
        }
        Ok(payload)
    }

    /// Cheap probe of one upstream before a task starts pulling data.
    pub async fn is_reachable(&self, upstream: Upstream) -> bool {
        let result = match upstream {
            Upstream::Cwa => match self.cwa_url(PROBE_ENDPOINT, &[("limit", "1")]) {
                Ok(url) => fetch_json(&self.client, url).await.map(|_| ()),
                Err(e) => Err(e),
            },
            Upstream::Moenv => {
                let url = Url::parse_with_params(
                    &self.moenv_base_url,
                    &[
                        ("api_key", self.moenv_api_key.as_str()),
                        ("format", "JSON"),
                        ("limit", "1"),
                    ],
                );
                match url {
                    Ok(url) => fetch_json(&self.client, url).await.map(|_| ()),
                    Err(e) => Err(e.into()),
                }
            }
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(?upstream, error = %e, "upstream probe failed");
                false
            }
        }
    }
}

/// Dataset IDs `F-D0047-{first}`, stepping by 4, one per county feed.
fn dataset_ids(first: u32) -> Vec<String> {
    (0..DATASET_COUNT)
        .map(|i| format!("F-D0047-{:03}", first + i * DATASET_STEP))
        .collect()
}

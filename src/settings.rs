//! Environment-backed runtime configuration, loaded once at startup.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Settings {
    /// Central Weather Administration (CWA) open-data API key.
    pub cwa_api_key: String,
    /// Ministry of Environment (MOENV) air-quality API key.
    pub moenv_api_key: String,
    pub cwa_base_url: String,
    pub radar_file_url: String,
    pub moenv_base_url: String,

    /// Base URL of the document store's write endpoint.
    pub store_base_url: String,
    pub store_api_key: Option<String>,

    /// Bucket receiving the radar artifacts (S3-compatible).
    pub radar_bucket: String,
    pub s3_endpoint: Option<String>,
    /// Optional URL of the composite radar-echo PNG to mirror.
    pub radar_image_url: Option<String>,

    /// Documents per batch commit. The store caps batches at 500.
    pub batch_size: usize,
    /// Bounded wait for the pre-warmed object-store client.
    pub prewarm_wait_secs: u64,

    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            cwa_api_key: std::env::var("CWA_API_KEY").context("CWA_API_KEY must be set")?,
            moenv_api_key: std::env::var("MOENV_API_KEY").context("MOENV_API_KEY must be set")?,
            cwa_base_url: env_or(
                "CWA_BASE_URL",
                "https://opendata.cwa.gov.tw/api/v1/rest/datastore",
            ),
            radar_file_url: env_or(
                "RADAR_FILE_URL",
                "https://opendata.cwa.gov.tw/fileapi/v1/opendataapi/F-B0046-001",
            ),
            moenv_base_url: env_or("MOENV_BASE_URL", "https://data.moenv.gov.tw/api/v2/aqx_p_432"),
            store_base_url: std::env::var("DOC_STORE_URL").context("DOC_STORE_URL must be set")?,
            store_api_key: std::env::var("DOC_STORE_API_KEY").ok(),
            radar_bucket: std::env::var("RADAR_BUCKET").context("RADAR_BUCKET must be set")?,
            s3_endpoint: std::env::var("S3_ENDPOINT_URL").ok(),
            radar_image_url: std::env::var("RADAR_IMAGE_URL").ok(),
            batch_size: env_parsed("STORE_BATCH_SIZE", 500)?,
            prewarm_wait_secs: env_parsed("PREWARM_WAIT_SECS", 5)?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("{key} is not a valid number")),
        Err(_) => Ok(default),
    }
}

//! CLI entry point for the weather ingestion tasks.
//!
//! Each invocation runs one scheduled task end to end: probe the
//! upstream, fetch, normalize, persist, notify. A scheduler (cron,
//! Cloud Scheduler, systemd timers) picks the task per invocation.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use weather_ingest::fetch::BasicClient;
use weather_ingest::services::notify::Notifier;
use weather_ingest::services::weather_api::WeatherApi;
use weather_ingest::settings::Settings;
use weather_ingest::store::blob::BlobStore;
use weather_ingest::store::http::HttpDocumentStore;
use weather_ingest::tasks::{self, Prewarmed, TaskContext, run_task};

#[derive(Parser)]
#[command(name = "weather_ingest")]
#[command(about = "Ingests Taiwan weather open data into the document store", long_about = None)]
struct Cli {
    /// Task to run
    #[arg(value_enum)]
    task: Task,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Task {
    UpdateCurrentWeather,
    UpdateThreeHourForecast,
    UpdateWeeklyForecast,
    UpdateUvIndex,
    UpdateAirQuality,
    UpdateRadarRainfall,
    UpdateSunriseSunset,
}

impl Task {
    fn name(self) -> &'static str {
        match self {
            Task::UpdateCurrentWeather => "update_current_weather",
            Task::UpdateThreeHourForecast => "update_three_hour_forecast",
            Task::UpdateWeeklyForecast => "update_weekly_forecast",
            Task::UpdateUvIndex => "update_uv_index",
            Task::UpdateAirQuality => "update_air_quality",
            Task::UpdateRadarRainfall => "update_radar_rainfall",
            Task::UpdateSunriseSunset => "update_sunrise_sunset",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/weather_ingest.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("weather_ingest.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let ctx = TaskContext {
        api: WeatherApi::new(BasicClient::new()?, &settings),
        store: Arc::new(HttpDocumentStore::new(
            &settings.store_base_url,
            settings.store_api_key.clone(),
        )?),
        notifier: Notifier::new(
            settings.telegram_bot_token.clone(),
            settings.telegram_chat_id.clone(),
        ),
        settings,
    };

    let name = cli.task.name();
    match cli.task {
        Task::UpdateCurrentWeather => {
            run_task(&ctx, name, tasks::update_current_weather(&ctx)).await
        }
        Task::UpdateThreeHourForecast => {
            run_task(&ctx, name, tasks::update_three_hour_forecast(&ctx)).await
        }
        Task::UpdateWeeklyForecast => {
            run_task(&ctx, name, tasks::update_weekly_forecast(&ctx)).await
        }
        Task::UpdateUvIndex => run_task(&ctx, name, tasks::update_uv_index(&ctx)).await,
        Task::UpdateAirQuality => run_task(&ctx, name, tasks::update_air_quality(&ctx)).await,
        Task::UpdateSunriseSunset => {
            run_task(&ctx, name, tasks::update_sunrise_sunset(&ctx)).await
        }
        Task::UpdateRadarRainfall => {
            // Start the blob handshake while the grid downloads.
            let bucket = ctx.settings.radar_bucket.clone();
            let endpoint = ctx.settings.s3_endpoint.clone();
            let blob = Prewarmed::spawn(async move { BlobStore::connect(bucket, endpoint).await });
            run_task(&ctx, name, tasks::update_radar_rainfall(&ctx, blob)).await
        }
    }
}

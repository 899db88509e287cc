//! Scheduled ingestion tasks.
//!
//! Each task is one fetch→extract→persist run: probe the upstream,
//! pull the feed, normalize it, and batch-write the records. Task
//! outcomes go out through the notifier as well as the logs.

use crate::extract::air_quality::extract_air_quality;
use crate::extract::astronomy::merge_astronomy;
use crate::extract::forecast::{extract_three_hour_forecast, extract_weekly_forecast};
use crate::extract::grid::extract_radar_rainfall;
use crate::extract::observation::extract_observations;
use crate::extract::uv::extract_uv_index;
use crate::fetch::{BasicClient, HttpClient};
use crate::services::notify::Notifier;
use crate::services::weather_api::{Upstream, WeatherApi};
use crate::settings::Settings;
use crate::store::batch::{BatchError, BatchResult, batch_save};
use crate::store::blob::{
    BlobStore, GRID_CACHE_SECS, IMAGE_CACHE_SECS, RADAR_GRID_KEY, RADAR_IMAGE_KEY,
};
use crate::store::{Document, DocumentStore};
use anyhow::{Result, bail};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Townships in the national forecast feed. A different count means
/// some batch silently went missing upstream.
const EXPECTED_TOWNSHIPS: usize = 368;

/// Everything a task needs, wired up once at startup.
pub struct TaskContext {
    pub api: WeatherApi<BasicClient>,
    pub store: Arc<dyn DocumentStore>,
    pub notifier: Notifier,
    pub settings: Settings,
}

/// A connection being established on a background task while the rest
/// of the pipeline does useful work.
pub struct Prewarmed<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Prewarmed<T> {
    pub fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Prewarmed {
            handle: tokio::spawn(work),
        }
    }

    /// Joins the pre-warm task, giving it `wait` to finish before
    /// falling back to waiting inline.
    pub async fn acquire(mut self, wait: Duration) -> Result<T> {
        match tokio::time::timeout(wait, &mut self.handle).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!(wait_secs = wait.as_secs(), "pre-warmed connection not ready, waiting inline");
                self.handle.await?
            }
        }
    }
}

/// Runs one task to completion, reporting the outcome through the
/// notifier. The error is passed back up so the process exits non-zero.
pub async fn run_task<F>(ctx: &TaskContext, name: &str, work: F) -> Result<()>
where
    F: Future<Output = Result<BatchResult>>,
{
    let started_at = Utc::now();
    let start = Instant::now();
    info!(task = name, "task started");

    match work.await {
        Ok(result) => {
            info!(
                task = name,
                success = result.success,
                failed = result.failed,
                elapsed_ms = start.elapsed().as_millis(),
                "task complete"
            );
            ctx.notifier
                .notify_success(name, &result, start.elapsed(), started_at)
                .await;
            Ok(())
        }
        Err(e) => {
            error!(task = name, error = %e, "task failed");
            ctx.notifier
                .notify_failure(name, &e, start.elapsed(), started_at)
                .await;
            Err(e)
        }
    }
}

pub async fn update_current_weather(ctx: &TaskContext) -> Result<BatchResult> {
    ensure_reachable(&ctx.api, Upstream::Cwa).await?;
    let raw = ctx.api.get_observations().await?;
    let records = extract_observations(&raw)?;
    save(ctx, &records).await
}

pub async fn update_three_hour_forecast(ctx: &TaskContext) -> Result<BatchResult> {
    ensure_reachable(&ctx.api, Upstream::Cwa).await?;
    let raw = ctx.api.get_three_hour_forecast().await?;
    let towns = extract_three_hour_forecast(&raw)?;
    let result = save(ctx, &towns).await?;
    check_township_count(&result);
    Ok(result)
}

pub async fn update_weekly_forecast(ctx: &TaskContext) -> Result<BatchResult> {
    ensure_reachable(&ctx.api, Upstream::Cwa).await?;
    let raw = ctx.api.get_weekly_forecast().await?;
    let towns = extract_weekly_forecast(&raw)?;
    let result = save(ctx, &towns).await?;
    check_township_count(&result);
    Ok(result)
}

pub async fn update_uv_index(ctx: &TaskContext) -> Result<BatchResult> {
    ensure_reachable(&ctx.api, Upstream::Cwa).await?;
    let raw = ctx.api.get_uv_index().await?;
    let records = extract_uv_index(&raw)?;
    save(ctx, &records).await
}

pub async fn update_air_quality(ctx: &TaskContext) -> Result<BatchResult> {
    ensure_reachable(&ctx.api, Upstream::Moenv).await?;
    let raw = ctx.api.get_air_quality().await?;
    let records = extract_air_quality(&raw)?;
    save(ctx, &records).await
}

pub async fn update_sunrise_sunset(ctx: &TaskContext) -> Result<BatchResult> {
    ensure_reachable(&ctx.api, Upstream::Cwa).await?;
    let sun = ctx.api.get_sunrise_sunset().await?;
    let moon = ctx.api.get_moonrise_moonset().await?;
    let records = merge_astronomy(&sun, &moon)?;
    save(ctx, &records).await
}

/// Refreshes the radar artifacts: the aggregated rainfall grid and,
/// when configured, the echo image. The blob connection is handed in
/// pre-warmed so the AWS handshake overlaps the grid download.
pub async fn update_radar_rainfall(
    ctx: &TaskContext,
    blob: Prewarmed<BlobStore>,
) -> Result<BatchResult> {
    ensure_reachable(&ctx.api, Upstream::Cwa).await?;
    let raw = ctx.api.get_radar_rainfall().await?;
    let grid = extract_radar_rainfall(&raw)?;

    // A missing echo image degrades the task, it does not fail it.
    let image = match &ctx.settings.radar_image_url {
        Some(url) => match ctx.api.get_radar_image(url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "radar echo image fetch failed, uploading grid only");
                None
            }
        },
        None => None,
    };

    // A failed pre-warm falls back to connecting inline; only that
    // second attempt failing is fatal.
    let wait = Duration::from_secs(ctx.settings.prewarm_wait_secs);
    let blob = match blob.acquire(wait).await {
        Ok(blob) => blob,
        Err(e) => {
            warn!(error = %e, "pre-warmed blob connection failed, connecting inline");
            BlobStore::connect(
                ctx.settings.radar_bucket.clone(),
                ctx.settings.s3_endpoint.clone(),
            )
            .await?
        }
    };
    blob.put_json(RADAR_GRID_KEY, &grid, GRID_CACHE_SECS).await?;
    if let Some(bytes) = image {
        blob.put_image(RADAR_IMAGE_KEY, bytes, IMAGE_CACHE_SECS).await?;
    }

    Ok(BatchResult::single_success())
}

async fn ensure_reachable<C: HttpClient>(api: &WeatherApi<C>, upstream: Upstream) -> Result<()> {
    if !api.is_reachable(upstream).await {
        bail!("{upstream:?} API is unreachable, task aborted");
    }
    Ok(())
}

async fn save<D: Document>(ctx: &TaskContext, records: &[D]) -> Result<BatchResult> {
    let result = batch_save(ctx.store.as_ref(), records, ctx.settings.batch_size).await;
    flatten_batch(result)
}

/// Surfaces the partial counts of an aborted batch before converting
/// the error for the caller.
fn flatten_batch(result: Result<BatchResult, BatchError>) -> Result<BatchResult> {
    match result {
        Ok(result) => Ok(result),
        Err(e) => {
            error!(
                written = e.partial.success,
                failed = e.partial.failed,
                error = %e.source,
                "batch save aborted"
            );
            Err(e.into())
        }
    }
}

fn check_township_count(result: &BatchResult) {
    if result.success != EXPECTED_TOWNSHIPS {
        warn!(
            expected = EXPECTED_TOWNSHIPS,
            actual = result.success,
            "township count differs from the national feed"
        );
    }
    if !result.failed_items.is_empty() {
        warn!(failed_items = ?result.failed_items, "some townships failed to persist");
    }
}

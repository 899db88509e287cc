//! Blob storage for the radar artifacts.
//!
//! The aggregated rainfall grid and the echo image are public,
//! frequently-refetched objects, so they carry cache-control headers
//! and the JSON goes up gzip-compressed.

use anyhow::{Context, Result};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::io::Write;
use tracing::info;

/// Object key for the aggregated rainfall grid JSON.
pub const RADAR_GRID_KEY: &str = "radar/forecast.json";
/// Object key for the raw radar echo image.
pub const RADAR_IMAGE_KEY: &str = "radar/echo.png";
/// Grid refreshes every few minutes, keep the cache window short.
pub const GRID_CACHE_SECS: u32 = 300;
pub const IMAGE_CACHE_SECS: u32 = 3600;

pub struct BlobStore {
    client: Client,
    bucket: String,
}

impl BlobStore {
    /// Connects using the ambient AWS credential chain. A custom
    /// endpoint points the client at an S3-compatible store.
    pub async fn connect(bucket: String, endpoint: Option<String>) -> Result<Self> {
        let mut config_loader = aws_config::from_env();
        if let Some(endpoint_url) = endpoint {
            info!(endpoint = %endpoint_url, "using custom blob endpoint");
            config_loader = config_loader.endpoint_url(endpoint_url);
        }
        let config = config_loader.load().await;
        let client = Client::new(&config);
        info!(bucket = %bucket, "blob store initialized");
        Ok(BlobStore { client, bucket })
    }

    /// Serializes `value` and uploads it gzip-compressed as JSON.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, max_age: u32) -> Result<()> {
        let raw = serde_json::to_vec(value)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let compressed = encoder.finish()?;
        info!(
            key,
            raw_bytes = raw.len(),
            compressed_bytes = compressed.len(),
            "uploading json blob"
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(compressed))
            .content_type("application/json")
            .content_encoding("gzip")
            .cache_control(format!("public, max-age={max_age}"))
            .send()
            .await
            .with_context(|| format!("uploading {key} to {}", self.bucket))?;
        Ok(())
    }

    /// Uploads raw PNG bytes as-is.
    pub async fn put_image(&self, key: &str, body: Vec<u8>, max_age: u32) -> Result<()> {
        info!(key, bytes = body.len(), "uploading image blob");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("image/png")
            .cache_control(format!("public, max-age={max_age}"))
            .send()
            .await
            .with_context(|| format!("uploading {key} to {}", self.bucket))?;
        Ok(())
    }
}

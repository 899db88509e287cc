//! HTTP transport seam used by the upstream API clients.
//!
//! The [`HttpClient`] trait keeps the pipeline testable: production code
//! runs on [`BasicClient`], tests can substitute a canned transport.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Method, Request, Response, Url};
use serde_json::Value;
use std::time::Duration;

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Plain `reqwest` transport with request and connect timeouts.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        self.0.execute(req).await
    }
}

/// Fetches a URL and returns the raw response body.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: Url) -> Result<Vec<u8>> {
    let resp = client.execute(Request::new(Method::GET, url)).await?;
    let resp = resp.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Fetches a URL and parses the response body as JSON.
pub async fn fetch_json<C: HttpClient>(client: &C, url: Url) -> Result<Value> {
    let resp = client.execute(Request::new(Method::GET, url)).await?;
    let resp = resp.error_for_status()?;
    Ok(resp.json().await?)
}

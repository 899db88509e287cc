//! HTTP document-store backend.
//!
//! Talks to the document service's batch-write endpoint: staged writes
//! accumulate locally and go out as one `POST {base}/batchWrite` with a
//! `writes` array of merge operations.

use super::{DocumentBatch, DocumentStore, StoreError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const COMMIT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpDocumentStore {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let endpoint = Url::parse(base_url)?.join("batchWrite")?;
        let client = Client::builder().timeout(COMMIT_TIMEOUT).build()?;
        Ok(HttpDocumentStore {
            client,
            endpoint,
            api_key,
        })
    }
}

impl DocumentStore for HttpDocumentStore {
    fn batch(&self) -> Box<dyn DocumentBatch> {
        Box::new(HttpBatch {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            writes: Vec::new(),
        })
    }
}

#[derive(Serialize)]
struct Write {
    collection: String,
    id: String,
    merge: bool,
    fields: Value,
}

struct HttpBatch {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    writes: Vec<Write>,
}

#[async_trait]
impl DocumentBatch for HttpBatch {
    fn set_merge(&mut self, collection: &str, doc_id: &str, doc: Value) -> Result<(), StoreError> {
        self.writes.push(Write {
            collection: collection.to_string(),
            id: doc_id.to_string(),
            merge: true,
            fields: doc,
        });
        Ok(())
    }

    fn staged(&self) -> usize {
        self.writes.len()
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if self.writes.is_empty() {
            return Ok(());
        }
        debug!(writes = self.writes.len(), "committing document batch");

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "writes": self.writes }));
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::DeadlineExceeded
            } else {
                StoreError::Write(e.to_string())
            }
        })?;

        match response.status() {
            status if status.is_success() => {
                self.writes.clear();
                Ok(())
            }
            StatusCode::TOO_MANY_REQUESTS => Err(StoreError::QuotaExhausted),
            StatusCode::GATEWAY_TIMEOUT => Err(StoreError::DeadlineExceeded),
            status => Err(StoreError::Write(format!(
                "batch write rejected with status {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_staging_accumulates_writes() {
        let store = HttpDocumentStore::new("http://localhost:9000/v1/", None).unwrap();
        let mut batch = store.batch();

        batch
            .set_merge("observations", "a_1", json!({"x": 1}))
            .unwrap();
        batch
            .set_merge("observations", "b_2", json!({"x": 2}))
            .unwrap();

        assert_eq!(batch.staged(), 2);
    }

    #[test]
    fn test_endpoint_joined_from_base() {
        let store = HttpDocumentStore::new("http://localhost:9000/v1/", None).unwrap();
        assert_eq!(
            store.endpoint.as_str(),
            "http://localhost:9000/v1/batchWrite"
        );
    }
}

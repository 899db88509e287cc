//! Document-store and blob-store persistence.
//!
//! Records implement [`Document`] to describe where and how they are
//! written; [`batch::batch_save`] drives the actual writes through a
//! [`DocumentStore`], committing in fixed-size batches with per-item
//! error isolation.

pub mod batch;
pub mod blob;
pub mod http;

use async_trait::async_trait;
use geohash::Coord;
use serde_json::Value;
use thiserror::Error;

/// Geohash length used for location-indexed documents. Precision 7 is
/// roughly a 150m cell, enough to distinguish neighboring stations.
pub const GEOHASH_PRECISION: usize = 7;

/// Errors surfaced by a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("write quota exhausted")]
    QuotaExhausted,
    #[error("store deadline exceeded")]
    DeadlineExceeded,
    #[error("write failed: {0}")]
    Write(String),
}

impl StoreError {
    /// Fatal errors indicate backend-wide pressure, not a bad item.
    /// Once one is seen, continuing the batch only burns more quota.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::QuotaExhausted | Self::DeadlineExceeded)
    }
}

/// A record that knows its target collection, identity, and document body.
pub trait Document {
    fn collection(&self) -> &'static str;
    fn doc_id(&self) -> String;
    fn to_document(&self) -> anyhow::Result<Value>;
}

/// A staged group of writes committed together.
#[async_trait]
pub trait DocumentBatch: Send {
    /// Stages a merge-write of `doc` at `collection/doc_id`.
    fn set_merge(&mut self, collection: &str, doc_id: &str, doc: Value) -> Result<(), StoreError>;

    /// Number of writes staged and not yet committed.
    fn staged(&self) -> usize;

    /// Commits all staged writes. On success the batch is drained and
    /// may be reused for the next group.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Backend handle able to open write batches.
pub trait DocumentStore: Send + Sync {
    fn batch(&self) -> Box<dyn DocumentBatch>;
}

/// Encodes a coordinate as a geohash for location-indexed lookups.
pub fn location_hash(latitude: f64, longitude: f64) -> anyhow::Result<String> {
    let hash = geohash::encode(
        Coord {
            x: longitude,
            y: latitude,
        },
        GEOHASH_PRECISION,
    )?;
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_hash_precision() {
        let hash = location_hash(25.0375, 121.5637).unwrap();
        assert_eq!(hash.len(), GEOHASH_PRECISION);
        // Taipei lands in the wsqq block.
        assert!(hash.starts_with("wsqq"));
    }

    #[test]
    fn test_location_hash_rejects_out_of_range() {
        assert!(location_hash(95.0, 121.0).is_err());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(StoreError::QuotaExhausted.is_fatal());
        assert!(StoreError::DeadlineExceeded.is_fatal());
        assert!(!StoreError::Write("boom".into()).is_fatal());
    }
}

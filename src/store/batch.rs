//! Batched document persistence with per-item error isolation.

use super::{Document, DocumentStore, StoreError};
use thiserror::Error;
use tracing::{error, info, warn};

/// Writes staged per commit. Kept well under backend batch ceilings.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Outcome counters for one batch-save run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchResult {
    pub attempts: usize,
    pub success: usize,
    pub failed: usize,
    pub failed_items: Vec<FailedItem>,
}

impl BatchResult {
    /// Result for single-artifact tasks that have no per-item batching.
    pub fn single_success() -> Self {
        BatchResult {
            attempts: 1,
            success: 1,
            ..Default::default()
        }
    }
}

/// One record that could not be written, with enough identity to find
/// it in the source feed again.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedItem {
    pub doc_id: String,
    pub reason: String,
}

/// A batch run aborted by a fatal store error. Carries the counts
/// accumulated up to the abort so callers can report partial progress.
#[derive(Debug, Error)]
#[error("batch save aborted after {} written, {} failed: {source}", .partial.success, .partial.failed)]
pub struct BatchError {
    pub partial: BatchResult,
    #[source]
    pub source: StoreError,
}

/// Persists `items` through `store` in commits of `batch_size` writes.
///
/// A bad item (document build failure or non-fatal stage error) is
/// recorded and skipped; its siblings still go through. A fatal store
/// error trips a circuit breaker: every remaining item is marked failed
/// without touching the backend, and the error is returned with the
/// partial counts attached.
pub async fn batch_save<D: Document>(
    store: &dyn DocumentStore,
    items: &[D],
    batch_size: usize,
) -> Result<BatchResult, BatchError> {
    let mut result = BatchResult::default();
    let mut batch = store.batch();
    let mut fatal: Option<StoreError> = None;

    for item in items {
        result.attempts += 1;
        if fatal.is_some() {
            skip_remaining(&mut result, item);
            continue;
        }

        let doc_id = item.doc_id();
        let doc = match item.to_document() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "document build failed, skipping");
                fail_item(&mut result, &doc_id, &e.to_string());
                continue;
            }
        };

        match batch.set_merge(item.collection(), &doc_id, doc) {
            Ok(()) => result.success += 1,
            Err(e) if e.is_fatal() => {
                error!(doc_id = %doc_id, error = %e, "fatal store error, aborting batch");
                fail_item(&mut result, &doc_id, &e.to_string());
                fatal = Some(e);
            }
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "write failed, skipping item");
                fail_item(&mut result, &doc_id, &e.to_string());
            }
        }

        if fatal.is_none() && batch.staged() >= batch_size {
            if let Err(e) = batch.commit().await {
                error!(error = %e, staged = batch.staged(), "batch commit failed");
                fatal = Some(e);
            }
        }
    }

    if let Some(source) = fatal {
        return Err(BatchError {
            partial: result,
            source,
        });
    }

    if batch.staged() > 0 {
        if let Err(source) = batch.commit().await {
            error!(error = %source, "final batch commit failed");
            return Err(BatchError {
                partial: result,
                source,
            });
        }
    }

    info!(
        success = result.success,
        failed = result.failed,
        "batch save complete"
    );
    Ok(result)
}

fn skip_remaining<D: Document>(result: &mut BatchResult, item: &D) {
    fail_item(result, &item.doc_id(), "skipped, write circuit open");
}

fn fail_item(result: &mut BatchResult, doc_id: &str, reason: &str) {
    result.failed += 1;
    result.failed_items.push(FailedItem {
        doc_id: doc_id.to_string(),
        reason: reason.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentBatch;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct TestDoc {
        id: String,
        build_fails: bool,
    }

    impl TestDoc {
        fn ok(id: &str) -> Self {
            TestDoc {
                id: id.to_string(),
                build_fails: false,
            }
        }

        fn broken(id: &str) -> Self {
            TestDoc {
                id: id.to_string(),
                build_fails: true,
            }
        }
    }

    impl Document for TestDoc {
        fn collection(&self) -> &'static str {
            "test"
        }

        fn doc_id(&self) -> String {
            self.id.clone()
        }

        fn to_document(&self) -> anyhow::Result<Value> {
            if self.build_fails {
                anyhow::bail!("unbuildable");
            }
            Ok(json!({ "id": self.id }))
        }
    }

    /// Error script per staged write index, shared across batches.
    #[derive(Default)]
    struct Script {
        fail_at: Option<(usize, fn() -> StoreError)>,
        commit_fails: bool,
    }

    #[derive(Default)]
    struct MockStore {
        script: Arc<Script>,
        staged_total: Arc<AtomicUsize>,
        commits: Arc<AtomicUsize>,
        committed_ids: Arc<Mutex<Vec<String>>>,
    }

    struct MockBatch {
        script: Arc<Script>,
        staged_total: Arc<AtomicUsize>,
        commits: Arc<AtomicUsize>,
        committed_ids: Arc<Mutex<Vec<String>>>,
        pending: Vec<String>,
    }

    impl DocumentStore for MockStore {
        fn batch(&self) -> Box<dyn DocumentBatch> {
            Box::new(MockBatch {
                script: self.script.clone(),
                staged_total: self.staged_total.clone(),
                commits: self.commits.clone(),
                committed_ids: self.committed_ids.clone(),
                pending: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl DocumentBatch for MockBatch {
        fn set_merge(
            &mut self,
            _collection: &str,
            doc_id: &str,
            _doc: Value,
        ) -> Result<(), StoreError> {
            let index = self.staged_total.fetch_add(1, Ordering::SeqCst);
            if let Some((fail_index, make)) = self.script.fail_at {
                if index == fail_index {
                    return Err(make());
                }
            }
            self.pending.push(doc_id.to_string());
            Ok(())
        }

        fn staged(&self) -> usize {
            self.pending.len()
        }

        async fn commit(&mut self) -> Result<(), StoreError> {
            if self.script.commit_fails {
                return Err(StoreError::DeadlineExceeded);
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.committed_ids
                .lock()
                .unwrap()
                .append(&mut self.pending);
            Ok(())
        }
    }

    fn store_with(script: Script) -> MockStore {
        MockStore {
            script: Arc::new(script),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_all_items_succeed() {
        let store = store_with(Script::default());
        let items = vec![TestDoc::ok("a"), TestDoc::ok("b"), TestDoc::ok("c")];

        let result = batch_save(&store, &items, 2).await.unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(result.success, 3);
        assert_eq!(result.failed, 0);
        // One commit at the ceiling, one final flush.
        assert_eq!(store.commits.load(Ordering::SeqCst), 2);
        assert_eq!(
            *store.committed_ids.lock().unwrap(),
            vec!["a", "b", "c"]
        );
    }

    #[tokio::test]
    async fn test_quota_error_trips_circuit_and_skips_rest() {
        let store = store_with(Script {
            fail_at: Some((1, || StoreError::QuotaExhausted)),
            ..Default::default()
        });
        let items = vec![
            TestDoc::ok("a"),
            TestDoc::ok("b"),
            TestDoc::ok("c"),
            TestDoc::ok("d"),
        ];

        let err = batch_save(&store, &items, 10).await.unwrap_err();

        assert!(matches!(err.source, StoreError::QuotaExhausted));
        assert_eq!(err.partial.attempts, 4);
        assert_eq!(err.partial.success, 1);
        assert_eq!(err.partial.failed, 3);
        assert!(
            err.partial.failed_items[1]
                .reason
                .contains("circuit open")
        );
        // No commit ever ran, the backend was not touched again.
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generic_write_error_is_isolated() {
        let store = store_with(Script {
            fail_at: Some((1, || StoreError::Write("bad field".into()))),
            ..Default::default()
        });
        let items = vec![TestDoc::ok("a"), TestDoc::ok("b"), TestDoc::ok("c")];

        let result = batch_save(&store, &items, 10).await.unwrap();

        assert_eq!(result.success, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failed_items[0].doc_id, "b");
        assert_eq!(
            *store.committed_ids.lock().unwrap(),
            vec!["a", "c"]
        );
    }

    #[tokio::test]
    async fn test_document_build_failure_is_isolated() {
        let store = store_with(Script::default());
        let items = vec![TestDoc::ok("a"), TestDoc::broken("b"), TestDoc::ok("c")];

        let result = batch_save(&store, &items, 10).await.unwrap();

        assert_eq!(result.success, 2);
        assert_eq!(result.failed, 1);
        assert!(result.failed_items[0].reason.contains("unbuildable"));
    }

    #[tokio::test]
    async fn test_commit_failure_returns_partial_counts() {
        let store = store_with(Script {
            commit_fails: true,
            ..Default::default()
        });
        let items = vec![TestDoc::ok("a"), TestDoc::ok("b")];

        let err = batch_save(&store, &items, 10).await.unwrap_err();

        assert!(matches!(err.source, StoreError::DeadlineExceeded));
        assert_eq!(err.partial.success, 2);
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let store = store_with(Script::default());
        let items: Vec<TestDoc> = Vec::new();

        let result = batch_save(&store, &items, 10).await.unwrap();

        assert_eq!(result, BatchResult::default());
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    }
}

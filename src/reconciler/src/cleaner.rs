//! Batched blob deletion.
//!
//! Candidates are deleted in chunks of `batch_size` with one bulk request per
//! chunk and a pause between chunks. When a bulk request fails, every blob in
//! that chunk is deleted on its own so one bad key cannot block the rest.

use common::blob::{BlobBackend, StoredBlob};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of deleting a single blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobDeletion {
    pub url: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BlobDeletion {
    fn succeeded(url: &str) -> Self {
        Self {
            url: url.to_string(),
            success: true,
            error: None,
        }
    }

    fn failed(url: &str, error: impl ToString) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub results: Vec<BlobDeletion>,
    pub deleted: usize,
    pub failed: usize,
    pub total: usize,
}

impl DeletionReport {
    fn record(&mut self, result: BlobDeletion) {
        if result.success {
            self.deleted += 1;
        } else {
            self.failed += 1;
        }
        self.total += 1;
        self.results.push(result);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// Nothing was deleted; these blobs would have been.
    DryRun { candidates: Vec<StoredBlob> },
    Executed(DeletionReport),
}

pub struct BlobCleaner {
    backend: Arc<dyn BlobBackend>,
    batch_size: usize,
    batch_delay: Duration,
}

impl BlobCleaner {
    pub fn new(backend: Arc<dyn BlobBackend>, batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    /// Delete `candidates`, or just return them when `dry_run` is set.
    ///
    /// Never fails: per-blob errors are reported in the
    /// [`DeletionReport`], and `deleted + failed == candidates.len()`.
    pub async fn delete(&self, candidates: Vec<StoredBlob>, dry_run: bool) -> DeletionOutcome {
        if dry_run {
            tracing::info!(
                candidates = candidates.len(),
                "[DRY-RUN] Skipping blob deletion"
            );
            return DeletionOutcome::DryRun { candidates };
        }

        let mut report = DeletionReport::default();
        if candidates.is_empty() {
            tracing::info!("No blobs to delete");
            return DeletionOutcome::Executed(report);
        }

        let urls: Vec<String> = candidates.into_iter().map(|blob| blob.url).collect();
        let total_batches = urls.len().div_ceil(self.batch_size);

        for (batch_idx, batch) in urls.chunks(self.batch_size).enumerate() {
            tracing::info!(
                batch = batch_idx + 1,
                total_batches,
                batch_size = batch.len(),
                "Deleting blob batch"
            );

            for result in self.delete_batch(batch).await {
                report.record(result);
            }

            if batch_idx + 1 < total_batches && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        tracing::info!(
            deleted = report.deleted,
            failed = report.failed,
            total = report.total,
            "Blob deletion complete"
        );

        DeletionOutcome::Executed(report)
    }

    async fn delete_batch(&self, batch: &[String]) -> Vec<BlobDeletion> {
        match self.backend.delete_many(batch).await {
            Ok(()) => batch.iter().map(|url| BlobDeletion::succeeded(url)).collect(),
            Err(e) => {
                tracing::warn!(
                    batch_size = batch.len(),
                    error = %e,
                    "Bulk delete failed, deleting blobs individually"
                );

                let deletions = batch.iter().map(|url| async move {
                    match self.backend.delete(url).await {
                        Ok(()) => BlobDeletion::succeeded(url),
                        Err(e) => {
                            tracing::error!(url = %url, error = %e, "Failed to delete blob");
                            BlobDeletion::failed(url, e)
                        }
                    }
                });
                join_all(deletions).await
            }
        }
    }
}

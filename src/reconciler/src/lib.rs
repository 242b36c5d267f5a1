//! iSynergies blob reconciler.
//!
//! Finds blobs in object storage that no content row references and deletes
//! them in batches, and sweeps content rows whose parent image is gone.
//!
//! ```no_run
//! use reconciler::{BlobReconciler, DatabaseReferences, ScanRequest};
//! # async fn run(db: common::ContentDb, config: common::config::Configuration) -> anyhow::Result<()> {
//! let backend = common::storage::create_blob_backend(&config.storage)?;
//! let references = DatabaseReferences::new(db, &config.storage.public_url);
//! let reconciler = BlobReconciler::new(
//!     backend,
//!     std::sync::Arc::new(references),
//!     std::sync::Arc::new(common::clock::SystemClock),
//!     &config.blob_cleanup,
//! );
//!
//! let _report = reconciler.run(&ScanRequest::orphaned(1000), true).await?;
//! # Ok(())
//! # }
//! ```

pub mod cleaner;
pub mod error;
pub mod media;
pub mod references;
pub mod scanner;

pub use cleaner::{BlobCleaner, BlobDeletion, DeletionOutcome, DeletionReport};
pub use error::ReconcileError;
pub use media::{MediaSweepReport, MediaSweeper};
pub use references::{DatabaseReferences, ReferenceSource};
pub use scanner::{BlobScanner, ScanMode, ScanOutcome, ScanRequest};

use common::blob::BlobBackend;
use common::clock::Clock;
use common::config::BlobCleanupConfig;
use std::sync::Arc;

/// Scan results together with what the deletion did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub scan: ScanOutcome,
    pub deletion: DeletionOutcome,
}

/// Read-only summary of the orphaned set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReport {
    pub total_in_storage: usize,
    pub referenced: usize,
    pub orphaned: usize,
    /// URLs of the first orphans, up to the configured sample size.
    pub sample: Vec<String>,
}

struct Storage {
    scanner: BlobScanner,
    cleaner: BlobCleaner,
}

/// Entry point tying scanning and deletion to one storage backend.
///
/// Without a backend (no storage credential) every operation reports
/// [`ReconcileError::StorageUnconfigured`]; check [`is_configured`] first.
///
/// [`is_configured`]: BlobReconciler::is_configured
pub struct BlobReconciler {
    storage: Option<Storage>,
    sample_size: usize,
}

impl BlobReconciler {
    pub fn new(
        backend: Option<Arc<dyn BlobBackend>>,
        references: Arc<dyn ReferenceSource>,
        clock: Arc<dyn Clock>,
        config: &BlobCleanupConfig,
    ) -> Self {
        let storage = backend.map(|backend| Storage {
            scanner: BlobScanner::new(backend.clone(), references, clock, config.page_size),
            cleaner: BlobCleaner::new(backend, config.batch_size, config.batch_delay),
        });

        Self {
            storage,
            sample_size: config.sample_size,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.storage.is_some()
    }

    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanOutcome, ReconcileError> {
        self.storage()?.scanner.scan(request).await
    }

    pub async fn delete(
        &self,
        candidates: Vec<common::StoredBlob>,
        dry_run: bool,
    ) -> Result<DeletionOutcome, ReconcileError> {
        Ok(self.storage()?.cleaner.delete(candidates, dry_run).await)
    }

    /// Scan, then delete (or, with `dry_run`, only report) the candidates.
    pub async fn run(
        &self,
        request: &ScanRequest,
        dry_run: bool,
    ) -> Result<CleanupReport, ReconcileError> {
        let storage = self.storage()?;
        let scan = storage.scanner.scan(request).await?;
        let deletion = storage.cleaner.delete(scan.candidates.clone(), dry_run).await;
        Ok(CleanupReport { scan, deletion })
    }

    pub async fn stats(&self, limit: usize) -> Result<StatsReport, ReconcileError> {
        let outcome = self.scan(&ScanRequest::orphaned(limit)).await?;
        Ok(StatsReport {
            total_in_storage: outcome.total_in_storage,
            referenced: outcome.referenced.unwrap_or_default(),
            orphaned: outcome.candidates.len(),
            sample: outcome
                .candidates
                .into_iter()
                .take(self.sample_size)
                .map(|blob| blob.url)
                .collect(),
        })
    }

    fn storage(&self) -> Result<&Storage, ReconcileError> {
        self.storage
            .as_ref()
            .ok_or(ReconcileError::StorageUnconfigured)
    }
}

//! Blob scanning: enumerate storage and pick deletion candidates.
//!
//! Candidate selection per [`ScanMode`]:
//!
//! - `orphaned`: stored keys not present in the referenced set
//! - `all`: every stored blob except the `keep_count` most recently uploaded
//! - `old`: blobs uploaded before `now - older_than`
//!
//! Enumeration stops after `limit` blobs in every mode.

use crate::error::ReconcileError;
use crate::references::ReferenceSource;
use chrono::{DateTime, Duration, Utc};
use common::blob::{BlobBackend, StoredBlob};
use common::clock::Clock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    #[default]
    Orphaned,
    All,
    Old,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Orphaned => "orphaned",
            ScanMode::All => "all",
            ScanMode::Old => "old",
        }
    }
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orphaned" => Ok(ScanMode::Orphaned),
            "all" => Ok(ScanMode::All),
            "old" => Ok(ScanMode::Old),
            other => Err(ReconcileError::InvalidRequest(format!(
                "unknown mode '{other}', expected orphaned, all or old"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub mode: ScanMode,
    /// Maximum number of blobs to enumerate.
    pub limit: usize,
    /// Newest blobs spared in `all` mode.
    pub keep_count: usize,
    /// Minimum age, in minutes, of blobs selected in `old` mode.
    pub older_than_minutes: i64,
}

impl ScanRequest {
    pub fn orphaned(limit: usize) -> Self {
        Self {
            mode: ScanMode::Orphaned,
            limit,
            ..Self::default()
        }
    }
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            mode: ScanMode::Orphaned,
            limit: 1000,
            keep_count: 1,
            older_than_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub mode: ScanMode,
    /// Number of blobs enumerated (at most the request limit).
    pub total_in_storage: usize,
    /// Size of the referenced set; only computed in `orphaned` mode.
    pub referenced: Option<usize>,
    pub candidates: Vec<StoredBlob>,
    /// Number of blobs spared; only set in `all` mode.
    pub kept: Option<usize>,
}

/// Selects deletion candidates from a storage snapshot.
pub struct BlobScanner {
    backend: Arc<dyn BlobBackend>,
    references: Arc<dyn ReferenceSource>,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl BlobScanner {
    pub fn new(
        backend: Arc<dyn BlobBackend>,
        references: Arc<dyn ReferenceSource>,
        clock: Arc<dyn Clock>,
        page_size: usize,
    ) -> Self {
        Self {
            backend,
            references,
            clock,
            page_size: page_size.max(1),
        }
    }

    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanOutcome, ReconcileError> {
        if request.older_than_minutes < 0 {
            return Err(ReconcileError::InvalidRequest(format!(
                "olderThanMinutes must not be negative, got {}",
                request.older_than_minutes
            )));
        }

        tracing::info!(
            mode = %request.mode,
            limit = request.limit,
            "Starting blob scan"
        );

        let stored = self.list_stored(request.limit).await?;
        let total_in_storage = stored.len();

        let outcome = match request.mode {
            ScanMode::Orphaned => {
                let referenced = self
                    .references
                    .referenced_urls()
                    .await
                    .map_err(ReconcileError::References)?;
                let referenced_count = referenced.len();
                ScanOutcome {
                    mode: request.mode,
                    total_in_storage,
                    referenced: Some(referenced_count),
                    candidates: orphaned(stored, &referenced),
                    kept: None,
                }
            }
            ScanMode::All => {
                let (candidates, kept) = all_but_newest(stored, request.keep_count);
                ScanOutcome {
                    mode: request.mode,
                    total_in_storage,
                    referenced: None,
                    candidates,
                    kept: Some(kept),
                }
            }
            ScanMode::Old => {
                // An age too large to represent selects nothing.
                let cutoff = Duration::try_minutes(request.older_than_minutes)
                    .and_then(|age| self.clock.now().checked_sub_signed(age))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                ScanOutcome {
                    mode: request.mode,
                    total_in_storage,
                    referenced: None,
                    candidates: stored
                        .into_iter()
                        .filter(|blob| blob.uploaded_at < cutoff)
                        .collect(),
                    kept: None,
                }
            }
        };

        tracing::info!(
            mode = %outcome.mode,
            total_in_storage = outcome.total_in_storage,
            referenced = ?outcome.referenced,
            candidates = outcome.candidates.len(),
            kept = ?outcome.kept,
            "Blob scan complete"
        );

        Ok(outcome)
    }

    /// Enumerate up to `limit` blobs, one page at a time.
    pub async fn list_stored(&self, limit: usize) -> Result<Vec<StoredBlob>, ReconcileError> {
        let mut stored = Vec::new();
        let mut cursor: Option<String> = None;

        while stored.len() < limit {
            let page_size = self.page_size.min(limit - stored.len());
            let page = self
                .backend
                .list_page(cursor.as_deref(), page_size)
                .await
                .map_err(ReconcileError::Storage)?;

            tracing::debug!(
                blobs = page.blobs.len(),
                has_more = page.cursor.is_some(),
                "Listed storage page"
            );

            stored.extend(page.blobs);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        stored.truncate(limit);
        Ok(stored)
    }
}

/// Blobs whose URL is not in `referenced`, in listing order.
pub fn orphaned(stored: Vec<StoredBlob>, referenced: &HashSet<String>) -> Vec<StoredBlob> {
    stored
        .into_iter()
        .filter(|blob| !referenced.contains(&blob.url))
        .collect()
}

/// Everything except the `keep_count` most recently uploaded blobs, newest
/// first. Returns the candidates and how many blobs were kept.
pub fn all_but_newest(mut stored: Vec<StoredBlob>, keep_count: usize) -> (Vec<StoredBlob>, usize) {
    stored.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    let kept = keep_count.min(stored.len());
    let candidates = stored.split_off(kept);
    (candidates, kept)
}

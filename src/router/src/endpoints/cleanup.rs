//! `/cleanup-blobs`: orphaned blob statistics and cleanup.

use crate::{ApiError, RouterState};
use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use chrono::{DateTime, Utc};
use common::StoredBlob;
use reconciler::{BlobDeletion, DeletionOutcome, ScanMode, ScanRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;

const UNCONFIGURED_MESSAGE: &str = "Blob storage credential not configured, skipping cleanup";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupQuery {
    #[serde(default)]
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub mode: Option<String>,
    pub keep_count: Option<usize>,
    pub older_than_minutes: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BlobEntry {
    url: String,
    pathname: String,
    uploaded_at: DateTime<Utc>,
    size: u64,
}

impl From<StoredBlob> for BlobEntry {
    fn from(blob: StoredBlob) -> Self {
        Self {
            url: blob.url,
            pathname: blob.pathname,
            uploaded_at: blob.uploaded_at,
            size: blob.size,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CleanupSummary {
    total_blobs_in_storage: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    referenced_blobs: Option<usize>,
    blobs_to_delete: usize,
    deleted: usize,
    failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    kept: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CleanupResponse {
    success: bool,
    dry_run: bool,
    mode: ScanMode,
    summary: CleanupSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    blobs_to_delete: Option<Vec<BlobEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletion_results: Option<Vec<BlobDeletion>>,
}

/// POST /cleanup-blobs
///
/// Scan storage and delete (or with `dryRun`, list) the candidates.
#[tracing::instrument(skip(state, query))]
pub async fn cleanup_blobs<S: RouterState>(
    State(state): State<S>,
    query: Result<Query<CleanupQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let reconciler = state.reconciler();
    if !reconciler.is_configured() {
        tracing::warn!("{UNCONFIGURED_MESSAGE}");
        return Ok(Json(json!({
            "success": true,
            "message": UNCONFIGURED_MESSAGE,
            "deleted": 0,
            "skipped": 0,
        })));
    }

    let Query(query) = query?;
    let request = scan_request(&query, state.config().blob_cleanup.default_limit)?;

    let report = reconciler
        .run(&request, query.dry_run)
        .await
        .map_err(|e| ApiError::from_reconcile(e, state.is_development()))?;

    let scan = report.scan;
    let mut summary = CleanupSummary {
        total_blobs_in_storage: scan.total_in_storage,
        referenced_blobs: scan.referenced,
        blobs_to_delete: scan.candidates.len(),
        deleted: 0,
        failed: 0,
        kept: scan.kept,
    };

    let (blobs_to_delete, deletion_results) = match report.deletion {
        DeletionOutcome::DryRun { candidates } => (
            Some(candidates.into_iter().map(BlobEntry::from).collect()),
            None,
        ),
        DeletionOutcome::Executed(deletion) => {
            summary.deleted = deletion.deleted;
            summary.failed = deletion.failed;
            // Stats computed before the deletion are stale now.
            state.stats_cache().clear();
            (None, Some(deletion.results))
        }
    };

    let response = CleanupResponse {
        success: true,
        dry_run: query.dry_run,
        mode: scan.mode,
        summary,
        blobs_to_delete,
        deletion_results,
    };

    serde_json::to_value(response)
        .map(Json)
        .map_err(|e| ApiError::internal(&e, state.is_development()))
}

/// GET /cleanup-blobs
///
/// Read-only orphan statistics with a sample of orphaned URLs. Responses are
/// cached per `limit`.
#[tracing::instrument(skip(state, query))]
pub async fn blob_stats<S: RouterState>(
    State(state): State<S>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let reconciler = state.reconciler();
    if !reconciler.is_configured() {
        return Ok(Json(json!({
            "success": true,
            "message": UNCONFIGURED_MESSAGE,
            "summary": {
                "totalBlobsInStorage": 0,
                "referencedBlobs": 0,
                "orphanedBlobs": 0,
            },
            "orphanedBlobs": [],
        })));
    }

    let Query(query) = query?;
    let limit = query
        .limit
        .unwrap_or(state.config().blob_cleanup.default_limit);

    if let Some(cached) = state.stats_cache().get(&limit) {
        tracing::debug!(limit, "Serving cached blob stats");
        return Ok(Json(cached));
    }

    let epoch = state.stats_cache().epoch();
    let stats = reconciler
        .stats(limit)
        .await
        .map_err(|e| ApiError::from_reconcile(e, state.is_development()))?;

    let response = json!({
        "success": true,
        "summary": {
            "totalBlobsInStorage": stats.total_in_storage,
            "referencedBlobs": stats.referenced,
            "orphanedBlobs": stats.orphaned,
        },
        "orphanedBlobs": stats.sample,
    });
    // A cleanup that finished while we were listing makes this snapshot stale.
    if !state.stats_cache().set_if_epoch(limit, response.clone(), epoch) {
        tracing::debug!(limit, "Blob stats invalidated during computation, not caching");
    }

    Ok(Json(response))
}

fn scan_request(query: &CleanupQuery, default_limit: usize) -> Result<ScanRequest, ApiError> {
    let defaults = ScanRequest::default();
    let mode = match query.mode.as_deref() {
        Some(mode) => ScanMode::from_str(mode).map_err(|e| ApiError::bad_request(e.to_string()))?,
        None => ScanMode::Orphaned,
    };

    let request = ScanRequest {
        mode,
        limit: query.limit.unwrap_or(default_limit),
        keep_count: query.keep_count.unwrap_or(defaults.keep_count),
        older_than_minutes: query.older_than_minutes.unwrap_or(defaults.older_than_minutes),
    };

    if request.older_than_minutes < 0 {
        return Err(ApiError::bad_request(format!(
            "olderThanMinutes must not be negative, got {}",
            request.older_than_minutes
        )));
    }

    Ok(request)
}

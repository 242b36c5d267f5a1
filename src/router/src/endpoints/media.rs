use crate::{ApiError, RouterState};
use axum::{Json, extract::State};
use serde_json::{Value, json};

/// POST /media-cleanup
///
/// Delete `media` and `image_chunks` rows whose image no longer exists.
#[tracing::instrument(skip(state))]
pub async fn media_cleanup<S: RouterState>(State(state): State<S>) -> Result<Json<Value>, ApiError> {
    let report = state
        .media_sweeper()
        .sweep()
        .await
        .map_err(|e| ApiError::from_reconcile(e, state.is_development()))?;

    Ok(Json(json!({
        "success": true,
        "summary": {
            "orphanMedia": report.orphan_media_ids.len(),
            "orphanChunks": report.orphan_chunk_ids.len(),
        },
        "orphanMediaIds": report.orphan_media_ids,
        "orphanChunkIds": report.orphan_chunk_ids,
    })))
}

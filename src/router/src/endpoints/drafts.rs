//! Draft autosave endpoints.

use crate::{ApiError, RouterState};
use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, put},
};
use common::drafts::DraftKey;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct DraftQuery {
    /// Admin page the form lives on
    pub route: String,
}

pub fn router<S: RouterState>() -> Router<S> {
    Router::new()
        .route(
            "/drafts/{entity}/{id}",
            put(save_draft::<S>)
                .get(restore_draft::<S>)
                .delete(dismiss_draft::<S>),
        )
        .route("/drafts", delete(clear_drafts::<S>))
}

fn draft_key(
    (entity, entity_id): (String, String),
    query: Result<Query<DraftQuery>, QueryRejection>,
) -> Result<DraftKey, ApiError> {
    let Query(query) = query?;
    Ok(DraftKey::new(entity, entity_id, query.route))
}

/// PUT /drafts/{entity}/{id}?route=
///
/// Record the latest form state; it is persisted once edits pause.
pub async fn save_draft<S: RouterState>(
    State(state): State<S>,
    Path(path): Path<(String, String)>,
    query: Result<Query<DraftQuery>, QueryRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let key = draft_key(path, query)?;
    let Json(payload) = payload?;

    tracing::debug!(draft = %key, "Draft saved");
    state.drafts().save(key, payload);
    Ok(StatusCode::ACCEPTED)
}

/// GET /drafts/{entity}/{id}?route=
pub async fn restore_draft<S: RouterState>(
    State(state): State<S>,
    Path(path): Path<(String, String)>,
    query: Result<Query<DraftQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let key = draft_key(path, query)?;

    match state.drafts().restore(&key).await {
        Ok(Some(draft)) => Ok(Json(draft).into_response()),
        Ok(None) => Err(ApiError::not_found(format!("No draft for {key}"))),
        Err(e) => Err(ApiError::from_anyhow(&e, state.is_development())),
    }
}

/// DELETE /drafts/{entity}/{id}?route=
pub async fn dismiss_draft<S: RouterState>(
    State(state): State<S>,
    Path(path): Path<(String, String)>,
    query: Result<Query<DraftQuery>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let key = draft_key(path, query)?;

    state
        .drafts()
        .dismiss(&key)
        .await
        .map_err(|e| ApiError::from_anyhow(&e, state.is_development()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /drafts
pub async fn clear_drafts<S: RouterState>(State(state): State<S>) -> Result<StatusCode, ApiError> {
    state
        .drafts()
        .clear()
        .await
        .map_err(|e| ApiError::from_anyhow(&e, state.is_development()))?;
    Ok(StatusCode::NO_CONTENT)
}

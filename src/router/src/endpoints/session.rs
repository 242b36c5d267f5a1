use crate::RouterState;
use axum::{extract::State, http::StatusCode};
use common::auth::AdminContextExtractor;

/// POST /logout
///
/// Session teardown: drop every cached response.
pub async fn logout<S: RouterState>(
    State(state): State<S>,
    AdminContextExtractor(admin): AdminContextExtractor,
) -> StatusCode {
    state.stats_cache().clear();
    tracing::info!(key = %admin.key_name, "Admin session ended, response cache cleared");
    StatusCode::NO_CONTENT
}

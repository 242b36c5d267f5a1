//! HTTP authentication middleware for Axum

use super::{AdminContext, AuthError, Authenticator};
use axum::{
    Json,
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Extract the bearer token. A header in any other form yields 401.
fn extract_bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get("authorization") else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AuthError::unauthorized("Invalid Authorization header"))?;

    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or_else(|| AuthError::unauthorized("Authorization header must use Bearer scheme"))
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::UNAUTHORIZED);
        let body = serde_json::json!({
            "success": false,
            "error": self.message,
        });
        (status, Json(body)).into_response()
    }
}

/// Axum middleware admitting only admin callers.
///
/// Inserts [`AdminContext`] into request extensions on success; rejects with
/// 401/403 before the handler (and thus any storage or database access) runs.
pub async fn admin_auth_middleware(
    authenticator: Arc<Authenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    let admin = match extract_bearer_token(request.headers())
        .and_then(|token| authenticator.authenticate(token))
    {
        Ok(ctx) => ctx,
        Err(err) => {
            log::warn!(
                "Rejected admin request to {}: {}",
                request.uri().path(),
                err.message
            );
            return err.into_response();
        }
    };

    log::debug!(
        "Authenticated admin request to {} (key: {})",
        request.uri().path(),
        admin.key_name
    );

    request.extensions_mut().insert(admin);
    next.run(request).await
}

/// Axum extractor for the [`AdminContext`] set by [`admin_auth_middleware`].
pub struct AdminContextExtractor(pub AdminContext);

impl<S> axum::extract::FromRequestParts<S> for AdminContextExtractor
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminContext>()
            .cloned()
            .map(AdminContextExtractor)
            .ok_or_else(|| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AdminContext not found in request extensions".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKeyConfig, AuthConfig, Role};
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers).unwrap(), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), Some("abc"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        let err = extract_bearer_token(&headers).unwrap_err();
        assert_eq!(err.status_code, 401);
        assert!(err.message.contains("Bearer"));
    }

    #[tokio::test]
    async fn test_admin_auth_middleware_integration() {
        use axum::{
            Router,
            body::Body,
            http::{Request, StatusCode},
            middleware,
            routing::get,
        };
        use tower::ServiceExt;

        let auth_config = AuthConfig {
            enabled: true,
            api_keys: vec![
                ApiKeyConfig {
                    key: "admin-key".to_string(),
                    name: Some("ops".to_string()),
                    role: Role::Admin,
                },
                ApiKeyConfig {
                    key: "editor-key".to_string(),
                    name: Some("copywriter".to_string()),
                    role: Role::Editor,
                },
            ],
        };
        let authenticator = Arc::new(Authenticator::new(&auth_config));

        async fn whoami(admin: AdminContextExtractor) -> String {
            admin.0.key_name
        }

        let auth = authenticator.clone();
        let app = Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn(move |req, next| {
                admin_auth_middleware(auth.clone(), req, next)
            }));

        let request = |token: Option<&str>| {
            let mut builder = Request::builder().uri("/whoami");
            if let Some(token) = token {
                builder = builder.header("authorization", format!("Bearer {token}"));
            }
            builder.body(Body::empty()).unwrap()
        };

        let response = app.clone().oneshot(request(Some("admin-key"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.clone().oneshot(request(Some("nope"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.clone().oneshot(request(Some("editor-key"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

//! Error responses.
//!
//! Every failure is rendered as `{ "success": false, "error": ... }`. For
//! 500s the message is generic in production; in development it carries the
//! error and its source chain under `stack`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reconciler::ReconcileError;
use serde::Serialize;

const GENERIC_MESSAGE: &str = "Internal server error";

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    stack: Option<Vec<String>>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            stack: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            stack: None,
        }
    }

    /// A 500. Details are only exposed when `development` is set.
    pub fn internal(error: &(dyn std::error::Error + 'static), development: bool) -> Self {
        let chain = error_chain(error);
        tracing::error!(error = %chain.join(": "), "Request failed");

        if development {
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: error.to_string(),
                stack: Some(chain),
            }
        } else {
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: GENERIC_MESSAGE.to_string(),
                stack: None,
            }
        }
    }

    pub fn from_anyhow(error: &anyhow::Error, development: bool) -> Self {
        Self::internal(error.as_ref(), development)
    }

    pub fn from_reconcile(error: ReconcileError, development: bool) -> Self {
        match error {
            ReconcileError::InvalidRequest(message) => Self::bad_request(message),
            other => Self::internal(&other, development),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
            stack: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
            stack: self.stack,
        };
        (self.status, Json(body)).into_response()
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    std::iter::successors(Some(error), |e| e.source())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::BlobError;

    #[test]
    fn test_internal_hides_details_in_production() {
        let error = ReconcileError::Storage(BlobError::Backend("bucket missing".to_string()));

        let production = ApiError::internal(&error, false);
        assert_eq!(production.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(production.message, GENERIC_MESSAGE);
        assert!(production.stack.is_none());

        let development = ApiError::internal(&error, true);
        assert_eq!(development.message, "Failed to list blob storage");
        assert_eq!(
            development.stack,
            Some(vec![
                "Failed to list blob storage".to_string(),
                "bucket missing".to_string()
            ])
        );
    }

    #[test]
    fn test_invalid_request_is_bad_request() {
        let error = ReconcileError::InvalidRequest("unknown mode".to_string());
        assert_eq!(
            ApiError::from_reconcile(error, false).status(),
            StatusCode::BAD_REQUEST
        );
    }
}

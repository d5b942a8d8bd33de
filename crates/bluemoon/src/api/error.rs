//! Mapping of domain errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::error::Error;

impl Error {
    /// The HTTP status this error is reported with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation { .. } | Self::Import { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict { .. } | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Import { failures, .. } => {
                warn!("Rejected request: {}", self);
                json!({ "error": self.to_string(), "failures": failures })
            }
            _ if self.is_client_error() => {
                warn!("Rejected request: {}", self);
                json!({ "error": self.to_string() })
            }
            _ => {
                error!("Request failed: {}", self);
                json!({ "error": "internal server error" })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RowFailure;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::not_found("visit", 1).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::validation("bad").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(Error::conflict("dup").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            Error::invalid_transition("vehicle", "deregistered", "active").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::internal("bug").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_import_error_response() {
        let err = Error::Import {
            message: "1 rows failed validation".to_string(),
            failures: vec![RowFailure {
                section: "vehicles",
                row: 0,
                message: "bad plate".to_string(),
            }],
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_internal_error_is_generic() {
        let response = Error::internal("secret detail").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

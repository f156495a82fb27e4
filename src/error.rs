//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Misconfiguration of the resource declarations, detected at compile time of the
/// route table or on first use of the offending route.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid resource name: '{0}'")]
    InvalidResourceName(String),
    #[error("duplicate resource name: {0}")]
    DuplicateResourceName(String),
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    #[error("resource '{resource}' refers to unknown model '{model}'")]
    UnknownModel { resource: String, model: String },
    #[error("unknown model: {0}")]
    MissingModel(String),
    #[error("model '{model}' has no field '{field}'")]
    UnknownField { model: String, field: String },
    #[error("cannot resolve relationship '{path}' on model '{model}'")]
    UnresolvableRelationship { model: String, path: String },
    #[error("resource '{resource}' cross-links unknown resource '{target}'")]
    UnknownCrossLinkTarget { resource: String, target: String },
    #[error("nested resource '{0}' is declared without a parent")]
    OrphanNestedResource(String),
    #[error("status code {0} is not handled by the permission cascade")]
    UnhandledStatus(u16),
    #[error("view name '{0}' must end with -list or -detail")]
    InvalidViewName(String),
    #[error("cannot find URL variable '{0}' in current request; this type of cross-linking is not supported")]
    MissingRequestKey(String),
    #[error("parent lookup on field '{field}' is not supported: {reason}")]
    UnsupportedParentLookup { field: String, reason: String },
    #[error("route '{route}' requires URL variable '{variable}'")]
    MissingPathVariable { route: String, variable: String },
    #[error("lookup '{field}' on model '{model}' crosses a to-many relationship")]
    ToManyLookup { model: String, field: String },
    #[error("unknown permission policy: {0}")]
    UnknownPermission(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("you do not have permission to perform this action")]
    PermissionDenied,
    #[error("authentication credentials were not provided")]
    NotAuthenticated,
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.status_and_code().0
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::PermissionDenied => (StatusCode::FORBIDDEN, "permission_denied"),
            AppError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "not_authenticated"),
            AppError::MethodNotAllowed(_) => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_the_cascade_contract() {
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::PermissionDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotAuthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::from(ConfigError::UnhandledStatus(418)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_request_key_names_the_key() {
        let msg = ConfigError::MissingRequestKey("host".into()).to_string();
        assert!(msg.contains("'host'"));
    }
}

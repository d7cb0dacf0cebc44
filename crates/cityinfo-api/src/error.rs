//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Every failure reaching the client is an RFC 7807 problem-details document
//! served as `application/problem+json`. Internal error details are logged
//! and never returned.

use std::collections::BTreeMap;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use cityinfo_core::RepositoryError;

use crate::mapping::MappingError;
use crate::negotiation::NegotiationError;
use crate::versioning::VersionError;

/// Media type of problem-details responses.
pub const PROBLEM_JSON: &str = "application/problem+json";

/// Generic message for every authentication failure. Callers cannot tell a
/// missing credential from an expired or forged one.
const AUTHENTICATION_REQUIRED: &str = "A valid bearer token is required to access this resource.";

/// RFC 7807 problem-details body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProblemDetails {
    /// URI reference identifying the problem kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Short summary of the problem kind.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Additional members, e.g. `supportedVersions`.
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Requested API version is malformed or not served (400).
    #[error("unsupported API version '{requested}'")]
    UnsupportedVersion {
        /// Version as the caller wrote it.
        requested: String,
        /// Versions served for the addressed route.
        supported: Vec<String>,
    },

    /// No version given and no default configured (400).
    #[error("an API version is required")]
    AmbiguousVersion {
        /// Versions the caller may choose from.
        supported: Vec<String>,
    },

    /// Missing or invalid credential (401). The reason is logged, not returned.
    #[error("authentication required")]
    Unauthenticated,

    /// Authenticated, but a policy requirement is not met (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The path exists but does not accept this method (405).
    #[error("method {0} is not allowed on this resource")]
    MethodNotAllowed(String),

    /// No registered representation satisfies the Accept header (406).
    #[error("not acceptable: {requested}")]
    NotAcceptable {
        /// The Accept header as received.
        requested: String,
        /// Media types the server can produce.
        supported: Vec<String>,
    },

    /// Request body media type cannot be read (415).
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and the RFC 9110 section describing it.
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) | Self::UnsupportedVersion { .. } | Self::AmbiguousVersion { .. } => (
                StatusCode::BAD_REQUEST,
                "https://tools.ietf.org/html/rfc9110#section-15.5.1",
            ),
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "https://tools.ietf.org/html/rfc9110#section-15.5.2",
            ),
            Self::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                "https://tools.ietf.org/html/rfc9110#section-15.5.4",
            ),
            Self::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "https://tools.ietf.org/html/rfc9110#section-15.5.5",
            ),
            Self::MethodNotAllowed(_) => (
                StatusCode::METHOD_NOT_ALLOWED,
                "https://tools.ietf.org/html/rfc9110#section-15.5.6",
            ),
            Self::NotAcceptable { .. } => (
                StatusCode::NOT_ACCEPTABLE,
                "https://tools.ietf.org/html/rfc9110#section-15.5.7",
            ),
            Self::UnsupportedMediaType(_) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "https://tools.ietf.org/html/rfc9110#section-15.5.16",
            ),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "https://tools.ietf.org/html/rfc9110#section-15.6.1",
            ),
        }
    }

    /// Build the problem-details body for this error.
    pub fn to_problem(&self) -> ProblemDetails {
        let (status, kind) = self.status_and_kind();
        let mut extensions = BTreeMap::new();
        let detail = match self {
            Self::Internal(_) => Some("An internal error occurred.".to_string()),
            Self::Unauthenticated => Some(AUTHENTICATION_REQUIRED.to_string()),
            Self::UnsupportedVersion { requested, supported } => {
                extensions.insert("supportedVersions".to_string(), serde_json::json!(supported));
                Some(format!(
                    "The HTTP resource does not support the API version '{requested}'."
                ))
            }
            Self::AmbiguousVersion { supported } => {
                extensions.insert("supportedVersions".to_string(), serde_json::json!(supported));
                Some("An API version is required, but was not specified.".to_string())
            }
            Self::NotAcceptable { supported, .. } => {
                extensions.insert("supportedMediaTypes".to_string(), serde_json::json!(supported));
                Some(self.to_string())
            }
            other => Some(other.to_string()),
        };
        ProblemDetails {
            kind: kind.to_string(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            status: status.as_u16(),
            detail,
            extensions,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, _) = self.status_and_kind();

        // Log internal errors for operator visibility.
        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = match serde_json::to_vec(&self.to_problem()) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize problem details");
                Vec::new()
            }
        };

        let mut response = (status, body).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON));
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::UnknownCity(id) => Self::NotFound(format!("city {id}")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<VersionError> for AppError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::Unsupported { requested, supported } => {
                Self::UnsupportedVersion { requested, supported }
            }
            VersionError::Ambiguous { supported } => Self::AmbiguousVersion { supported },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<NegotiationError> for AppError {
    fn from(err: NegotiationError) -> Self {
        match err {
            NegotiationError::NotAcceptable { requested, supported } => {
                Self::NotAcceptable { requested, supported }
            }
            NegotiationError::UnsupportedMediaType(media) => Self::UnsupportedMediaType(media),
            NegotiationError::Malformed(reason) => Self::BadRequest(reason),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MappingError> for AppError {
    fn from(err: MappingError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn unsupported_version_lists_supported_versions() {
        let problem = AppError::UnsupportedVersion {
            requested: "2.0".to_string(),
            supported: vec!["1.0".to_string()],
        }
        .to_problem();
        assert_eq!(problem.status, 400);
        assert_eq!(problem.extensions["supportedVersions"], serde_json::json!(["1.0"]));
        assert!(problem.detail.unwrap().contains("'2.0'"));
    }

    #[test]
    fn internal_error_hides_message() {
        let problem = AppError::Internal("connection refused at 10.0.0.3".to_string()).to_problem();
        assert_eq!(problem.status, 500);
        assert!(!problem.detail.unwrap().contains("10.0.0.3"));
    }

    #[test]
    fn unauthenticated_detail_is_generic() {
        let problem = AppError::Unauthenticated.to_problem();
        assert_eq!(problem.status, 401);
        assert_eq!(problem.detail.as_deref(), Some(AUTHENTICATION_REQUIRED));
    }

    #[test]
    fn unknown_city_maps_to_not_found() {
        let err: AppError = RepositoryError::UnknownCity(cityinfo_core::CityId::new(4)).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn problem_serializes_type_member() {
        let json = serde_json::to_value(AppError::NotFound("city 9".into()).to_problem()).unwrap();
        assert_eq!(json["type"], "https://tools.ietf.org/html/rfc9110#section-15.5.5");
        assert_eq!(json["title"], "Not Found");
    }

    #[test]
    fn method_not_allowed_is_405() {
        let problem = AppError::MethodNotAllowed("DELETE".into()).to_problem();
        assert_eq!(problem.status, 405);
        assert_eq!(problem.kind, "https://tools.ietf.org/html/rfc9110#section-15.5.6");
        assert!(problem.detail.unwrap().contains("DELETE"));
    }

    #[tokio::test]
    async fn into_response_sets_problem_content_type() {
        let response = AppError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_JSON);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], 401);
    }
}

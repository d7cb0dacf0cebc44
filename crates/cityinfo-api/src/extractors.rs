//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, a [`NegotiatedBody`]
//! extractor that reads JSON or XML according to `Content-Type`, and a path
//! helper that maps rejections to problem-details errors.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::{FromRef, FromRequest, Path, Request};
use axum::http::header;
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::negotiation::ContentNegotiator;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract path parameters, mapping rejections to [`AppError::BadRequest`].
pub fn extract_path<T>(result: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    result
        .map(|Path(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// A request body parsed in the format its `Content-Type` names.
#[derive(Debug, Clone)]
pub struct NegotiatedBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for NegotiatedBody<T>
where
    S: Send + Sync,
    Arc<ContentNegotiator>: FromRef<S>,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let negotiator = Arc::<ContentNegotiator>::from_ref(state);
        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let format = negotiator.input_format(content_type.as_deref())?;
        let bytes = Bytes::from_request(request, state)
            .await
            .map_err(|err| AppError::BadRequest(err.body_text()))?;
        Ok(Self(format.from_bytes(&bytes)?))
    }
}

/// Extract a negotiated body and validate it using the [`Validate`] trait.
pub fn extract_validated<T: Validate>(
    result: Result<NegotiatedBody<T>, AppError>,
) -> Result<T, AppError> {
    let NegotiatedBody(value) = result?;
    value.validate().map_err(AppError::BadRequest)?;
    Ok(value)
}

//! # Request/Response Tracing
//!
//! Configures `tower_http::trace::TraceLayer` so every request runs in a span
//! carrying a request id, the method, the URI and the forwarded client.

use axum::extract::Request;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::TraceLayer;
use tracing::Span;
use uuid::Uuid;

use super::forwarded::ForwardedInfo;

/// Build the request span.
pub fn make_span(request: &Request) -> Span {
    let client = request
        .extensions()
        .get::<ForwardedInfo>()
        .and_then(|f| f.client)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "-".to_string());
    tracing::info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        uri = %request.uri(),
        client = %client,
    )
}

/// Build a `TraceLayer` with [`make_span`].
pub fn layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, fn(&Request) -> Span> {
    TraceLayer::new_for_http().make_span_with(make_span as fn(&Request) -> Span)
}

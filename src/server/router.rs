//! Router builder utilities for exposed resources

use crate::server::handler::{ResourceHandler, ResourceRequest};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};

/// Build the resource routes
///
/// Resource paths are only known at runtime, so a single fallback serves
/// every exposed path:
/// - GET {base}/ - root resource listing every collection
/// - GET|POST {base}/{resource} - collection
/// - GET|PUT|PATCH|DELETE {base}/{resource}/{id} - item
/// - GET {base}/{resource}/{id}/{association} - association target(s)
/// - GET {base}/{resource}/search - search methods
/// - GET {base}/{resource}/search/{rel} - search invocation
/// - OPTIONS on any of the above - allowed verbs
pub fn build_resource_routes(handler: ResourceHandler) -> Router {
    Router::new()
        .fallback(handle_resource)
        .with_state(handler)
}

async fn handle_resource(
    State(handler): State<ResourceHandler>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = ResourceRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };

    match handler.handle(request).await {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}

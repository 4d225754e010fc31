//! Request handling.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for tracing
//! - Extract the routing host from the request
//! - Build the data passed to page templates
//!
//! # Design Decisions
//! - Request ID added as early as possible and echoed on the response
//! - The Host header is used verbatim; config entries include the port if needed

use std::collections::BTreeMap;
use axum::http::{header, HeaderMap, HeaderValue, Request};
use serde::Serialize;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates `x-request-id` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Host the request was addressed to, or an empty string.
pub fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Data every page template receives.
#[derive(Debug, Clone, Serialize)]
pub struct PageData {
    pub host: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
}

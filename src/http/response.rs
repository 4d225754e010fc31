//! Response construction.
//!
//! # Responsibilities
//! - Map registry errors to HTTP status codes
//! - Pick a content type from the file or template name
//!
//! # Design Decisions
//! - Internal error details are logged, not sent to the client
//! - Sandbox escapes are 403 so probing is visible in logs and to clients

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::registry::RegistryError;
use crate::sandbox::SandboxError;

pub fn status_for(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::NoHostConfigured { .. } => StatusCode::NOT_FOUND,
        RegistryError::Render { .. } if err.is_template_missing() => StatusCode::NOT_FOUND,
        RegistryError::Sandbox(SandboxError::PathEscape { .. }) => StatusCode::FORBIDDEN,
        RegistryError::Sandbox(SandboxError::NotFound { .. }) => StatusCode::NOT_FOUND,
        RegistryError::NoTemplatesForHost { .. }
        | RegistryError::RetryExhausted { .. }
        | RegistryError::ShutDown => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: &RegistryError, request_id: &str) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(request_id = %request_id, error = %err, "Request failed");
    } else {
        tracing::warn!(request_id = %request_id, error = %err, "Request rejected");
    }
    let reason = status.canonical_reason().unwrap_or("Error");
    (status, reason).into_response()
}

/// Content type for `name`, or `fallback` for unknown extensions.
pub fn content_type_for(name: &str, fallback: &'static str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" | "md" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&RegistryError::NoHostConfigured { host: "x".into() }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RegistryError::Sandbox(SandboxError::PathEscape { requested: "..".into() })),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&RegistryError::Sandbox(SandboxError::NotFound { path: PathBuf::from("a") })),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RegistryError::RetryExhausted { template: "t".into(), attempts: 10 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(&RegistryError::ShutDown), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("index.html", "x"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("a/b.CSS", "x"), "text/css; charset=utf-8");
        assert_eq!(content_type_for("blob.bin", "application/octet-stream"), "application/octet-stream");
        assert_eq!(content_type_for("noext", "fallback"), "fallback");
    }
}

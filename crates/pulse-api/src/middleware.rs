//! ---
//! pulse_section: "05-networking-external-interfaces"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Per-request trace scoping and request logging."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
//! Request tracing middleware.
//!
//! Every request runs inside its own [`TraceContext`] scope, so each log line
//! produced while serving it carries the same trace identifier. A caller may
//! supply the identifiers through `x-trace-id` and `x-request-id`; otherwise
//! fresh ones are generated. Both are echoed on the response.

use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use pulse_logging::{generate_trace_id, TraceContext};
use std::any::Any;
use tracing::{error, info};
use uuid::Uuid;

pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Longest caller supplied identifier accepted verbatim.
const MAX_ID_LEN: usize = 128;

fn header_id(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_ID_LEN)
        .map(str::to_owned)
}

/// Scope the request in a trace context and log it on the way in and out.
pub async fn trace_requests(request: Request, next: Next) -> Response {
    let trace_id = header_id(request.headers(), &TRACE_ID_HEADER).unwrap_or_else(generate_trace_id);
    let request_id =
        header_id(request.headers(), &REQUEST_ID_HEADER).unwrap_or_else(|| Uuid::new_v4().to_string());
    let ctx = TraceContext::new(trace_id).with_request_id(request_id);
    let trace_id = ctx.trace_id().to_owned();
    let request_id = ctx.request_id().unwrap_or_default().to_owned();

    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let mut response = ctx
        .scope(async move {
            info!("Request: {method} {path}");
            let response = next.run(request).await;
            info!("Response: {method} {path} -> {}", response.status().as_u16());
            response
        })
        .await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        headers.insert(TRACE_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Turn a handler panic into the generic JSON 500 response.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    error!(exception = %detail, "Handler panicked while serving request");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        r#"{"error":"Internal server error"}"#,
    )
        .into_response()
}

//! JSON-RPC HTTP responses.
//!
//! # Responsibilities
//! - Mirror the inbound cardinality (object in, object out; array in, array out)
//! - Attach `X-Served-By` when enabled
//! - Map whole-request rejections onto HTTP status (429 + `Retry-After` for rate limits)
//! - Produce the empty 499 response for abandoned requests

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::rpc::{ProxyError, RpcResponse};

pub const X_SERVED_BY: &str = "x-served-by";

/// Status recorded and returned when the client goes away or the deadline passes.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Outbound body, shaped like the inbound one.
#[derive(Debug, Clone)]
pub enum RpcBody {
    Single(RpcResponse),
    Batch(Vec<RpcResponse>),
}

impl RpcBody {
    fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            RpcBody::Single(response) => serde_json::to_vec(response),
            RpcBody::Batch(responses) => serde_json::to_vec(responses),
        }
    }
}

fn json_response(status: StatusCode, body: &RpcBody) -> Response {
    match body.to_json() {
        Ok(bytes) => (status, [(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// A dispatched request's response. `served_by` is attached when present.
pub fn rpc_response(body: &RpcBody, served_by: Option<&str>) -> Response {
    let mut response = json_response(StatusCode::OK, body);
    if let Some(value) = served_by.and_then(|v| HeaderValue::from_str(v).ok()) {
        response.headers_mut().insert(X_SERVED_BY, value);
    }
    response
}

/// A single error object rejecting the whole request.
pub fn error_response(id: Value, error: &ProxyError) -> Response {
    let mut response = json_response(error.http_status(), &RpcBody::Single(RpcResponse::error(id, error)));
    if error.is_rate_limit() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from_static("1"));
    }
    response
}

/// Empty 499 response. Nobody is normally left to read it.
pub fn client_closed() -> Response {
    let status = StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::REQUEST_TIMEOUT);
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

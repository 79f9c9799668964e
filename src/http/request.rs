//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4) and propagate them
//! - Extract the forwarding hints of one inbound request into `RequestMetadata`
//! - Resolve the client identity from `X-Forwarded-For` or the peer address
//!
//! # Design Decisions
//! - Metadata is built once per request and only read afterwards
//! - The reserved auth header is never copied into metadata, whatever the forward list says

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, Uri};
use std::collections::HashMap;
use std::net::SocketAddr;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::security::headers::{is_reserved_header, strip_xff, X_FORWARDED_FOR};

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_ORIGINAL_PATH: &str = "x-original-path";
pub const X_ORIGINAL_QUERY: &str = "x-original-query";

/// Generates `x-request-id` values for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Layer that assigns a request ID to every inbound request.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Layer that echoes the request ID on the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Request ID of an inbound request, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Which inbound hints are copied onto outbound calls.
#[derive(Debug, Clone, Default)]
pub struct ForwardingPolicy {
    header_names: Vec<HeaderName>,
    original_uri_headers: bool,
}

impl ForwardingPolicy {
    pub fn new(header_names: &[String], original_uri_headers: bool) -> Self {
        let header_names = header_names
            .iter()
            .filter_map(|name| match HeaderName::from_bytes(name.as_bytes()) {
                Ok(header) if is_reserved_header(&header) => {
                    tracing::warn!(header = %name, "Reserved header cannot be forwarded, ignoring");
                    None
                }
                Ok(header) => Some(header),
                Err(_) => {
                    tracing::warn!(header = %name, "Invalid forward header name, ignoring");
                    None
                }
            })
            .collect();
        Self {
            header_names,
            original_uri_headers,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.forward_headers, config.forward_original_uri_headers)
    }
}

/// Forwarding hints of one inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    /// Original request path.
    pub path: String,
    /// Original query string, still percent-encoded.
    pub raw_query: String,
    headers_to_forward: HashMap<HeaderName, Vec<HeaderValue>>,
}

impl RequestMetadata {
    pub fn new(path: impl Into<String>, raw_query: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            raw_query: raw_query.into(),
            headers_to_forward: HashMap::new(),
        }
    }

    /// Add a header to forward. Reserved headers are dropped.
    pub fn with_forwarded_header(mut self, name: HeaderName, values: Vec<HeaderValue>) -> Self {
        if !is_reserved_header(&name) {
            self.headers_to_forward.entry(name).or_default().extend(values);
        }
        self
    }

    pub fn headers_to_forward(&self) -> &HashMap<HeaderName, Vec<HeaderValue>> {
        &self.headers_to_forward
    }

    /// Build metadata from an inbound request.
    ///
    /// `forwarded_for` is the X-Forwarded-For chain to pass upstream.
    pub fn from_request(
        uri: &Uri,
        headers: &HeaderMap,
        policy: &ForwardingPolicy,
        forwarded_for: Option<&str>,
    ) -> Self {
        let mut metadata = Self::new(uri.path(), uri.query().unwrap_or(""));

        for name in &policy.header_names {
            let values: Vec<HeaderValue> = headers.get_all(name).iter().cloned().collect();
            if !values.is_empty() {
                metadata = metadata.with_forwarded_header(name.clone(), values);
            }
        }

        if let Some(id) = headers.get(X_REQUEST_ID) {
            metadata = metadata.with_forwarded_header(HeaderName::from_static(X_REQUEST_ID), vec![id.clone()]);
        }

        if let Some(chain) = forwarded_for.and_then(|c| HeaderValue::from_str(c).ok()) {
            metadata = metadata.with_forwarded_header(HeaderName::from_static(X_FORWARDED_FOR), vec![chain]);
        }

        if policy.original_uri_headers {
            if !metadata.path.is_empty() && metadata.path != "/" {
                if let Ok(value) = HeaderValue::from_str(&metadata.path) {
                    metadata = metadata.with_forwarded_header(HeaderName::from_static(X_ORIGINAL_PATH), vec![value]);
                }
            }
            if !metadata.raw_query.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&metadata.raw_query) {
                    metadata = metadata.with_forwarded_header(HeaderName::from_static(X_ORIGINAL_QUERY), vec![value]);
                }
            }
        }

        metadata
    }
}

/// The X-Forwarded-For chain to pass upstream: the inbound header if present,
/// otherwise the peer IP.
pub fn forwarded_for_chain(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Canonical client identity used for rate limiting and logging.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(chain) = headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            let first = strip_xff(chain);
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::headers::FLASHBOTS_AUTH_HEADER;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(HeaderName::from_bytes(k.as_bytes()).unwrap(), HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn test_path_and_query_extracted() {
        let uri: Uri = "/fast?hint=hash&builder=flashbots".parse().unwrap();
        let meta = RequestMetadata::from_request(&uri, &HeaderMap::new(), &ForwardingPolicy::default(), None);
        assert_eq!(meta.path, "/fast");
        assert_eq!(meta.raw_query, "hint=hash&builder=flashbots");
        assert!(meta.headers_to_forward().is_empty());
    }

    #[test]
    fn test_forward_list_copies_all_values() {
        let uri: Uri = "/".parse().unwrap();
        let inbound = headers(&[("x-builder", "a"), ("x-builder", "b"), ("x-other", "c")]);
        let policy = ForwardingPolicy::new(&["X-Builder".to_string(), "X-Missing".to_string()], false);
        let meta = RequestMetadata::from_request(&uri, &inbound, &policy, None);

        let forwarded = meta.headers_to_forward();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[&HeaderName::from_static("x-builder")].len(), 2);
    }

    #[test]
    fn test_reserved_header_never_forwarded() {
        let uri: Uri = "/".parse().unwrap();
        let inbound = headers(&[(FLASHBOTS_AUTH_HEADER, "0xabc:0xdef")]);
        let policy = ForwardingPolicy::new(&[FLASHBOTS_AUTH_HEADER.to_string()], false);
        let meta = RequestMetadata::from_request(&uri, &inbound, &policy, None);
        assert!(meta.headers_to_forward().is_empty());
    }

    #[test]
    fn test_original_uri_headers() {
        let policy = ForwardingPolicy::new(&[], true);

        let uri: Uri = "/fast?hint=calldata".parse().unwrap();
        let meta = RequestMetadata::from_request(&uri, &HeaderMap::new(), &policy, None);
        let forwarded = meta.headers_to_forward();
        assert_eq!(forwarded[&HeaderName::from_static(X_ORIGINAL_PATH)][0], "/fast");
        assert_eq!(forwarded[&HeaderName::from_static(X_ORIGINAL_QUERY)][0], "hint=calldata");

        let uri: Uri = "/?builder=rsync".parse().unwrap();
        let meta = RequestMetadata::from_request(&uri, &HeaderMap::new(), &policy, None);
        assert!(!meta.headers_to_forward().contains_key(&HeaderName::from_static(X_ORIGINAL_PATH)));
        assert!(meta.headers_to_forward().contains_key(&HeaderName::from_static(X_ORIGINAL_QUERY)));
    }

    #[test]
    fn test_forwarded_for_chain_falls_back_to_peer() {
        let peer: SocketAddr = "10.0.0.1:5555".parse().unwrap();
        assert_eq!(forwarded_for_chain(&HeaderMap::new(), Some(peer)).as_deref(), Some("10.0.0.1"));

        let inbound = headers(&[(X_FORWARDED_FOR, "1.2.3.4, 5.6.7.8")]);
        assert_eq!(forwarded_for_chain(&inbound, Some(peer)).as_deref(), Some("1.2.3.4, 5.6.7.8"));
    }

    #[test]
    fn test_client_identity() {
        let peer: SocketAddr = "10.0.0.1:5555".parse().unwrap();
        let inbound = headers(&[(X_FORWARDED_FOR, " 1.2.3.4 , 5.6.7.8")]);
        assert_eq!(client_identity(&inbound, Some(peer), true), "1.2.3.4");
        assert_eq!(client_identity(&inbound, Some(peer), false), "10.0.0.1");
        assert_eq!(client_identity(&HeaderMap::new(), None, true), "unknown");
    }
}

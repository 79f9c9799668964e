//! Outbound URL construction.
//!
//! Calls to augmented methods (by default `eth_sendRawTransaction`) carry the
//! inbound path and query to the backend so that endpoint variants such as
//! `/fast?hint=hash` reach the node unchanged. Every other call goes to the
//! backend's base URL.

use std::collections::HashSet;

use crate::http::request::RequestMetadata;
use crate::rpc::RpcRequest;

/// Compute the outbound URL for `batch`.
///
/// The query is appended verbatim; it is never re-encoded or validated.
pub fn build_backend_url(
    base_url: &str,
    batch: &[RpcRequest],
    metadata: &RequestMetadata,
    augmented_methods: &HashSet<String>,
) -> String {
    if !batch.iter().any(|req| augmented_methods.contains(&req.method)) {
        return base_url.to_string();
    }

    let path = metadata.path.as_str();
    let query = metadata.raw_query.as_str();

    let mut url = String::with_capacity(base_url.len() + path.len() + query.len() + 2);
    if path.is_empty() || path == "/" {
        url.push_str(base_url);
    } else {
        url.push_str(base_url.strip_suffix('/').unwrap_or(base_url));
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(path);
    }

    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn augmented() -> HashSet<String> {
        HashSet::from(["eth_sendRawTransaction".to_string()])
    }

    fn build(base: &str, method: &str, path: &str, query: &str) -> String {
        let batch = vec![RpcRequest::new(1, method, Value::Null)];
        build_backend_url(base, &batch, &RequestMetadata::new(path, query), &augmented())
    }

    #[test]
    fn test_slash_edge_cases() {
        assert_eq!(
            build("http://backend:8080/", "eth_sendRawTransaction", "/fast", ""),
            "http://backend:8080/fast"
        );
        assert_eq!(
            build("http://backend:8080/", "eth_sendRawTransaction", "/fast", "hint=hash"),
            "http://backend:8080/fast?hint=hash"
        );
        assert_eq!(
            build("http://backend:8080", "eth_sendRawTransaction", "/", "hint=hash"),
            "http://backend:8080?hint=hash"
        );
        assert_eq!(
            build("http://backend:8080", "eth_sendRawTransaction", "fast", ""),
            "http://backend:8080/fast"
        );
    }

    #[test]
    fn test_query_passes_through_verbatim() {
        assert_eq!(
            build("http://backend:8080", "eth_sendRawTransaction", "/fast", "hint=hash&builder=builder1&origin=wallet"),
            "http://backend:8080/fast?hint=hash&builder=builder1&origin=wallet"
        );
        assert_eq!(
            build(
                "http://backend:8080",
                "eth_sendRawTransaction",
                "/fast",
                "hint=0x1234%20test&url=https%3A%2F%2Fexample.com"
            ),
            "http://backend:8080/fast?hint=0x1234%20test&url=https%3A%2F%2Fexample.com"
        );
        assert_eq!(
            build("http://backend:8080", "eth_sendRawTransaction", "/fast", "signature=0xabc=def"),
            "http://backend:8080/fast?signature=0xabc=def"
        );
    }

    #[test]
    fn test_empty_path_and_query() {
        assert_eq!(
            build("http://backend:8080", "eth_sendRawTransaction", "", "hint=hash"),
            "http://backend:8080?hint=hash"
        );
        assert_eq!(
            build("http://backend:8080", "eth_sendRawTransaction", "/fast", ""),
            "http://backend:8080/fast"
        );
        assert_eq!(
            build("http://backend:8080", "eth_sendRawTransaction", "", ""),
            "http://backend:8080"
        );
    }

    #[test]
    fn test_other_methods_ignore_metadata() {
        assert_eq!(
            build("http://backend:8080", "eth_call", "/fast", "hint=hash&builder=builder1"),
            "http://backend:8080"
        );
    }

    #[test]
    fn test_mixed_batch_is_augmented() {
        let batch = vec![
            RpcRequest::new(1, "eth_chainId", Value::Null),
            RpcRequest::new(2, "eth_sendRawTransaction", Value::Null),
        ];
        let url = build_backend_url(
            "http://backend:8080",
            &batch,
            &RequestMetadata::new("/fast", ""),
            &augmented(),
        );
        assert_eq!(url, "http://backend:8080/fast");
    }

    #[test]
    fn test_empty_batch_returns_base() {
        let meta = RequestMetadata::new("/fast", "hint=hash");
        assert_eq!(
            build_backend_url("http://backend:8080", &[], &meta, &augmented()),
            "http://backend:8080"
        );
    }

    #[test]
    fn test_production_url() {
        assert_eq!(
            build(
                "http://rpc-endpoint.flashbots.svc.cluster.local:8080",
                "eth_sendRawTransaction",
                "/fast",
                "hint=0xabcdef1234567890&builder=flashbots&origin=metamask"
            ),
            "http://rpc-endpoint.flashbots.svc.cluster.local:8080/fast?hint=0xabcdef1234567890&builder=flashbots&origin=metamask"
        );
    }

    #[test]
    fn test_never_doubles_slash_or_slashes_before_query() {
        for base in ["http://b:8080", "http://b:8080/"] {
            for path in ["", "/", "/fast", "fast"] {
                for query in ["", "a=b"] {
                    let url = build(base, "eth_sendRawTransaction", path, query);
                    let after_scheme = &url["http://".len()..];
                    assert!(!after_scheme.contains("//"), "{}", url);
                    if base == "http://b:8080" {
                        assert!(!url.contains("/?"), "{}", url);
                    }
                }
            }
        }
    }
}

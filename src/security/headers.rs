//! Outbound header computation.
//!
//! # Responsibilities
//! - Strip the reserved auth header from everything forwarded upstream
//! - Recompute a signed auth header for backends configured with a key
//! - Append forwarded headers from the request metadata, one value at a time
//! - Canonicalize the client identity from `X-Forwarded-For`
//!
//! # Design Decisions
//! - The auth header is signed against the exact outbound body, per attempt
//! - A forwarded header with no values never appears on the outbound request

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

use crate::blockchain::{AuthSigner, ChainError};
use crate::http::request::RequestMetadata;

/// Reserved header carrying `"<address>:<signature>"` for privileged backends.
pub const FLASHBOTS_AUTH_HEADER: &str = "X-Flashbots-Signature";

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that are never copied from the client to a backend.
pub fn is_reserved_header(name: &HeaderName) -> bool {
    name.as_str().eq_ignore_ascii_case(FLASHBOTS_AUTH_HEADER)
}

/// First token of an X-Forwarded-For chain, trimmed.
pub fn strip_xff(xff: &str) -> &str {
    xff.split(',').next().unwrap_or_default().trim()
}

/// Computes the header set of outbound requests for one backend.
#[derive(Debug, Clone, Default)]
pub struct HeaderProvider {
    signer: Option<AuthSigner>,
}

impl HeaderProvider {
    pub fn new(signer: Option<AuthSigner>) -> Self {
        Self { signer }
    }

    /// Build the outbound headers for `body`.
    pub fn outbound_headers(
        &self,
        body: &[u8],
        metadata: &RequestMetadata,
    ) -> Result<HeaderMap, ChainError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, values) in metadata.headers_to_forward() {
            if is_reserved_header(name) {
                continue;
            }
            for value in values {
                headers.append(name.clone(), value.clone());
            }
        }

        if let Some(signer) = &self.signer {
            let signed = signer.sign_body(body)?;
            let value = HeaderValue::from_str(&signed)
                .map_err(|e| ChainError::Signer(format!("unencodable auth header: {}", e)))?;
            headers.insert(HeaderName::from_static("x-flashbots-signature"), value);
        }

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::verify_auth_header;

    const TEST_PRIVATE_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c6c5d0441ef3e59cb8c27";

    #[test]
    fn test_strip_xff() {
        assert_eq!(strip_xff("1.2.3, 4.5.6, 7.8.9"), "1.2.3");
        assert_eq!(strip_xff("1.2.3,4.5.6"), "1.2.3");
        assert_eq!(strip_xff(" 1.2.3 , 4.5.6 "), "1.2.3");
        assert_eq!(strip_xff(""), "");
    }

    #[test]
    fn test_forwarded_headers_are_appended() {
        let meta = RequestMetadata::new("/", "")
            .with_forwarded_header(
                HeaderName::from_static("x-builder"),
                vec![HeaderValue::from_static("a"), HeaderValue::from_static("b")],
            )
            .with_forwarded_header(HeaderName::from_static("x-empty"), Vec::new());

        let headers = HeaderProvider::default().outbound_headers(b"{}", &meta).unwrap();
        let builders: Vec<_> = headers.get_all("x-builder").iter().collect();
        assert_eq!(builders, vec!["a", "b"]);
        assert!(!headers.contains_key("x-empty"));
        assert!(headers.get("x-absent").is_none());
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_reserved_header_is_stripped_for_plain_backends() {
        // Bypass the metadata builder filter to prove the provider filters too.
        let mut meta = RequestMetadata::new("/", "");
        meta = meta.with_forwarded_header(
            HeaderName::from_static("x-flashbots-signature"),
            vec![HeaderValue::from_static("0xabc:0xdef")],
        );

        let headers = HeaderProvider::default().outbound_headers(b"{}", &meta).unwrap();
        assert!(headers.get(FLASHBOTS_AUTH_HEADER).is_none());
    }

    #[test]
    fn test_signing_backend_gets_header_over_actual_body() {
        let signer = AuthSigner::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let provider = HeaderProvider::new(Some(signer.clone()));

        let body = br#"{"jsonrpc":"2.0","method":"net_version","id":"2"}"#;
        let headers = provider.outbound_headers(body, &RequestMetadata::default()).unwrap();

        let values: Vec<_> = headers.get_all(FLASHBOTS_AUTH_HEADER).iter().collect();
        assert_eq!(values.len(), 1);
        let header = values[0].to_str().unwrap();
        assert_eq!(header, signer.sign_body(body).unwrap());
        assert_eq!(verify_auth_header(header, body).unwrap(), signer.address());
    }
}

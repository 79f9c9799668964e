//! Signed auth header computation and verification.
//!
//! The header value is `"<checksummed address>:<0x-prefixed signature>"` where
//! the signature covers the EIP-191 text hash of the hex-encoded Keccak-256
//! digest of the request body. The recovery byte is `0`/`1`.
//!
//! # Security
//! - Private keys are never logged or serialized
//! - Signatures are always computed over the exact bytes sent upstream

use alloy::primitives::{hex, keccak256, Address, Signature};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::blockchain::types::{ChainError, ChainResult};

/// Signs outbound request bodies on behalf of a privileged backend.
#[derive(Debug, Clone)]
pub struct AuthSigner {
    signer: PrivateKeySigner,
}

impl AuthSigner {
    /// Create a signer from a hex-encoded private key (with or without 0x prefix).
    pub fn from_private_key(private_key_hex: &str) -> ChainResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| ChainError::Signer(format!("Invalid private key format: {}", e)))?;

        tracing::info!(address = %signer.address(), "Auth signer initialized");

        Ok(Self { signer })
    }

    /// Get the signer's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Compute the auth header value for `body`.
    pub fn sign_body(&self, body: &[u8]) -> ChainResult<String> {
        let message = body_digest_hex(body);
        let signature = self
            .signer
            .sign_message_sync(message.as_bytes())
            .map_err(|e| ChainError::Signer(format!("Signing failed: {}", e)))?;

        Ok(format!(
            "{}:{}",
            self.address().to_checksum(None),
            hex::encode_prefixed(signature_bytes(&signature))
        ))
    }
}

/// Verify an auth header value against `body`, returning the signer address.
pub fn verify_auth_header(header: &str, body: &[u8]) -> ChainResult<Address> {
    let (address, signature) = header
        .split_once(':')
        .ok_or_else(|| ChainError::InvalidAuthHeader("expected <address>:<signature>".into()))?;

    let claimed: Address = address
        .trim()
        .parse()
        .map_err(|e| ChainError::InvalidAuthHeader(format!("bad address: {}", e)))?;
    let raw = hex::decode(signature.trim())
        .map_err(|e| ChainError::InvalidAuthHeader(format!("bad signature hex: {}", e)))?;
    let signature = Signature::from_raw(&raw)
        .map_err(|e| ChainError::InvalidAuthHeader(format!("bad signature: {}", e)))?;

    let recovered = signature
        .recover_address_from_msg(body_digest_hex(body).as_bytes())
        .map_err(|e| ChainError::InvalidAuthHeader(format!("recovery failed: {}", e)))?;

    if recovered != claimed {
        return Err(ChainError::SignatureMismatch(claimed.to_checksum(None)));
    }
    Ok(recovered)
}

fn body_digest_hex(body: &[u8]) -> String {
    hex::encode_prefixed(keccak256(body))
}

/// `r || s || v` with `v` as the raw recovery id.
fn signature_bytes(signature: &Signature) -> [u8; 65] {
    let mut bytes = [0u8; 65];
    bytes[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
    bytes[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
    bytes[64] = signature.v() as u8;
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    // Fixed development key used across the signing tests
    const TEST_PRIVATE_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c6c5d0441ef3e59cb8c27";
    const TEST_ADDRESS: &str = "0xD1c36bF53263d157565B947212BD327B0A8b4dbd";

    #[test]
    fn test_signer_from_private_key() {
        let signer = AuthSigner::from_private_key(TEST_PRIVATE_KEY).unwrap();
        assert_eq!(signer.address().to_checksum(None), TEST_ADDRESS);

        let prefixed = AuthSigner::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY)).unwrap();
        assert_eq!(prefixed.address(), signer.address());
    }

    #[test]
    fn test_invalid_private_key() {
        let result = AuthSigner::from_private_key("invalid_key");
        assert!(result.unwrap_err().to_string().contains("Invalid private key"));
    }

    #[test]
    fn test_header_format() {
        let signer = AuthSigner::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let header = signer.sign_body(br#"{"jsonrpc":"2.0","method":"net_version","id":2}"#).unwrap();

        let (address, signature) = header.split_once(':').unwrap();
        assert_eq!(address, TEST_ADDRESS);
        assert!(signature.starts_with("0x"));
        // 65 bytes hex-encoded
        assert_eq!(signature.len(), 2 + 130);
        let v = &signature[signature.len() - 2..];
        assert!(v == "00" || v == "01");
    }

    #[test]
    fn test_signing_is_deterministic_and_verifies() {
        let signer = AuthSigner::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let body = br#"[{"jsonrpc":"2.0","method":"eth_chainId","id":1}]"#;

        let first = signer.sign_body(body).unwrap();
        let second = signer.sign_body(body).unwrap();
        assert_eq!(first, second);

        assert_eq!(verify_auth_header(&first, body).unwrap(), signer.address());
    }

    #[test]
    fn test_signature_does_not_cover_other_body() {
        let signer = AuthSigner::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let header = signer.sign_body(b"original").unwrap();

        let err = verify_auth_header(&header, b"tampered").unwrap_err();
        assert!(matches!(err, ChainError::SignatureMismatch(_)));
    }

    #[test]
    fn test_malformed_header() {
        assert!(matches!(
            verify_auth_header("no-separator", b"{}"),
            Err(ChainError::InvalidAuthHeader(_))
        ));
        assert!(matches!(
            verify_auth_header(&format!("{}:0xzz", TEST_ADDRESS), b"{}"),
            Err(ChainError::InvalidAuthHeader(_))
        ));
    }
}

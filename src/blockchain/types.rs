//! Chain-specific error definitions.

use thiserror::Error;

/// Errors that can occur while signing or decoding chain data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Invalid private key format or signing failure.
    #[error("Signer error: {0}")]
    Signer(String),

    /// Malformed auth header value.
    #[error("Invalid auth header: {0}")]
    InvalidAuthHeader(String),

    /// Signature recovered to a different address than the one claimed.
    #[error("Signature does not match address {0}")]
    SignatureMismatch(String),

    /// Raw transaction could not be decoded or its sender recovered.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Transaction targets a chain the proxy does not accept.
    #[error("Chain ID {0} not allowed")]
    ChainNotAllowed(u64),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChainError::ChainNotAllowed(10);
        assert_eq!(err.to_string(), "Chain ID 10 not allowed");

        let err = ChainError::InvalidTransaction("empty".into());
        assert!(err.to_string().contains("empty"));
    }
}

//! Raw transaction decoding and sender recovery.
//!
//! # Responsibilities
//! - Decode EIP-2718 encoded transactions submitted via raw-transaction methods
//! - Recover the signer for sender-keyed rate limiting
//! - Enforce the accepted chain ID set

use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{hex, Address};
use serde_json::Value;

use crate::blockchain::types::{ChainError, ChainResult};

/// Identity facts extracted from a signed raw transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTransactionInfo {
    pub sender: Address,
    pub nonce: u64,
    pub chain_id: Option<u64>,
}

impl RawTransactionInfo {
    /// Key used by the sender rate limiter.
    pub fn rate_limit_key(&self) -> String {
        format!("{}:{}", self.sender.to_checksum(None), self.nonce)
    }
}

/// Decode the first param of a raw-transaction call.
pub fn decode_raw_transaction(params: &Value) -> ChainResult<RawTransactionInfo> {
    let encoded = params
        .as_array()
        .and_then(|p| p.first())
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::InvalidTransaction("missing raw transaction param".into()))?;

    let bytes = hex::decode(encoded)
        .map_err(|e| ChainError::InvalidTransaction(format!("bad hex: {}", e)))?;
    if bytes.is_empty() {
        return Err(ChainError::InvalidTransaction("empty transaction".into()));
    }

    let envelope = TxEnvelope::decode_2718(&mut bytes.as_slice())
        .map_err(|e| ChainError::InvalidTransaction(format!("decode failed: {}", e)))?;
    let sender = envelope
        .recover_signer()
        .map_err(|e| ChainError::InvalidTransaction(format!("sender recovery failed: {}", e)))?;

    Ok(RawTransactionInfo {
        sender,
        nonce: envelope.nonce(),
        chain_id: envelope.chain_id(),
    })
}

/// Reject transactions whose chain ID is outside `allowed` (empty allows all).
pub fn check_chain_id(info: &RawTransactionInfo, allowed: &[u64]) -> ChainResult<()> {
    if allowed.is_empty() {
        return Ok(());
    }
    match info.chain_id {
        Some(id) if allowed.contains(&id) => Ok(()),
        Some(id) => Err(ChainError::ChainNotAllowed(id)),
        None => Err(ChainError::InvalidTransaction("missing chain id".into())),
    }
}

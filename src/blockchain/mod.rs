//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Backend config (signing key, possibly from environment)
//!     → signer.rs (sign outbound bodies, verify inbound auth headers)
//! eth_sendRawTransaction params
//!     → transaction.rs (decode, recover sender, check chain id)
//! ```
//!
//! # Security Constraints
//! - Private keys may come from environment variables via `$NAME` config values
//! - Never log private keys or auth header values

pub mod signer;
pub mod transaction;
pub mod types;

pub use signer::{verify_auth_header, AuthSigner};
pub use transaction::{check_chain_id, decode_raw_transaction, RawTransactionInfo};
pub use types::{ChainError, ChainResult};

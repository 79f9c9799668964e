//! Client-facing error taxonomy.
//!
//! Every variant maps onto a JSON-RPC error code. Only rate-limit rejections
//! of a whole request change the HTTP status; everything else is reported
//! with `200` and a JSON-RPC error body.

use axum::http::StatusCode;
use thiserror::Error;

use crate::rpc::types::RpcError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("parse error")]
    Parse,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("rpc method is not whitelisted")]
    MethodNotWhitelisted,

    #[error("too many RPC calls in batch request")]
    TooManyBatchRequests,

    #[error("request body too large")]
    RequestBodyTooLarge,

    #[error("over rate limit")]
    OverRateLimit,

    #[error("sender is over rate limit")]
    OverSenderRateLimit,

    /// Every member of the resolved backend group failed.
    #[error("no backends available for method")]
    BackendUnavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn code(&self) -> i64 {
        match self {
            ProxyError::Parse => -32700,
            ProxyError::InvalidRequest(_) => -32600,
            ProxyError::InvalidParams(_) => -32602,
            ProxyError::Internal(_) => -32603,
            ProxyError::MethodNotWhitelisted => -32001,
            ProxyError::BackendUnavailable => -32011,
            ProxyError::TooManyBatchRequests => -32014,
            ProxyError::OverRateLimit => -32016,
            ProxyError::OverSenderRateLimit => -32017,
            ProxyError::RequestBodyTooLarge => -32021,
        }
    }

    /// HTTP status used when this error rejects the whole request.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ProxyError::OverRateLimit | ProxyError::OverSenderRateLimit => {
                StatusCode::TOO_MANY_REQUESTS
            }
            _ => StatusCode::OK,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProxyError::OverRateLimit | ProxyError::OverSenderRateLimit)
    }

    pub fn to_rpc_error(&self) -> RpcError {
        RpcError {
            code: self.code(),
            message: self.to_string(),
            data: None,
        }
    }
}

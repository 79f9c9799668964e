//! Request limits.
//!
//! # Responsibilities
//! - Enforce the method allow-list
//! - Enforce maximum inbound batch size
//! - Enforce maximum inbound body size

use std::collections::HashSet;

use crate::rpc::ProxyError;

/// Methods clients may call. Derived from the method → group routing table.
#[derive(Debug, Clone, Default)]
pub struct MethodAllowList {
    methods: HashSet<String>,
}

impl MethodAllowList {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }

    pub fn check(&self, method: &str) -> Result<(), ProxyError> {
        if self.methods.contains(method) {
            Ok(())
        } else {
            Err(ProxyError::MethodNotWhitelisted)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_body_size: usize,
    pub max_batch_size: usize,
}

impl RequestLimits {
    pub fn check_body_size(&self, len: usize) -> Result<(), ProxyError> {
        if len > self.max_body_size {
            return Err(ProxyError::RequestBodyTooLarge);
        }
        Ok(())
    }

    /// An empty batch is rejected as an invalid request.
    pub fn check_batch_size(&self, len: usize) -> Result<(), ProxyError> {
        if len == 0 {
            return Err(ProxyError::InvalidRequest("empty batch".into()));
        }
        if len > self.max_batch_size {
            return Err(ProxyError::TooManyBatchRequests);
        }
        Ok(())
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (mappings → groups → backends)
//! - Validate value ranges (limits > 0, URLs parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("backend '{name}' has invalid rpc_url '{url}'")]
    InvalidBackendUrl { name: String, url: String },

    #[error("duplicate backend name '{0}'")]
    DuplicateBackend(String),

    #[error("duplicate backend group name '{0}'")]
    DuplicateGroup(String),

    #[error("backend group '{0}' has no backends")]
    EmptyGroup(String),

    #[error("backend group '{group}' references unknown backend '{backend}'")]
    UnknownBackend { group: String, backend: String },

    #[error("method '{method}' maps to unknown backend group '{group}'")]
    UnknownGroup { method: String, group: String },

    #[error("backend '{0}' has max_concurrent_rpcs = 0")]
    ZeroConcurrency(String),

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.max_body_size_bytes == 0 {
        errors.push(ValidationError::ZeroLimit("server.max_body_size_bytes"));
    }
    if config.server.max_batch_size == 0 {
        errors.push(ValidationError::ZeroLimit("server.max_batch_size"));
    }
    if config.server.max_upstream_batch_size == 0 {
        errors.push(ValidationError::ZeroLimit("server.max_upstream_batch_size"));
    }
    if config.server.timeout_secs == 0 {
        errors.push(ValidationError::ZeroLimit("server.timeout_secs"));
    }

    let mut backend_names = HashSet::new();
    for backend in &config.backends {
        if !backend_names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        if Url::parse(&backend.rpc_url).is_err() {
            errors.push(ValidationError::InvalidBackendUrl {
                name: backend.name.clone(),
                url: backend.rpc_url.clone(),
            });
        }
        if backend.max_concurrent_rpcs == Some(0) {
            errors.push(ValidationError::ZeroConcurrency(backend.name.clone()));
        }
    }

    let mut group_names = HashSet::new();
    for group in &config.backend_groups {
        if !group_names.insert(group.name.as_str()) {
            errors.push(ValidationError::DuplicateGroup(group.name.clone()));
        }
        if group.backends.is_empty() {
            errors.push(ValidationError::EmptyGroup(group.name.clone()));
        }
        for member in &group.backends {
            if !backend_names.contains(member.as_str()) {
                errors.push(ValidationError::UnknownBackend {
                    group: group.name.clone(),
                    backend: member.clone(),
                });
            }
        }
    }

    for (method, group) in &config.rpc_method_mappings {
        if !group_names.contains(group.as_str()) {
            errors.push(ValidationError::UnknownGroup {
                method: method.clone(),
                group: group.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

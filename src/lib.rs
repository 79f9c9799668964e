//! Hardened JSON-RPC reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                              ┌──────────────────────────────────────────────────────┐
//!                              │                      RPC PROXY                        │
//!     Client Request           │  ┌─────────┐    ┌────────────┐    ┌──────────────┐   │
//!     ─────────────────────────┼─▶│  http   │───▶│  security  │───▶│    cache     │   │
//!                              │  │ server  │    │ limits/rl  │    │              │   │
//!                              │  └─────────┘    └────────────┘    └──────┬───────┘   │
//!                              │                                         ▼            │
//!                              │                                  ┌──────────────┐    │
//!                              │                                  │load_balancer │    │
//!                              │                                  │ group/backend│    │
//!                              │                                  └──────┬───────┘    │
//!     Client Response          │  ┌─────────┐                    ┌──────▼───────┐    │
//!     ◀────────────────────────┼──│response │◀───────────────────│  transport   │◀───┼── Backend
//!                              │  └─────────┘                    │ (gated HTTP) │    │   Nodes
//!                              │                                 └──────────────┘    │
//!                              │  config · blockchain · observability · resilience   │
//!                              │  lifecycle · rpc                                     │
//!                              └──────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod rpc;

// Traffic management
pub mod cache;
pub mod load_balancer;

// Cross-cutting concerns
pub mod blockchain;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::{HttpServer, RpcServer};
pub use lifecycle::Shutdown;
pub use observability::Metrics;

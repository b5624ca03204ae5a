//! HomeyPro MCP query core in Rust
//!
//! Exposes a HomeyPro controller's devices, zones, flows and system overview
//! through a cached, cursor-paginated query interface.
//!
//! # Features
//!
//! - Per-resource TTL cache with stale fallback when the controller is unreachable
//! - Single-flight refresh: concurrent readers of a key share one upstream fetch
//! - Opaque, bounds-checked pagination cursors
//! - Retry with backoff and a circuit breaker around the HomeyPro REST API
//! - Tool table filtered by allow/deny lists

// Core modules
pub mod client;
pub mod config;
pub mod error;
pub mod error_recovery;
pub mod logging;
pub mod server;

// Re-export main types for convenience
pub use client::{FetchResult, Fetcher, FnFetcher};
pub use config::ServerConfig;
pub use error::{ErrorDetail, FetchError, FetchErrorKind, HomeyError, Result};
pub use server::{
    build_query_facade, PageCodec, PageResult, QueryFacade, ResourceCache, ResourceKind,
    ToolTable,
};

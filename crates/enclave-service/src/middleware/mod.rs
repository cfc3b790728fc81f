//! Middleware for Enclave.
//!
//! # Components
//!
//! - `identity` - Builds the per-request caller identity from `X-User-ID`
//! - `http_metrics` - HTTP request metrics middleware

pub mod http_metrics;
pub mod identity;

pub use http_metrics::http_metrics_middleware;
pub use identity::identify_caller;

//! Enclave service library.
//!
//! Backend for an end-to-end-encrypted messaging application: room access
//! control, transactional room provisioning and live fan-out of
//! notifications to WebSocket subscribers. Message and notification bodies
//! are ciphertext and are never inspected.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `context` - Per-request caller identity
//! - `errors` - Error types
//! - `handlers` - HTTP and WebSocket handlers
//! - `middleware` - Identity and metrics middleware
//! - `models` - Domain, request and response types
//! - `observability` - Prometheus metrics
//! - `repositories` - SQLite access layer and the `Storage` seam
//! - `routes` - Router and application state
//! - `services` - Access guard, broker, sessions, provisioning, notifications

pub mod config;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;

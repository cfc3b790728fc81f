//! Observability for Enclave.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;

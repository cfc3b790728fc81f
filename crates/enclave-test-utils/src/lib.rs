//! # Enclave Test Utilities
//!
//! Shared test utilities for the Enclave service.
//!
//! This crate provides:
//! - Server test harness (`TestEnclaveServer` for E2E tests)
//! - Database fixtures (`test_pool`, `create_user`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use enclave_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let pool = test_pool().await?;
//!     let alice = create_user(&pool, "alice").await?;
//!     let server = TestEnclaveServer::spawn(pool).await?;
//!
//!     let response = server
//!         .client()
//!         .get(server.endpoint("/v1/rooms"))
//!         .header("X-User-ID", alice.to_string())
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

pub use fixtures::*;
pub use server_harness::*;

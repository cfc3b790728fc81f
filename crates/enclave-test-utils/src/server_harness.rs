//! Test server harness for E2E testing
//!
//! Provides `TestEnclaveServer` for spawning real Enclave server instances in
//! tests.

use common::UserId;
use enclave_service::config::Config;
use enclave_service::observability::metrics::detached_metrics_handle;
use enclave_service::routes::{self, AppState};
use enclave_service::services::NotificationBroker;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Test harness for spawning the Enclave server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<()> {
///     let server = TestEnclaveServer::spawn(test_pool().await?).await?;
///
///     let response = reqwest::get(server.endpoint("/health")).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestEnclaveServer {
    addr: SocketAddr,
    pool: SqlitePool,
    state: Arc<AppState>,
    client: reqwest::Client,
    _handle: JoinHandle<()>,
}

impl TestEnclaveServer {
    /// Spawn a server on `127.0.0.1:0` over `pool`.
    pub async fn spawn(pool: SqlitePool) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            ("DATABASE_URL".to_string(), "sqlite::memory:".to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "ENCLAVE_INSTANCE_ID".to_string(),
                "enclave-test".to_string(),
            ),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(AppState::new(pool.clone(), config));

        // The global recorder can only be installed once per process.
        let metrics_handle = detached_metrics_handle()
            .map_err(|e| anyhow::anyhow!("Failed to build metrics handle: {}", e))?;

        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            state,
            client: reqwest::Client::new(),
            _handle: handle,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for `path`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// WebSocket URL for `path`.
    pub fn ws_endpoint(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn broker(&self) -> &Arc<NotificationBroker> {
        &self.state.broker
    }

    /// Wait until `user_id` has `count` live sinks.
    ///
    /// WebSocket sessions subscribe after the upgrade response, so tests that
    /// publish right after connecting wait here first.
    pub async fn wait_for_sinks(&self, user_id: UserId, count: usize) -> Result<(), anyhow::Error> {
        for _ in 0..200 {
            if self.broker().sink_count(user_id) == count {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Err(anyhow::anyhow!(
            "user {} never reached {} sinks (has {})",
            user_id,
            count,
            self.broker().sink_count(user_id)
        ))
    }
}

impl Drop for TestEnclaveServer {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
        self._handle.abort();
    }
}

//! HTTP routes for Enclave.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, identify_caller};
use crate::repositories::{SqliteStorage, Storage};
use crate::services::{AccessGuard, NotificationBroker, NotificationService, RoomProvisioner};
use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: SqlitePool,

    /// Service configuration.
    pub config: Config,

    /// Storage used by the guard, provisioner and notification service.
    pub storage: Arc<dyn Storage>,

    pub guard: AccessGuard,

    /// Live notification fan-out. One per process.
    pub broker: Arc<NotificationBroker>,

    pub provisioner: RoomProvisioner,

    pub notifications: NotificationService,

    /// Parent of every subscription session token. Cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the services over a SQLite pool with a fresh broker.
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(pool.clone()));
        Self::with_storage(pool, config, storage, Arc::new(NotificationBroker::new()))
    }

    /// Wire the services over an explicit storage and broker.
    pub fn with_storage(
        pool: SqlitePool,
        config: Config,
        storage: Arc<dyn Storage>,
        broker: Arc<NotificationBroker>,
    ) -> Self {
        let guard = AccessGuard::new(Arc::clone(&storage));
        let provisioner = RoomProvisioner::new(Arc::clone(&storage));
        let notifications =
            NotificationService::new(Arc::clone(&storage), guard.clone(), Arc::clone(&broker));

        Self {
            pool,
            config,
            storage,
            guard,
            broker,
            provisioner,
            notifications,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - DB ping and instance id - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/v1/rooms/...`, `/v1/messages/...` - Rooms, members and messages
/// - `/v1/media/...` - Media records attached to messages
/// - `/v1/notifications/...` - Notifications and the WebSocket subscription
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - Request timeout from configuration
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_seconds);

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Every /v1 route gets a RequestContext; handlers decide whether an
    // identity is required.
    let api_routes = Router::new()
        .route(
            "/v1/rooms",
            get(handlers::list_rooms).post(handlers::create_room),
        )
        .route(
            "/v1/rooms/:room_id",
            get(handlers::get_room)
                .patch(handlers::update_room)
                .delete(handlers::delete_room),
        )
        .route(
            "/v1/rooms/:room_id/members",
            get(handlers::list_members).post(handlers::add_members),
        )
        .route(
            "/v1/rooms/:room_id/members/:user_id",
            patch(handlers::update_member).delete(handlers::remove_member),
        )
        .route(
            "/v1/rooms/:room_id/messages",
            get(handlers::list_messages).post(handlers::create_message),
        )
        .route(
            "/v1/messages/:message_id",
            patch(handlers::update_message).delete(handlers::delete_message),
        )
        .route(
            "/v1/messages/:message_id/media",
            get(handlers::list_message_media),
        )
        .route("/v1/media", post(handlers::create_media))
        .route("/v1/media/:media_id", delete(handlers::delete_media))
        .route(
            "/v1/notifications",
            get(handlers::list_notifications).post(handlers::create_notification),
        )
        .route(
            "/v1/notifications/subscribe",
            get(handlers::subscribe_notifications),
        )
        .route(
            "/v1/notifications/:id",
            get(handlers::get_notification)
                .patch(handlers::update_notification)
                .delete(handlers::delete_notification),
        )
        .route_layer(middleware::from_fn(identify_caller))
        .with_state(state);

    // Outermost last: metrics see timeouts, the trace span wraps the handler.
    public_routes
        .merge(metrics_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(http_metrics_middleware))
}

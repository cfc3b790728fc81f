//! Notification handlers.
//!
//! - `GET /v1/notifications?unread_only=` - Caller's notifications, newest first
//! - `GET /v1/notifications/:id` - One notification (recipient)
//! - `POST /v1/notifications` - Create and publish
//! - `PATCH /v1/notifications/:id` - Update and publish (recipient)
//! - `DELETE /v1/notifications/:id` - Delete (recipient)
//!
//! Another user's notification answers 404 so ids cannot be probed.

use crate::context::RequestContext;
use crate::errors::EnclaveError;
use crate::handlers::parse_json;
use crate::models::{
    CreateNotificationRequest, DeletedResponse, ListNotificationsQuery, Notification,
    NotificationUpdate,
};
use crate::repositories::NotificationsRepository;
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use common::NotificationId;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /v1/notifications
#[instrument(skip_all, name = "enclave.notifications.list")]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<Vec<Notification>>, EnclaveError> {
    let user_id = ctx.user_id()?;
    let notifications =
        NotificationsRepository::list_for_recipient(&state.pool, user_id, query.unread_only)
            .await?;
    Ok(Json(notifications))
}

/// Handler for GET /v1/notifications/:id
#[instrument(skip_all, name = "enclave.notifications.get", fields(notification_id = %id))]
pub async fn get_notification(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<NotificationId>,
) -> Result<Json<Notification>, EnclaveError> {
    let user_id = ctx.user_id()?;
    NotificationsRepository::find_for_recipient(&state.pool, id, user_id)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

/// Handler for POST /v1/notifications
///
/// # Response
///
/// - 201 Created: Persisted and pushed to the recipient's live subscriptions
/// - 400 Bad Request: Invalid body, or `message_id` outside `room_id`
/// - 403 Forbidden: Caller may not notify this recipient
#[instrument(skip_all, name = "enclave.notifications.create_handler")]
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<Notification>), EnclaveError> {
    let user_id = ctx.user_id()?;
    let request: CreateNotificationRequest = parse_json(&body, "create_notification")?;

    let notification = state.notifications.create(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// Handler for PATCH /v1/notifications/:id
#[instrument(skip_all, name = "enclave.notifications.update_handler", fields(notification_id = %id))]
pub async fn update_notification(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<NotificationId>,
    body: Bytes,
) -> Result<Json<Notification>, EnclaveError> {
    let user_id = ctx.user_id()?;
    let update: NotificationUpdate = parse_json(&body, "update_notification")?;

    let notification = state.notifications.update(user_id, id, update).await?;
    Ok(Json(notification))
}

/// Handler for DELETE /v1/notifications/:id
#[instrument(skip_all, name = "enclave.notifications.delete", fields(notification_id = %id))]
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<NotificationId>,
) -> Result<Json<DeletedResponse>, EnclaveError> {
    let user_id = ctx.user_id()?;
    if !NotificationsRepository::delete(&state.pool, id, user_id).await? {
        return Err(not_found());
    }
    Ok(Json(DeletedResponse { deleted: true }))
}

fn not_found() -> EnclaveError {
    EnclaveError::NotFound("Notification not found".to_string())
}

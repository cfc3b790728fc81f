//! Room access guard.
//!
//! Every membership-gated operation resolves the caller's membership here.
//! A missing membership is always `Forbidden`, never `NotFound`, so callers
//! cannot probe which rooms exist. Storage failures propagate unchanged and
//! are never turned into a denial.

use crate::errors::EnclaveError;
use crate::models::{Membership, Role};
use crate::observability::metrics::record_authorization_denied;
use crate::repositories::Storage;
use common::{RoomId, UserId};
use std::sync::Arc;
use tracing::instrument;

/// Authorization level being checked, used for denial logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Member,
    Poster,
    AuthorOrAdmin,
    Admin,
    Owner,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Member => "member",
            AccessLevel::Poster => "poster",
            AccessLevel::AuthorOrAdmin => "author_or_admin",
            AccessLevel::Admin => "admin",
            AccessLevel::Owner => "owner",
        }
    }
}

/// Owner and admin are interchangeable for admin-or-above checks.
fn is_admin_or_above(role: Role) -> bool {
    matches!(role, Role::Owner | Role::Admin)
}

/// Role-based access guard over room memberships.
#[derive(Clone)]
pub struct AccessGuard {
    storage: Arc<dyn Storage>,
}

impl AccessGuard {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Require any membership in the room.
    #[instrument(skip_all, name = "enclave.guard.member", fields(room_id = %room_id, user_id = %user_id))]
    pub async fn require_member(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Membership, EnclaveError> {
        self.resolve(room_id, user_id, AccessLevel::Member).await
    }

    /// Require membership with posting rights.
    #[instrument(skip_all, name = "enclave.guard.poster", fields(room_id = %room_id, user_id = %user_id))]
    pub async fn require_poster(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Membership, EnclaveError> {
        let membership = self.resolve(room_id, user_id, AccessLevel::Poster).await?;
        if !membership.can_post {
            return Err(deny(room_id, user_id, AccessLevel::Poster));
        }
        Ok(membership)
    }

    /// Require an owner or admin membership.
    #[instrument(skip_all, name = "enclave.guard.admin", fields(room_id = %room_id, user_id = %user_id))]
    pub async fn require_admin(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Membership, EnclaveError> {
        let membership = self.resolve(room_id, user_id, AccessLevel::Admin).await?;
        if !is_admin_or_above(membership.role) {
            return Err(deny(room_id, user_id, AccessLevel::Admin));
        }
        Ok(membership)
    }

    /// Require the owner membership.
    #[instrument(skip_all, name = "enclave.guard.owner", fields(room_id = %room_id, user_id = %user_id))]
    pub async fn require_owner(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Membership, EnclaveError> {
        let membership = self.resolve(room_id, user_id, AccessLevel::Owner).await?;
        if membership.role != Role::Owner {
            return Err(deny(room_id, user_id, AccessLevel::Owner));
        }
        Ok(membership)
    }

    /// Require membership and either authorship of the target or admin-or-above.
    #[instrument(
        skip_all,
        name = "enclave.guard.author_or_admin",
        fields(room_id = %room_id, user_id = %user_id, author_id = %author_id)
    )]
    pub async fn require_author_or_admin(
        &self,
        room_id: RoomId,
        user_id: UserId,
        author_id: UserId,
    ) -> Result<Membership, EnclaveError> {
        let membership = self
            .resolve(room_id, user_id, AccessLevel::AuthorOrAdmin)
            .await?;
        if user_id != author_id && !is_admin_or_above(membership.role) {
            return Err(deny(room_id, user_id, AccessLevel::AuthorOrAdmin));
        }
        Ok(membership)
    }

    async fn resolve(
        &self,
        room_id: RoomId,
        user_id: UserId,
        level: AccessLevel,
    ) -> Result<Membership, EnclaveError> {
        self.storage
            .find_membership(room_id, user_id)
            .await?
            .ok_or_else(|| deny(room_id, user_id, level))
    }
}

fn deny(room_id: RoomId, user_id: UserId, level: AccessLevel) -> EnclaveError {
    tracing::debug!(
        target: "enclave.guard",
        room_id = %room_id,
        user_id = %user_id,
        level = level.as_str(),
        "Room access denied"
    );
    record_authorization_denied(level.as_str());
    EnclaveError::Forbidden
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::mock::MockStorage;

    const ROOM: RoomId = RoomId(10);
    const OWNER: UserId = UserId(1);
    const ADMIN: UserId = UserId(2);
    const MEMBER: UserId = UserId(3);
    const STRANGER: UserId = UserId(4);

    fn seeded() -> MockStorage {
        MockStorage::new()
            .with_membership(ROOM, OWNER, Role::Owner)
            .with_membership(ROOM, ADMIN, Role::Admin)
            .with_membership(ROOM, MEMBER, Role::Member)
    }

    fn guard(storage: MockStorage) -> AccessGuard {
        AccessGuard::new(Arc::new(storage))
    }

    #[tokio::test]
    async fn test_require_member_returns_membership() {
        let guard = guard(seeded());

        let membership = guard.require_member(ROOM, MEMBER).await.unwrap();
        assert_eq!(membership.user_id, MEMBER);
        assert_eq!(membership.role, Role::Member);
    }

    #[tokio::test]
    async fn test_non_member_is_forbidden_at_every_level() {
        let guard = guard(seeded());

        assert!(matches!(
            guard.require_member(ROOM, STRANGER).await,
            Err(EnclaveError::Forbidden)
        ));
        assert!(matches!(
            guard.require_admin(ROOM, STRANGER).await,
            Err(EnclaveError::Forbidden)
        ));
        assert!(matches!(
            guard.require_owner(ROOM, STRANGER).await,
            Err(EnclaveError::Forbidden)
        ));
        assert!(matches!(
            guard.require_author_or_admin(ROOM, STRANGER, STRANGER).await,
            Err(EnclaveError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_unknown_room_is_forbidden_not_found() {
        let guard = guard(seeded());

        let result = guard.require_member(RoomId(999), OWNER).await;
        assert!(matches!(result, Err(EnclaveError::Forbidden)));
    }

    #[tokio::test]
    async fn test_require_admin_accepts_owner_and_admin_only() {
        let guard = guard(seeded());

        assert_eq!(guard.require_admin(ROOM, OWNER).await.unwrap().role, Role::Owner);
        assert_eq!(guard.require_admin(ROOM, ADMIN).await.unwrap().role, Role::Admin);
        assert!(matches!(
            guard.require_admin(ROOM, MEMBER).await,
            Err(EnclaveError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_require_owner_rejects_admin() {
        let guard = guard(seeded());

        assert!(guard.require_owner(ROOM, OWNER).await.is_ok());
        assert!(matches!(
            guard.require_owner(ROOM, ADMIN).await,
            Err(EnclaveError::Forbidden)
        ));
        assert!(matches!(
            guard.require_owner(ROOM, MEMBER).await,
            Err(EnclaveError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_require_author_or_admin() {
        let guard = guard(seeded());

        // Author acting on their own message
        assert!(guard.require_author_or_admin(ROOM, MEMBER, MEMBER).await.is_ok());
        // Admin acting on someone else's message
        assert!(guard.require_author_or_admin(ROOM, ADMIN, MEMBER).await.is_ok());
        // Plain member acting on someone else's message
        assert!(matches!(
            guard.require_author_or_admin(ROOM, MEMBER, ADMIN).await,
            Err(EnclaveError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_require_poster_checks_can_post() {
        let storage = seeded().with_muted_membership(ROOM, UserId(5), Role::Member);
        let guard = guard(storage);

        assert!(guard.require_poster(ROOM, MEMBER).await.is_ok());
        assert!(matches!(
            guard.require_poster(ROOM, UserId(5)).await,
            Err(EnclaveError::Forbidden)
        ));
        // Muted users are still members
        assert!(guard.require_member(ROOM, UserId(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_forbidden() {
        let guard = guard(seeded().with_failing_lookups());

        let result = guard.require_member(ROOM, OWNER).await;
        assert!(matches!(result, Err(EnclaveError::Database(_))));
    }

    #[tokio::test]
    async fn test_guard_performs_single_lookup() {
        let storage = seeded();
        let guard = AccessGuard::new(Arc::new(storage.clone()));

        guard.require_admin(ROOM, ADMIN).await.unwrap();
        assert_eq!(storage.lookup_count(), 1);
    }
}

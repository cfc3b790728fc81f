//! In-memory [`Storage`] for unit tests.
//!
//! Transaction writes are buffered and only applied on commit, so tests can
//! observe that a failed provisioning leaves nothing behind. Faults can be
//! injected per operation.

use super::{Storage, StorageTransaction};
use crate::errors::EnclaveError;
use crate::models::{
    Membership, NewMembership, NewNotification, NewRoom, Notification, NotificationUpdate, Role,
    Room,
};
use async_trait::async_trait;
use chrono::Utc;
use common::{MessageId, NotificationId, RoomId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MockState {
    rooms: Vec<Room>,
    memberships: Vec<Membership>,
    notifications: Vec<Notification>,
    message_rooms: HashMap<MessageId, RoomId>,
    next_id: i64,
}

impl MockState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default, Clone)]
struct Faults {
    membership_insert_for: Option<UserId>,
    lookups: bool,
    begin: bool,
    commit: bool,
    rollback: bool,
}

#[derive(Default)]
struct Counters {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    lookups: AtomicUsize,
}

/// Mock storage for unit testing.
#[derive(Clone, Default)]
pub struct MockStorage {
    state: Arc<Mutex<MockState>>,
    faults: Faults,
    counters: Arc<Counters>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn injected(operation: &str) -> EnclaveError {
    EnclaveError::Database(format!("injected failure: {operation}"))
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a committed membership.
    pub fn with_membership(self, room_id: RoomId, user_id: UserId, role: Role) -> Self {
        {
            let mut state = lock(&self.state);
            let id = state.allocate_id();
            let now = Utc::now();
            state.memberships.push(Membership {
                id,
                room_id,
                user_id,
                role,
                can_post: true,
                can_call: true,
                joined_at: now,
                updated_at: now,
            });
        }
        self
    }

    /// Seed a committed membership that cannot post.
    pub fn with_muted_membership(
        self,
        room_id: RoomId,
        user_id: UserId,
        role: Role,
    ) -> Self {
        let storage = self.with_membership(room_id, user_id, role);
        {
            let mut state = lock(&storage.state);
            if let Some(membership) = state
                .memberships
                .iter_mut()
                .find(|m| m.room_id == room_id && m.user_id == user_id)
            {
                membership.can_post = false;
            }
        }
        storage
    }

    /// Seed a message living in `room_id`.
    pub fn with_message(self, message_id: MessageId, room_id: RoomId) -> Self {
        lock(&self.state).message_rooms.insert(message_id, room_id);
        self
    }

    /// Fail any membership insert for `user_id`.
    pub fn with_failing_membership_insert(mut self, user_id: UserId) -> Self {
        self.faults.membership_insert_for = Some(user_id);
        self
    }

    /// Fail every read.
    pub fn with_failing_lookups(mut self) -> Self {
        self.faults.lookups = true;
        self
    }

    pub fn with_failing_begin(mut self) -> Self {
        self.faults.begin = true;
        self
    }

    pub fn with_failing_commit(mut self) -> Self {
        self.faults.commit = true;
        self
    }

    pub fn with_failing_rollback(mut self) -> Self {
        self.faults.rollback = true;
        self
    }

    /// Committed rooms.
    pub fn rooms(&self) -> Vec<Room> {
        lock(&self.state).rooms.clone()
    }

    /// Committed memberships of a room, in insert order.
    pub fn memberships_for(&self, room_id: RoomId) -> Vec<Membership> {
        lock(&self.state)
            .memberships
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect()
    }

    /// Committed notifications, in insert order.
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.state).notifications.clone()
    }

    pub fn begin_count(&self) -> usize {
        self.counters.begins.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }

    pub fn lookup_count(&self) -> usize {
        self.counters.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn find_membership(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Membership>, EnclaveError> {
        self.counters.lookups.fetch_add(1, Ordering::SeqCst);
        if self.faults.lookups {
            return Err(injected("find_membership"));
        }
        Ok(lock(&self.state)
            .memberships
            .iter()
            .find(|m| m.room_id == room_id && m.user_id == user_id)
            .cloned())
    }

    async fn begin(&self) -> Result<Box<dyn StorageTransaction>, EnclaveError> {
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        if self.faults.begin {
            return Err(injected("begin"));
        }
        Ok(Box::new(MockTransaction {
            state: Arc::clone(&self.state),
            faults: self.faults.clone(),
            counters: Arc::clone(&self.counters),
            rooms: Vec::new(),
            memberships: Vec::new(),
        }))
    }

    async fn insert_notification(
        &self,
        new: NewNotification,
    ) -> Result<Notification, EnclaveError> {
        let mut state = lock(&self.state);
        let now = Utc::now();
        let notification = Notification {
            id: NotificationId(state.allocate_id()),
            recipient_id: new.recipient_id,
            room_id: new.room_id,
            message_id: new.message_id,
            kind: new.kind,
            cipher_text: new.cipher_text,
            encryption_scheme: new.encryption_scheme,
            read: false,
            created_at: now,
            updated_at: now,
        };
        state.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn update_notification(
        &self,
        id: NotificationId,
        recipient_id: UserId,
        update: NotificationUpdate,
    ) -> Result<Option<Notification>, EnclaveError> {
        if self.faults.lookups {
            return Err(injected("update_notification"));
        }
        let mut state = lock(&self.state);
        let Some(existing) = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
        else {
            return Ok(None);
        };
        if let Some(kind) = update.kind {
            existing.kind = kind;
        }
        if let Some(cipher_text) = update.cipher_text {
            existing.cipher_text = cipher_text;
        }
        if let Some(scheme) = update.encryption_scheme {
            existing.encryption_scheme = scheme;
        }
        if let Some(read) = update.read {
            existing.read = read;
        }
        existing.updated_at = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn find_message_room(
        &self,
        message_id: MessageId,
    ) -> Result<Option<RoomId>, EnclaveError> {
        self.counters.lookups.fetch_add(1, Ordering::SeqCst);
        if self.faults.lookups {
            return Err(injected("find_message_room"));
        }
        Ok(lock(&self.state).message_rooms.get(&message_id).copied())
    }
}

/// Buffered transaction over [`MockStorage`].
struct MockTransaction {
    state: Arc<Mutex<MockState>>,
    faults: Faults,
    counters: Arc<Counters>,
    rooms: Vec<Room>,
    memberships: Vec<Membership>,
}

#[async_trait]
impl StorageTransaction for MockTransaction {
    async fn insert_room(&mut self, new: &NewRoom) -> Result<Room, EnclaveError> {
        let id = lock(&self.state).allocate_id();
        let now = Utc::now();
        let room = Room {
            id: RoomId(id),
            name: new.name.clone(),
            description: new.description.clone(),
            is_private: new.is_private,
            is_direct: new.is_direct,
            owner_id: new.owner_id,
            created_at: now,
            updated_at: now,
        };
        self.rooms.push(room.clone());
        Ok(room)
    }

    async fn insert_membership(
        &mut self,
        new: &NewMembership,
    ) -> Result<Membership, EnclaveError> {
        if self.faults.membership_insert_for == Some(new.user_id) {
            return Err(injected("insert_membership"));
        }
        let mut state = lock(&self.state);
        let duplicate = state
            .memberships
            .iter()
            .chain(self.memberships.iter())
            .any(|m| m.room_id == new.room_id && m.user_id == new.user_id);
        if duplicate {
            return Err(EnclaveError::Conflict("Resource already exists".to_string()));
        }
        let now = Utc::now();
        let membership = Membership {
            id: state.allocate_id(),
            room_id: new.room_id,
            user_id: new.user_id,
            role: new.role,
            can_post: new.can_post,
            can_call: new.can_call,
            joined_at: now,
            updated_at: now,
        };
        self.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn commit(self: Box<Self>) -> Result<(), EnclaveError> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        if self.faults.commit {
            return Err(injected("commit"));
        }
        let this = *self;
        let mut state = lock(&this.state);
        state.rooms.extend(this.rooms);
        state.memberships.extend(this.memberships);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), EnclaveError> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.faults.rollback {
            return Err(injected("rollback"));
        }
        Ok(())
    }
}

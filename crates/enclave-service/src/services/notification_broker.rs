//! Real-time notification fan-out.
//!
//! The broker maps each recipient to the set of live sinks opened for them.
//! Every sink is a single-slot channel: `publish` performs a non-blocking
//! `try_send` into each of the recipient's sinks and drops the item for any
//! sink that is still holding an undelivered one. A slow consumer therefore
//! never delays the publisher or other consumers. Persisted notifications
//! remain the source of truth; clients reconcile missed pushes by listing.
//!
//! # Locking
//!
//! `subscribe` and `unsubscribe` take the write lock. `publish` takes only the
//! read lock, so concurrent publishers proceed in parallel. No await happens
//! while a lock is held.

use crate::models::Notification;
use crate::observability::metrics::{
    record_notification_delivery, record_notification_published, set_active_subscriptions,
};
use common::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Capacity of each subscriber sink.
pub const SINK_CAPACITY: usize = 1;

/// Result of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Sinks that accepted the notification.
    pub delivered: usize,
    /// Sinks that were full or already closed.
    pub dropped: usize,
}

/// Lifetime counters, mainly for tests and debugging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub subscribes: u64,
    pub unsubscribes: u64,
}

struct Sink {
    sender: mpsc::Sender<Arc<Notification>>,
    dropped: Arc<AtomicU64>,
}

type Registry = HashMap<UserId, HashMap<u64, Sink>>;

/// Multicast registry of live notification sinks keyed by recipient.
pub struct NotificationBroker {
    registry: RwLock<Registry>,
    next_sink_id: AtomicU64,
    subscribes: AtomicU64,
    unsubscribes: AtomicU64,
}

impl Default for NotificationBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBroker {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            next_sink_id: AtomicU64::new(1),
            subscribes: AtomicU64::new(0),
            unsubscribes: AtomicU64::new(0),
        }
    }

    /// Register a new sink for `recipient`.
    ///
    /// A recipient may hold any number of concurrent subscriptions; each gets
    /// its own copy of every notification published for them.
    pub fn subscribe(self: &Arc<Self>, recipient: UserId) -> Subscription {
        let (sender, receiver) = mpsc::channel(SINK_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        let sink_id = self.next_sink_id.fetch_add(1, Ordering::Relaxed);

        let total = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            registry.entry(recipient).or_default().insert(
                sink_id,
                Sink {
                    sender,
                    dropped: Arc::clone(&dropped),
                },
            );
            registry.values().map(HashMap::len).sum::<usize>()
        };
        self.subscribes.fetch_add(1, Ordering::Relaxed);
        set_active_subscriptions(total);

        tracing::debug!(
            target: "enclave.broker",
            recipient_id = %recipient,
            sink_id,
            "Subscriber registered"
        );

        Subscription {
            broker: Arc::clone(self),
            recipient,
            sink_id,
            receiver,
            dropped,
            active: AtomicBool::new(true),
        }
    }

    /// Offer `notification` to every live sink of its recipient.
    ///
    /// Never blocks. A sink that is full drops this item only for itself.
    pub fn publish(&self, notification: Notification) -> PublishOutcome {
        let recipient = notification.recipient_id;
        let notification = Arc::new(notification);
        let mut outcome = PublishOutcome::default();

        {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sinks) = registry.get(&recipient) {
                for sink in sinks.values() {
                    match sink.sender.try_send(Arc::clone(&notification)) {
                        Ok(()) => outcome.delivered += 1,
                        Err(TrySendError::Full(_)) => {
                            sink.dropped.fetch_add(1, Ordering::Relaxed);
                            outcome.dropped += 1;
                        }
                        Err(TrySendError::Closed(_)) => outcome.dropped += 1,
                    }
                }
            }
        }

        record_notification_published();
        record_notification_delivery("delivered", outcome.delivered);
        record_notification_delivery("dropped", outcome.dropped);

        tracing::debug!(
            target: "enclave.broker",
            recipient_id = %recipient,
            notification_id = %notification.id,
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "Notification published"
        );

        outcome
    }

    /// Number of live sinks registered for `recipient`.
    pub fn sink_count(&self, recipient: UserId) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&recipient)
            .map_or(0, HashMap::len)
    }

    /// Number of recipients with at least one live sink.
    pub fn recipient_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            subscribes: self.subscribes.load(Ordering::Relaxed),
            unsubscribes: self.unsubscribes.load(Ordering::Relaxed),
        }
    }

    /// Remove every sink of `recipient`, closing them.
    ///
    /// Each open `Subscription` sees `recv` return `None` once its buffered
    /// item, if any, has been taken. Their later `unsubscribe` is a no-op.
    /// Returns the number of sinks closed.
    pub fn close_recipient(&self, recipient: UserId) -> usize {
        let (closed, total) = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            let closed = registry.remove(&recipient).map_or(0, |sinks| sinks.len());
            (closed, registry.values().map(HashMap::len).sum::<usize>())
        };

        if closed > 0 {
            self.unsubscribes.fetch_add(closed as u64, Ordering::Relaxed);
            set_active_subscriptions(total);
            tracing::debug!(
                target: "enclave.broker",
                recipient_id = %recipient,
                closed,
                "Recipient sinks closed"
            );
        }
        closed
    }

    /// Remove one sink. Dropping its sender closes the channel.
    fn remove(&self, recipient: UserId, sink_id: u64) -> bool {
        let (removed, total) = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            let removed = match registry.get_mut(&recipient) {
                Some(sinks) => {
                    let removed = sinks.remove(&sink_id).is_some();
                    if sinks.is_empty() {
                        registry.remove(&recipient);
                    }
                    removed
                }
                None => false,
            };
            (removed, registry.values().map(HashMap::len).sum::<usize>())
        };

        if removed {
            self.unsubscribes.fetch_add(1, Ordering::Relaxed);
            set_active_subscriptions(total);
            tracing::debug!(
                target: "enclave.broker",
                recipient_id = %recipient,
                sink_id,
                "Subscriber removed"
            );
        }
        removed
    }
}

/// One live sink. Dropping it unsubscribes.
pub struct Subscription {
    broker: Arc<NotificationBroker>,
    recipient: UserId,
    sink_id: u64,
    receiver: mpsc::Receiver<Arc<Notification>>,
    dropped: Arc<AtomicU64>,
    active: AtomicBool,
}

impl Subscription {
    pub fn recipient(&self) -> UserId {
        self.recipient
    }

    pub fn sink_id(&self) -> u64 {
        self.sink_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Notifications this sink missed because it was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Next notification, or `None` once unsubscribed.
    ///
    /// Cancel-safe: losing a `select!` race never loses an item.
    pub async fn recv(&mut self) -> Option<Arc<Notification>> {
        if !self.is_active() {
            return None;
        }
        self.receiver.recv().await
    }

    /// Remove this sink from the broker. Only the first call has an effect.
    ///
    /// Returns `true` if this call performed the removal.
    pub fn unsubscribe(&mut self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.receiver.close();
        self.broker.remove(self.recipient, self.sink_id)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("recipient", &self.recipient)
            .field("sink_id", &self.sink_id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::NotificationId;
    use std::collections::HashSet;
    use std::time::Duration;

    fn notification(id: i64, recipient: UserId) -> Notification {
        let now = Utc::now();
        Notification {
            id: NotificationId(id),
            recipient_id: recipient,
            room_id: None,
            message_id: None,
            kind: "test".to_string(),
            cipher_text: "opaque".to_string(),
            encryption_scheme: "signal".to_string(),
            read: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_only_the_recipient() {
        let broker = Arc::new(NotificationBroker::new());
        let mut alice = broker.subscribe(UserId(1));
        let mut bob = broker.subscribe(UserId(2));

        let outcome = broker.publish(notification(10, UserId(1)));
        assert_eq!(outcome, PublishOutcome { delivered: 1, dropped: 0 });

        let received = alice.recv().await.unwrap();
        assert_eq!(received.id, NotificationId(10));

        let nothing = tokio::time::timeout(Duration::from_millis(20), bob.recv()).await;
        assert!(nothing.is_err(), "bob must not receive alice's notification");
    }

    #[tokio::test]
    async fn test_every_sink_of_a_recipient_gets_a_copy() {
        let broker = Arc::new(NotificationBroker::new());
        let mut first = broker.subscribe(UserId(1));
        let mut second = broker.subscribe(UserId(1));
        assert_eq!(broker.sink_count(UserId(1)), 2);

        let outcome = broker.publish(notification(5, UserId(1)));
        assert_eq!(outcome.delivered, 2);

        assert_eq!(first.recv().await.unwrap().id, NotificationId(5));
        assert_eq!(second.recv().await.unwrap().id, NotificationId(5));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_a_no_op() {
        let broker = Arc::new(NotificationBroker::new());
        let outcome = broker.publish(notification(1, UserId(7)));
        assert_eq!(outcome, PublishOutcome::default());
        assert_eq!(broker.recipient_count(), 0);
    }

    #[tokio::test]
    async fn test_full_sink_drops_without_blocking() {
        let broker = Arc::new(NotificationBroker::new());
        let mut subscription = broker.subscribe(UserId(1));

        assert_eq!(broker.publish(notification(1, UserId(1))).delivered, 1);
        let second = broker.publish(notification(2, UserId(1)));
        assert_eq!(second, PublishOutcome { delivered: 0, dropped: 1 });
        assert_eq!(subscription.dropped(), 1);

        // The buffered item is the first one; the second was dropped.
        assert_eq!(subscription.recv().await.unwrap().id, NotificationId(1));

        // Draining frees the slot again.
        assert_eq!(broker.publish(notification(3, UserId(1))).delivered, 1);
        assert_eq!(subscription.recv().await.unwrap().id, NotificationId(3));
    }

    #[tokio::test]
    async fn test_full_sink_does_not_affect_sibling() {
        let broker = Arc::new(NotificationBroker::new());
        let mut slow = broker.subscribe(UserId(1));
        let mut fast = broker.subscribe(UserId(1));

        broker.publish(notification(1, UserId(1)));
        assert_eq!(fast.recv().await.unwrap().id, NotificationId(1));

        let outcome = broker.publish(notification(2, UserId(1)));
        assert_eq!(outcome, PublishOutcome { delivered: 1, dropped: 1 });
        assert_eq!(fast.recv().await.unwrap().id, NotificationId(2));
        assert_eq!(slow.recv().await.unwrap().id, NotificationId(1));
        assert_eq!(slow.dropped(), 1);
        assert_eq!(fast.dropped(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_removes_empty_key() {
        let broker = Arc::new(NotificationBroker::new());
        let mut subscription = broker.subscribe(UserId(1));
        assert_eq!(broker.recipient_count(), 1);

        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert!(!subscription.is_active());
        assert_eq!(broker.sink_count(UserId(1)), 0);
        assert_eq!(broker.recipient_count(), 0);
        assert_eq!(
            broker.stats(),
            BrokerStats {
                subscribes: 1,
                unsubscribes: 1
            }
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_exactly_one_sink() {
        let broker = Arc::new(NotificationBroker::new());
        let mut first = broker.subscribe(UserId(1));
        let mut second = broker.subscribe(UserId(1));

        first.unsubscribe();
        assert_eq!(broker.sink_count(UserId(1)), 1);

        broker.publish(notification(9, UserId(1)));
        assert_eq!(second.recv().await.unwrap().id, NotificationId(9));
    }

    #[tokio::test]
    async fn test_no_delivery_after_unsubscribe() {
        let broker = Arc::new(NotificationBroker::new());
        let mut subscription = broker.subscribe(UserId(1));

        subscription.unsubscribe();
        let outcome = broker.publish(notification(1, UserId(1)));
        assert_eq!(outcome, PublishOutcome::default());
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_discards_buffered_item() {
        let broker = Arc::new(NotificationBroker::new());
        let mut subscription = broker.subscribe(UserId(1));

        broker.publish(notification(1, UserId(1)));
        subscription.unsubscribe();
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let broker = Arc::new(NotificationBroker::new());
        {
            let _subscription = broker.subscribe(UserId(3));
            assert_eq!(broker.sink_count(UserId(3)), 1);
        }
        assert_eq!(broker.sink_count(UserId(3)), 0);
        assert_eq!(broker.stats().unsubscribes, 1);
    }

    #[tokio::test]
    async fn test_close_recipient_closes_all_its_sinks() {
        let broker = Arc::new(NotificationBroker::new());
        let mut first = broker.subscribe(UserId(1));
        let mut second = broker.subscribe(UserId(1));
        let mut other = broker.subscribe(UserId(2));

        assert_eq!(broker.close_recipient(UserId(1)), 2);
        assert_eq!(broker.sink_count(UserId(1)), 0);
        assert_eq!(broker.sink_count(UserId(2)), 1);
        assert!(first.recv().await.is_none());
        assert!(second.recv().await.is_none());

        // Late unsubscribes do not count twice.
        assert!(!first.unsubscribe());
        assert!(!second.unsubscribe());
        assert_eq!(broker.stats().unsubscribes, 2);

        broker.publish(notification(4, UserId(2)));
        assert_eq!(other.recv().await.unwrap().id, NotificationId(4));
        assert_eq!(broker.close_recipient(UserId(1)), 0);
    }

    #[tokio::test]
    async fn test_per_sink_order_matches_publish_order() {
        let broker = Arc::new(NotificationBroker::new());
        let mut subscription = broker.subscribe(UserId(1));

        for id in 1..=5 {
            broker.publish(notification(id, UserId(1)));
            assert_eq!(subscription.recv().await.unwrap().id, NotificationId(id));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish_and_churn_has_no_duplicates() {
        let broker = Arc::new(NotificationBroker::new());
        let recipient = UserId(1);

        // A stable consumer that drains as fast as it can.
        let mut stable = broker.subscribe(recipient);
        let consumer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(item) = stable.recv().await {
                seen.push(item.id.get());
                if item.kind == "stop" {
                    break;
                }
            }
            (seen, stable)
        });

        // Subscribers joining and leaving while publishers run.
        let mut churners = Vec::new();
        for _ in 0..8 {
            let broker = Arc::clone(&broker);
            churners.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let mut subscription = broker.subscribe(recipient);
                    tokio::task::yield_now().await;
                    subscription.unsubscribe();
                }
            }));
        }

        let mut publishers = Vec::new();
        for p in 0..4_i64 {
            let broker = Arc::clone(&broker);
            publishers.push(tokio::spawn(async move {
                for i in 0..100_i64 {
                    broker.publish(notification(p * 1000 + i, recipient));
                    tokio::task::yield_now().await;
                }
            }));
        }

        for handle in publishers.into_iter().chain(churners) {
            tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .expect("task deadlocked")
                .unwrap();
        }

        // Retry the stop marker until the single slot frees up.
        let mut stop = notification(-1, recipient);
        stop.kind = "stop".to_string();
        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.publish(stop.clone()).delivered == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("stop marker never delivered");

        let (seen, _stable) = tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .expect("consumer hung")
            .unwrap();
        let unique: HashSet<i64> = seen.iter().copied().collect();
        assert_eq!(unique.len(), seen.len(), "a notification was delivered twice");

        assert_eq!(broker.sink_count(recipient), 1);
        let stats = broker.stats();
        assert_eq!(stats.subscribes, 1 + 8 * 50);
        assert_eq!(stats.unsubscribes, 8 * 50);
    }
}

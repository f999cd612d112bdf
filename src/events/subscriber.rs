//! Per-subscriber bounded queues and the handles that read them.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::sync::Notify;

use super::{BreakerEvent, DeliveryPolicy};
use crate::lifecycle::ShutdownSignal;

/// Global counter for subscriber IDs; only uniqueness matters.
static SUBSCRIBER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque subscriber identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn new() -> Self {
        Self(SUBSCRIBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Registered queues plus whether fan-out has ended. Both change under the
/// same write lock, so no queue can register after teardown and stay open.
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    queues: HashMap<SubscriberId, Arc<SubscriberQueue>>,
    stopped: bool,
}

impl Subscribers {
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&SubscriberId, &Arc<SubscriberQueue>)> {
        self.queues.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.queues.len()
    }

    /// Mark fan-out as finished and close every registered queue.
    pub(crate) fn stop(&mut self) {
        self.stopped = true;
        for queue in self.queues.values() {
            queue.close();
        }
    }
}

pub(crate) type SubscriberSet = RwLock<Subscribers>;

/// Result of offering an event to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    /// Queue was full and an event was lost (the new one or the oldest).
    Lossy,
    Closed,
}

/// Bounded FIFO shared between the fan-out task and one [`Subscription`].
#[derive(Debug)]
pub(crate) struct SubscriberQueue {
    events: Mutex<VecDeque<BreakerEvent>>,
    capacity: usize,
    policy: DeliveryPolicy,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl SubscriberQueue {
    pub(crate) fn new(capacity: usize, policy: DeliveryPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn events(&self) -> MutexGuard<'_, VecDeque<BreakerEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, event: BreakerEvent) -> Delivery {
        if self.closed.load(Ordering::Acquire) {
            return Delivery::Closed;
        }

        let mut delivery = Delivery::Queued;
        {
            let mut events = self.events();
            if events.len() >= self.capacity {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                delivery = Delivery::Lossy;
                match self.policy {
                    DeliveryPolicy::DropNewest => return delivery,
                    DeliveryPolicy::EvictOldest => {
                        events.pop_front();
                    }
                }
            }
            events.push_back(event);
        }

        self.notify.notify_one();
        delivery
    }

    fn pop(&self) -> Option<BreakerEvent> {
        self.events().pop_front()
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn len(&self) -> usize {
        self.events().len()
    }
}

/// Read side of one subscription.
///
/// Dropping the handle unsubscribes it.
pub struct Subscription {
    id: SubscriberId,
    queue: Arc<SubscriberQueue>,
    subscribers: Weak<SubscriberSet>,
    shutdown: ShutdownSignal,
}

impl Subscription {
    pub(crate) fn new(
        queue: Arc<SubscriberQueue>,
        subscribers: &Arc<SubscriberSet>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let id = SubscriberId::new();
        let mut set = subscribers.write().unwrap_or_else(PoisonError::into_inner);
        if set.stopped {
            queue.close();
        } else {
            set.queues.insert(id, Arc::clone(&queue));
        }
        drop(set);

        Self {
            id,
            queue,
            subscribers: Arc::downgrade(subscribers),
            shutdown,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once this subscription's shutdown signal fires or the
    /// emitter's fan-out has stopped and the queue is drained.
    pub async fn recv(&mut self) -> Option<BreakerEvent> {
        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }

            let notified = self.queue.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.queue.pop() {
                return Some(event);
            }
            if self.queue.is_closed() {
                return None;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.shutdown.cancelled() => return None,
            }
        }
    }

    /// Take a queued event without waiting.
    pub fn try_recv(&mut self) -> Option<BreakerEvent> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        self.queue.pop()
    }

    /// Events lost to a full queue so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Events waiting to be read.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn detach(&self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .queues
                .remove(&self.id);
        }
        self.queue.close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pending", &self.queue.len())
            .field("dropped", &self.queue.dropped())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use std::time::Duration;

    fn queue(capacity: usize, policy: DeliveryPolicy) -> SubscriberQueue {
        SubscriberQueue::new(capacity, policy)
    }

    #[test]
    fn test_subscriber_ids_are_unique() {
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert!(a.to_string().starts_with("sub-"));
    }

    #[test]
    fn test_drop_newest_keeps_queued_events() {
        let q = queue(2, DeliveryPolicy::DropNewest);
        assert_eq!(q.push(BreakerEvent::Tripped), Delivery::Queued);
        assert_eq!(q.push(BreakerEvent::Ready), Delivery::Queued);
        assert_eq!(q.push(BreakerEvent::Reset), Delivery::Lossy);

        assert_eq!(q.dropped(), 1);
        assert_eq!(q.pop(), Some(BreakerEvent::Tripped));
        assert_eq!(q.pop(), Some(BreakerEvent::Ready));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_evict_oldest_keeps_newest_events() {
        let q = queue(2, DeliveryPolicy::EvictOldest);
        q.push(BreakerEvent::Tripped);
        q.push(BreakerEvent::Ready);
        assert_eq!(q.push(BreakerEvent::Reset), Delivery::Lossy);

        assert_eq!(q.dropped(), 1);
        assert_eq!(q.pop(), Some(BreakerEvent::Ready));
        assert_eq!(q.pop(), Some(BreakerEvent::Reset));
    }

    #[test]
    fn test_closed_queue_rejects() {
        let q = queue(4, DeliveryPolicy::DropNewest);
        q.close();
        assert_eq!(q.push(BreakerEvent::Failed), Delivery::Closed);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let q = queue(0, DeliveryPolicy::EvictOldest);
        q.push(BreakerEvent::Failed);
        q.push(BreakerEvent::Tripped);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), Some(BreakerEvent::Tripped));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_push() {
        let shutdown = Shutdown::new();
        let set: Arc<SubscriberSet> = Arc::new(RwLock::new(Subscribers::default()));
        let q = Arc::new(queue(4, DeliveryPolicy::DropNewest));
        let mut sub = Subscription::new(Arc::clone(&q), &set, shutdown.subscribe());

        let reader = tokio::spawn(async move { sub.recv().await });
        tokio::task::yield_now().await;
        q.push(BreakerEvent::Failed);

        let got = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(BreakerEvent::Failed));
    }

    #[tokio::test]
    async fn test_recv_ends_on_shutdown() {
        let shutdown = Shutdown::new();
        let set: Arc<SubscriberSet> = Arc::new(RwLock::new(Subscribers::default()));
        let q = Arc::new(queue(4, DeliveryPolicy::DropNewest));
        let mut sub = Subscription::new(q, &set, shutdown.subscribe());

        let reader = tokio::spawn(async move { sub.recv().await });
        shutdown.trigger();

        let got = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_subscribing_after_stop_gets_closed_queue() {
        let shutdown = Shutdown::new();
        let set: Arc<SubscriberSet> = Arc::new(RwLock::new(Subscribers::default()));
        set.write().unwrap().stop();

        let q = Arc::new(queue(4, DeliveryPolicy::DropNewest));
        let mut sub = Subscription::new(Arc::clone(&q), &set, shutdown.subscribe());
        assert_eq!(set.read().unwrap().len(), 0);
        assert_eq!(q.push(BreakerEvent::Tripped), Delivery::Closed);

        let got = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let shutdown = Shutdown::new();
        let set: Arc<SubscriberSet> = Arc::new(RwLock::new(Subscribers::default()));
        let q = Arc::new(queue(4, DeliveryPolicy::DropNewest));
        let sub = Subscription::new(Arc::clone(&q), &set, shutdown.subscribe());
        assert_eq!(set.read().unwrap().len(), 1);

        drop(sub);
        assert_eq!(set.read().unwrap().len(), 0);
        assert_eq!(q.push(BreakerEvent::Reset), Delivery::Closed);
    }
}

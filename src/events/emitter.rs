//! Event-publishing breaker decorator and its fan-out task.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::subscriber::{Delivery, SubscriberQueue, SubscriberSet, Subscribers};
use super::{BreakerEvent, DeliveryPolicy, Subscription};
use crate::breaker::{BreakerState, BreakerStats, CircuitBreaker};
use crate::clock::Clock;
use crate::config::EventConfig;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("event fan-out already started")]
    AlreadyStarted,
}

/// Wraps a breaker and publishes a [`BreakerEvent`] for every
/// state-affecting operation.
///
/// Events published before [`start`](EventEmitter::start) wait in the
/// source queue and are delivered once fan-out begins.
#[derive(Debug)]
pub struct EventEmitter<B> {
    inner: B,
    config: EventConfig,
    source: mpsc::Sender<BreakerEvent>,
    pending: Mutex<Option<mpsc::Receiver<BreakerEvent>>>,
    subscribers: Arc<SubscriberSet>,
}

impl<B: CircuitBreaker> EventEmitter<B> {
    pub fn new(inner: B, config: EventConfig) -> Self {
        let (source, receiver) = mpsc::channel(config.source_capacity.max(1));
        Self {
            inner,
            config,
            source,
            pending: Mutex::new(Some(receiver)),
            subscribers: Arc::new(RwLock::new(Subscribers::default())),
        }
    }

    /// Spawn the fan-out task. It runs until `shutdown` fires or the
    /// emitter is dropped, then closes every subscriber queue.
    pub fn start(&self, shutdown: ShutdownSignal) -> Result<JoinHandle<()>, EmitterError> {
        let receiver = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(EmitterError::AlreadyStarted)?;

        tracing::debug!(
            breaker = self.inner.name(),
            policy = self.config.policy.as_str(),
            "Starting event fan-out"
        );

        Ok(tokio::spawn(fan_out(
            self.inner.name().to_string(),
            receiver,
            Arc::clone(&self.subscribers),
            shutdown,
        )))
    }

    /// Register a subscriber whose stream ends when `shutdown` fires.
    pub fn subscribe(&self, shutdown: ShutdownSignal) -> Subscription {
        let queue = Arc::new(SubscriberQueue::new(self.config.capacity, self.config.policy));
        let subscription = Subscription::new(queue, &self.subscribers, shutdown);
        tracing::debug!(
            breaker = self.inner.name(),
            subscriber = %subscription.id(),
            "Subscriber added"
        );
        subscription
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        tracing::debug!(
            breaker = self.inner.name(),
            subscriber = %subscription.id(),
            "Subscriber removed"
        );
        subscription.detach();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.config.policy
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn publish(&self, event: BreakerEvent) {
        match self.source.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!(breaker = self.inner.name(), %event, "Event source full, event dropped");
                metrics::record_dropped_event("source");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

async fn fan_out(
    name: String,
    mut source: mpsc::Receiver<BreakerEvent>,
    subscribers: Arc<SubscriberSet>,
    mut shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = source.recv() => match event {
                Some(event) => deliver(&name, &subscribers, event),
                None => break,
            },
        }
    }

    let mut subscribers = subscribers.write().unwrap_or_else(PoisonError::into_inner);
    subscribers.stop();
    tracing::debug!(breaker = %name, subscribers = subscribers.len(), "Event fan-out stopped");
}

fn deliver(name: &str, subscribers: &SubscriberSet, event: BreakerEvent) {
    let subscribers = subscribers.read().unwrap_or_else(PoisonError::into_inner);
    for (id, queue) in subscribers.iter() {
        if queue.push(event) == Delivery::Lossy {
            tracing::debug!(breaker = name, subscriber = %id, %event, "Subscriber queue full");
            metrics::record_dropped_event(queue.policy().as_str());
        }
    }
}

impl<B: CircuitBreaker> BreakerStats for EventEmitter<B> {
    fn failures(&self) -> i64 {
        self.inner.failures()
    }

    fn successes(&self) -> i64 {
        self.inner.successes()
    }

    fn consec_failures(&self) -> i64 {
        self.inner.consec_failures()
    }

    fn error_rate(&self) -> f64 {
        self.inner.error_rate()
    }
}

impl<B: CircuitBreaker> CircuitBreaker for EventEmitter<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn clock(&self) -> &dyn Clock {
        self.inner.clock()
    }

    fn default_timeout(&self) -> Duration {
        self.inner.default_timeout()
    }

    fn trip(&self) {
        self.inner.trip();
        self.publish(BreakerEvent::Tripped);
    }

    fn break_circuit(&self) {
        self.inner.break_circuit();
        self.publish(BreakerEvent::Tripped);
    }

    fn reset(&self) {
        self.inner.reset();
        self.publish(BreakerEvent::Reset);
    }

    fn reset_counters(&self) {
        self.inner.reset_counters();
    }

    fn ready(&self) -> (bool, BreakerState) {
        let decision = self.inner.ready();
        if decision == (true, BreakerState::HalfOpen) {
            self.publish(BreakerEvent::Ready);
        }
        decision
    }

    fn state(&self) -> BreakerState {
        self.inner.state()
    }

    fn tripped(&self) -> bool {
        self.inner.tripped()
    }

    fn next_backoff(&self) -> Option<Duration> {
        self.inner.next_backoff()
    }

    fn record_failure(&self, observed: BreakerState) -> bool {
        let opened = self.inner.record_failure(observed);
        self.publish(BreakerEvent::Failed);
        if opened {
            self.publish(BreakerEvent::Tripped);
        }
        opened
    }

    fn record_success(&self, observed: BreakerState) {
        self.inner.record_success(observed);
        if observed == BreakerState::HalfOpen {
            self.publish(BreakerEvent::Reset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::Breaker;
    use crate::clock::MockClock;
    use crate::lifecycle::Shutdown;
    use crate::resilience::tripper;

    fn emitter(clock: &MockClock, config: EventConfig) -> EventEmitter<Breaker> {
        let breaker = Breaker::builder()
            .name("emitter-test")
            .clock(Arc::new(clock.clone()))
            .tripper(tripper::consecutive(2))
            .build();
        EventEmitter::new(breaker, config)
    }

    async fn next(sub: &mut Subscription) -> Option<BreakerEvent> {
        tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("event should arrive")
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let shutdown = Shutdown::new();
        let emitter = emitter(&MockClock::new(), EventConfig::default());
        let _task = emitter.start(shutdown.subscribe()).unwrap();
        assert!(matches!(
            emitter.start(shutdown.subscribe()),
            Err(EmitterError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_failures_publish_failed_then_tripped() {
        let shutdown = Shutdown::new();
        let emitter = emitter(&MockClock::new(), EventConfig::default());
        let mut sub = emitter.subscribe(shutdown.subscribe());
        emitter.start(shutdown.subscribe()).unwrap();

        emitter.record_failure(BreakerState::Closed);
        emitter.record_failure(BreakerState::Closed);

        assert_eq!(next(&mut sub).await, Some(BreakerEvent::Failed));
        assert_eq!(next(&mut sub).await, Some(BreakerEvent::Failed));
        assert_eq!(next(&mut sub).await, Some(BreakerEvent::Tripped));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_probe_cycle_events() {
        let shutdown = Shutdown::new();
        let clock = MockClock::new();
        let emitter = emitter(&clock, EventConfig::default());
        let mut sub = emitter.subscribe(shutdown.subscribe());
        emitter.start(shutdown.subscribe()).unwrap();

        emitter.trip();
        clock.advance(emitter.next_backoff().unwrap() + Duration::from_millis(1));
        let (ready, observed) = emitter.ready();
        assert!(ready);
        emitter.record_success(observed);

        assert_eq!(next(&mut sub).await, Some(BreakerEvent::Tripped));
        assert_eq!(next(&mut sub).await, Some(BreakerEvent::Ready));
        assert_eq!(next(&mut sub).await, Some(BreakerEvent::Reset));
        assert!(!emitter.tripped());
    }

    #[tokio::test]
    async fn test_closed_ready_publishes_nothing() {
        let shutdown = Shutdown::new();
        let emitter = emitter(&MockClock::new(), EventConfig::default());
        let mut sub = emitter.subscribe(shutdown.subscribe());
        emitter.start(shutdown.subscribe()).unwrap();

        assert_eq!(emitter.ready(), (true, BreakerState::Closed));
        emitter.record_success(BreakerState::Closed);
        emitter.reset();

        assert_eq!(next(&mut sub).await, Some(BreakerEvent::Reset));
    }

    #[tokio::test]
    async fn test_unsubscribe_and_drop() {
        let shutdown = Shutdown::new();
        let emitter = emitter(&MockClock::new(), EventConfig::default());
        let a = emitter.subscribe(shutdown.subscribe());
        let b = emitter.subscribe(shutdown.subscribe());
        assert_ne!(a.id(), b.id());
        assert_eq!(emitter.subscriber_count(), 2);

        emitter.unsubscribe(a);
        assert_eq!(emitter.subscriber_count(), 1);
        drop(b);
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_fan_out() {
        let shutdown = Shutdown::new();
        let emitter = emitter(&MockClock::new(), EventConfig::default());
        let mut sub = emitter.subscribe(shutdown.subscribe());
        let task = emitter.start(shutdown.subscribe()).unwrap();

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("fan-out should stop")
            .unwrap();
        assert_eq!(next(&mut sub).await, None);

        // Publishing after shutdown is harmless.
        emitter.trip();
        assert!(emitter.tripped());
    }
}

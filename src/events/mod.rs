//! Event Bus - registration-based publish/subscribe with per-subscriber queues.
//!
//! Each subscriber gets its own FIFO queue and sees every publication made
//! after it subscribed (fan-out, no replay). Topics must be declared before
//! anyone can subscribe or publish; using an undeclared topic is a
//! programming error reported as [`BusError::UnknownTopic`].
//!
//! Queues are unbounded by default. A bounded queue applies back-pressure to
//! publishers only while that particular subscriber is full.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::DerivedValues;
use crate::types::ControlVariable;

/// Published by the input driver whenever a control value changes.
pub const INPUT_VARIABLES_CHANGED: &str = "input variables changed";

/// Published by the derived-value cache after every recompute.
pub const CALCULATED_VARIABLES_CHANGED: &str = "calculated variables changed";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Event '{0}' is not registered")]
    UnknownTopic(String),
}

/// Payload carried on the simulator's bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// A control moved to a new value.
    InputChanged { variable: ControlVariable, value: f64 },
    /// The derived set was recomputed.
    DerivedChanged(Box<DerivedValues>),
}

// ============================================================================
// Queues
// ============================================================================

#[derive(Debug)]
enum SubscriberQueue<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for SubscriberQueue<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

impl<T> SubscriberQueue<T> {
    /// Enqueue, waiting for space on a bounded queue. Err when the receiver is gone.
    async fn send(&self, payload: T) -> Result<(), ()> {
        match self {
            Self::Bounded(tx) => tx.send(payload).await.map_err(|_| ()),
            Self::Unbounded(tx) => tx.send(payload).map_err(|_| ()),
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            Self::Bounded(tx) => tx.is_closed(),
            Self::Unbounded(tx) => tx.is_closed(),
        }
    }
}

#[derive(Debug)]
enum SubscriptionRx<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

/// Receiving end of one subscriber's private queue.
#[derive(Debug)]
pub struct Subscription<T> {
    topic: String,
    rx: SubscriptionRx<T>,
}

impl<T> Subscription<T> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next publication. `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        match &mut self.rx {
            SubscriptionRx::Bounded(rx) => rx.recv().await,
            SubscriptionRx::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Take the next publication if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        match &mut self.rx {
            SubscriptionRx::Bounded(rx) => rx.try_recv().ok(),
            SubscriptionRx::Unbounded(rx) => rx.try_recv().ok(),
        }
    }
}

// ============================================================================
// Bus
// ============================================================================

/// Fan-out publish/subscribe bus. Share it behind an `Arc`.
#[derive(Debug)]
pub struct EventBus<T> {
    topics: Mutex<HashMap<String, Vec<SubscriberQueue<T>>>>,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Vec<SubscriberQueue<T>>>> {
        self.topics.lock().unwrap_or_else(|e| {
            warn!("Event bus mutex poisoned, recovering");
            e.into_inner()
        })
    }

    /// Register a topic. Declaring an existing topic is a no-op.
    pub fn declare(&self, topic: &str) {
        self.topics().entry(topic.to_string()).or_default();
    }

    pub fn is_declared(&self, topic: &str) -> bool {
        self.topics().contains_key(topic)
    }

    /// Attach a new subscriber with an unbounded queue.
    pub fn subscribe(&self, topic: &str) -> Result<Subscription<T>, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.attach(topic, SubscriberQueue::Unbounded(tx))?;
        Ok(Subscription {
            topic: topic.to_string(),
            rx: SubscriptionRx::Unbounded(rx),
        })
    }

    /// Attach a new subscriber whose queue holds at most `capacity` events.
    ///
    /// Publishers wait while this subscriber's queue is full.
    pub fn subscribe_bounded(
        &self,
        topic: &str,
        capacity: usize,
    ) -> Result<Subscription<T>, BusError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.attach(topic, SubscriberQueue::Bounded(tx))?;
        Ok(Subscription {
            topic: topic.to_string(),
            rx: SubscriptionRx::Bounded(rx),
        })
    }

    fn attach(&self, topic: &str, queue: SubscriberQueue<T>) -> Result<(), BusError> {
        let mut topics = self.topics();
        let subscribers = topics
            .get_mut(topic)
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))?;
        subscribers.push(queue);
        debug!(topic, subscribers = subscribers.len(), "Subscriber attached");
        Ok(())
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> Result<usize, BusError> {
        self.topics()
            .get(topic)
            .map(|subs| subs.iter().filter(|q| !q.is_closed()).count())
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))
    }

    /// Deliver `payload` to every subscriber of `topic`, in subscription order.
    ///
    /// Suspends while any bounded subscriber queue is full. Subscribers whose
    /// receiving end was dropped are pruned. Returns the number of deliveries.
    pub async fn publish(&self, topic: &str, payload: T) -> Result<usize, BusError> {
        // Clone the senders so the lock is not held across an await.
        let queues = self
            .topics()
            .get(topic)
            .cloned()
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))?;

        let mut delivered = 0;
        let mut saw_closed = false;
        for queue in &queues {
            if queue.send(payload.clone()).await.is_ok() {
                delivered += 1;
            } else {
                saw_closed = true;
            }
        }

        if saw_closed {
            if let Some(subs) = self.topics().get_mut(topic) {
                subs.retain(|q| !q.is_closed());
                debug!(topic, remaining = subs.len(), "Pruned closed subscribers");
            }
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn subscribe_to_undeclared_topic_fails() {
        let bus: EventBus<u32> = EventBus::new();
        assert_eq!(
            bus.subscribe("nope").unwrap_err(),
            BusError::UnknownTopic("nope".to_string())
        );
        assert!(bus.subscribe_bounded("nope", 4).is_err());
    }

    #[test]
    fn declare_is_idempotent() {
        let bus: EventBus<u32> = EventBus::new();
        bus.declare("t");
        let _sub = bus.subscribe("t").unwrap();
        bus.declare("t");
        assert_eq!(bus.subscriber_count("t").unwrap(), 1);
    }

    #[tokio::test]
    async fn publish_to_undeclared_topic_fails() {
        let bus: EventBus<u32> = EventBus::new();
        assert!(matches!(
            bus.publish("nope", 1).await,
            Err(BusError::UnknownTopic(_))
        ));
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event_in_order() {
        let bus: EventBus<u32> = EventBus::new();
        bus.declare("t");
        let mut a = bus.subscribe("t").unwrap();
        let mut b = bus.subscribe("t").unwrap();

        for i in 0..3 {
            assert_eq!(bus.publish("t", i).await.unwrap(), 2);
        }
        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await, Some(0));
            assert_eq!(sub.recv().await, Some(1));
            assert_eq!(sub.recv().await, Some(2));
            assert_eq!(sub.try_recv(), None);
        }
    }

    #[tokio::test]
    async fn late_subscriber_misses_history() {
        let bus: EventBus<u32> = EventBus::new();
        bus.declare("t");
        bus.publish("t", 1).await.unwrap();
        let mut late = bus.subscribe("t").unwrap();
        bus.publish("t", 2).await.unwrap();
        assert_eq!(late.recv().await, Some(2));
        assert_eq!(late.try_recv(), None);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let bus: EventBus<u32> = EventBus::new();
        bus.declare("t");
        let keep = bus.subscribe("t").unwrap();
        drop(bus.subscribe("t").unwrap());
        assert_eq!(bus.publish("t", 7).await.unwrap(), 1);
        assert_eq!(bus.subscriber_count("t").unwrap(), 1);
        drop(keep);
    }

    #[test]
    fn full_bounded_subscriber_suspends_publisher() {
        let bus: EventBus<u32> = EventBus::new();
        bus.declare("t");
        let mut slow = bus.subscribe_bounded("t", 1).unwrap();

        let mut first = task::spawn(bus.publish("t", 1));
        assert_eq!(assert_ready!(first.poll()), Ok(1));

        let mut second = task::spawn(bus.publish("t", 2));
        assert_pending!(second.poll());

        assert_eq!(slow.try_recv(), Some(1));
        assert!(second.is_woken());
        assert_eq!(assert_ready!(second.poll()), Ok(1));
        assert_eq!(slow.try_recv(), Some(2));
    }
}

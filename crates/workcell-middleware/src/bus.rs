//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Sensor topics use [`tokio::sync::broadcast`] channels so that every
//! subscriber receives every message without any single subscriber blocking
//! the others. A slow sensor subscriber loses the oldest buffered messages,
//! which is harmless because only the latest value matters.
//!
//! [`Topic::Orders`] is different: every order must reach the queue, and the
//! oldest one matters most. Each orders subscriber gets its own unbounded
//! [`tokio::sync::mpsc`] queue, so a burst never evicts an order.
//!
//! # Topics
//!
//! | Topic | Typical traffic | Delivery |
//! |---|---|---|
//! | [`Topic::Orders`] | Fulfilment orders from the competition | lossless |
//! | [`Topic::Cameras`] | Logical-camera detection lists | latest wins |
//! | [`Topic::JointStates`] | Arm joint feedback | latest wins |
//! | [`Topic::Telemetry`] | Pipeline output: target poses and per-tick faults | latest wins |

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;
use workcell_types::{CellError, Event};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers). Does not bound [`Topic::Orders`].
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Inbound fulfilment orders.
    Orders,
    /// Inbound logical-camera observations.
    Cameras,
    /// Inbound arm joint states.
    JointStates,
    /// Outbound target poses and pipeline faults.
    Telemetry,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    /// One queue per live orders subscriber.
    orders: Arc<Mutex<Vec<mpsc::UnboundedSender<Event>>>>,
    cameras: broadcast::Sender<Event>,
    joint_states: broadcast::Sender<Event>,
    telemetry: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every broadcast topic independently.
    pub fn new(capacity: usize) -> Self {
        let (cameras, _) = broadcast::channel(capacity);
        let (joint_states, _) = broadcast::channel(capacity);
        let (telemetry, _) = broadcast::channel(capacity);
        Self {
            orders: Arc::new(Mutex::new(Vec::new())),
            cameras,
            joint_states,
            telemetry,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`CellError::Channel`] when nobody is listening on the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, CellError> {
        let delivered = match self.broadcast_sender(topic) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => {
                let mut queues = self.orders.lock();
                queues.retain(|queue| queue.send(event.clone()).is_ok());
                queues.len()
            }
        };
        if delivered == 0 {
            return Err(CellError::Channel(format!("No subscribers for topic {:?}", topic)));
        }
        Ok(delivered)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        let inner = match self.broadcast_sender(topic) {
            Some(sender) => Inner::Latest(sender.subscribe()),
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.orders.lock().push(tx);
                Inner::Queued(rx)
            }
        };
        TopicReceiver { topic, inner }
    }

    /// `None` for the lossless orders topic.
    fn broadcast_sender(&self, topic: Topic) -> Option<&broadcast::Sender<Event>> {
        match topic {
            Topic::Orders => None,
            Topic::Cameras => Some(&self.cameras),
            Topic::JointStates => Some(&self.joint_states),
            Topic::Telemetry => Some(&self.telemetry),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    inner: Inner,
}

enum Inner {
    Latest(broadcast::Receiver<Event>),
    Queued(mpsc::UnboundedReceiver<Event>),
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped (broadcast topics only).
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        match &mut self.inner {
            Inner::Latest(rx) => rx.recv().await,
            Inner::Queued(rx) => rx.recv().await.ok_or(broadcast::error::RecvError::Closed),
        }
    }

    /// Take the next already-buffered event without waiting.
    ///
    /// Returns `None` once the buffer is empty or the bus is closed. A lagged
    /// broadcast subscriber skips the dropped events and keeps draining.
    pub fn try_recv(&mut self) -> Option<Event> {
        let rx = match &mut self.inner {
            Inner::Latest(rx) => rx,
            Inner::Queued(rx) => return rx.try_recv().ok(),
        };
        loop {
            match rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workcell_types::{EventPayload, Order};

    fn make_event(source: &str) -> Event {
        Event::new(source, EventPayload::Order(Order::default()))
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::Orders, make_event("test"));
        assert!(matches!(result, Err(CellError::Channel(_))));
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::Cameras);
        let mut subscriber2 = bus.subscribe_to(Topic::Cameras);

        let event = make_event("bridge::camera");
        assert_eq!(bus.publish_to(Topic::Cameras, event.clone())?, 2);

        assert_eq!(subscriber1.recv().await?.id, event.id);
        assert_eq!(subscriber2.recv().await?.id, event.id);
        Ok(())
    }

    /// A subscriber on `Telemetry` must not receive events published to
    /// `Orders` because they are routed through separate channels.
    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut telemetry_sub = bus.subscribe_to(Topic::Telemetry);
        let _orders_sub = bus.subscribe_to(Topic::Orders);

        bus.publish_to(Topic::Orders, make_event("bridge::orders"))?;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            telemetry_sub.recv(),
        )
        .await;
        assert!(result.is_err(), "Telemetry subscriber must not receive an Orders event");
        Ok(())
    }

    #[test]
    fn try_recv_drains_in_publish_order() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Orders);
        let first = make_event("a");
        let second = make_event("b");
        bus.publish_to(Topic::Orders, first.clone())?;
        bus.publish_to(Topic::Orders, second.clone())?;

        assert_eq!(rx.try_recv().map(|e| e.id), Some(first.id));
        assert_eq!(rx.try_recv().map(|e| e.id), Some(second.id));
        assert!(rx.try_recv().is_none());
        Ok(())
    }

    #[test]
    fn try_recv_skips_past_lag() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe_to(Topic::Cameras);
        for _ in 0..10 {
            let _ = bus.publish_to(Topic::Cameras, make_event("flood"));
        }
        let mut drained = 0;
        while rx.try_recv().is_some() {
            drained += 1;
        }
        assert_eq!(drained, 4, "only the newest `capacity` events survive");
        assert_eq!(rx.topic(), Topic::Cameras);
    }

    #[test]
    fn orders_survive_a_burst_larger_than_capacity() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe_to(Topic::Orders);
        let events: Vec<Event> = (0..10).map(|_| make_event("burst")).collect();
        for event in &events {
            bus.publish_to(Topic::Orders, event.clone())?;
        }

        for event in &events {
            assert_eq!(rx.try_recv().map(|e| e.id), Some(event.id));
        }
        assert!(rx.try_recv().is_none());
        Ok(())
    }

    #[test]
    fn dropped_orders_subscriber_is_pruned() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let kept = bus.subscribe_to(Topic::Orders);
        drop(bus.subscribe_to(Topic::Orders));

        assert_eq!(bus.publish_to(Topic::Orders, make_event("a"))?, 1);
        drop(kept);
        assert!(matches!(
            bus.publish_to(Topic::Orders, make_event("b")),
            Err(CellError::Channel(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn orders_recv_waits_for_next_order() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Orders);
        let event = make_event("bridge::orders");
        let publisher = bus.clone();
        let sent = event.clone();
        tokio::spawn(async move { publisher.publish_to(Topic::Orders, sent) });

        assert_eq!(rx.recv().await?.id, event.id);
        assert_eq!(rx.topic(), Topic::Orders);
        Ok(())
    }
}

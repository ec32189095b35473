//! Non-blocking event fan-out.
//!
//! A [`Publisher`] delivers each event to its subscribers with `try_send`, so
//! publishing never waits on a slow reader. A subscriber whose queue is full
//! loses the event and is dropped from the publisher. A subscriber whose queue
//! is closed is dropped as well. Publishers nest: a session publishes to one
//! sub-publisher per connection, which in turn feeds that connection's queue.

use dashmap::DashMap;
use log::{debug, warn};
use shared::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

pub type SubscriptionId = u64;

/// Where a subscription delivers events.
#[derive(Debug, Clone)]
pub enum Target {
    Queue(mpsc::Sender<Event>),
    Publisher(Arc<Publisher>),
}

#[derive(Debug, Default)]
pub struct Publisher {
    subscribers: DashMap<SubscriptionId, Target>,
    next_id: AtomicU64,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, target: Target) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, target);
        id
    }

    /// Returns false when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Delivers `event` to every subscriber and returns the number of queues
    /// that accepted it. Stops early once `cancel` fires.
    pub fn publish(&self, event: &Event, cancel: &CancellationToken) -> usize {
        let mut delivered = 0;
        let mut to_remove = Vec::new();

        for entry in self.subscribers.iter() {
            if cancel.is_cancelled() {
                debug!("Publish of {} cancelled", event.name());
                break;
            }

            match entry.value() {
                Target::Queue(queue) => match queue.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            "Subscriber {} is not keeping up, dropping {} and unsubscribing",
                            entry.key(),
                            event.name()
                        );
                        to_remove.push(*entry.key());
                    }
                    Err(TrySendError::Closed(_)) => to_remove.push(*entry.key()),
                },
                Target::Publisher(nested) => {
                    delivered += nested.publish(event, cancel);
                    if nested.is_empty() {
                        to_remove.push(*entry.key());
                    }
                }
            }
        }

        for id in to_remove {
            self.subscribers.remove(&id);
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn joined(name: &str) -> Event {
        Event::PlayerJoined {
            player_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_to_queue() {
        let publisher = Publisher::new();
        let (tx, mut rx) = mpsc::channel(4);
        publisher.subscribe(Target::Queue(tx));

        let reached = publisher.publish(&Event::GameStarted, &CancellationToken::new());

        assert_eq!(reached, 1);
        assert_eq!(assert_ok!(rx.try_recv()), Event::GameStarted);
    }

    #[tokio::test]
    async fn test_no_events_before_subscription() {
        let publisher = Publisher::new();
        let cancel = CancellationToken::new();
        publisher.publish(&joined("early"), &cancel);

        let (tx, mut rx) = mpsc::channel(4);
        publisher.subscribe(Target::Queue(tx));
        publisher.publish(&joined("late"), &cancel);

        assert_eq!(assert_ok!(rx.try_recv()), joined("late"));
        assert_err!(rx.try_recv());
    }

    #[tokio::test]
    async fn test_full_queue_is_dropped() {
        let publisher = Publisher::new();
        let cancel = CancellationToken::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(4);
        publisher.subscribe(Target::Queue(slow_tx));
        publisher.subscribe(Target::Queue(fast_tx));

        assert_eq!(publisher.publish(&joined("a"), &cancel), 2);
        assert_eq!(publisher.publish(&joined("b"), &cancel), 1);
        assert_eq!(publisher.len(), 1);

        assert_eq!(publisher.publish(&joined("c"), &cancel), 1);

        assert_eq!(assert_ok!(slow_rx.try_recv()), joined("a"));
        assert!(slow_rx.try_recv().is_err());
        assert_eq!(assert_ok!(fast_rx.try_recv()), joined("a"));
        assert_eq!(assert_ok!(fast_rx.try_recv()), joined("b"));
        assert_eq!(assert_ok!(fast_rx.try_recv()), joined("c"));
    }

    #[tokio::test]
    async fn test_closed_queue_is_dropped() {
        let publisher = Publisher::new();
        let (tx, rx) = mpsc::channel(4);
        publisher.subscribe(Target::Queue(tx));
        drop(rx);

        assert_eq!(publisher.publish(&Event::GameStarted, &CancellationToken::new()), 0);
        assert!(publisher.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let publisher = Publisher::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = publisher.subscribe(Target::Queue(tx));

        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));

        assert_eq!(publisher.publish(&Event::GameStarted, &CancellationToken::new()), 0);
        assert_err!(rx.try_recv());
    }

    #[tokio::test]
    async fn test_nested_publishers() {
        let session = Publisher::new();
        let cancel = CancellationToken::new();

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let connection = Arc::new(Publisher::new());
            let (tx, rx) = mpsc::channel(4);
            connection.subscribe(Target::Queue(tx));
            session.subscribe(Target::Publisher(connection));
            receivers.push(rx);
        }

        assert_eq!(session.publish(&Event::GameStarted, &cancel), 3);
        for rx in receivers.iter_mut() {
            assert_eq!(assert_ok!(rx.try_recv()), Event::GameStarted);
        }
    }

    #[tokio::test]
    async fn test_empty_nested_publisher_is_pruned() {
        let session = Publisher::new();
        let connection = Arc::new(Publisher::new());
        let (tx, rx) = mpsc::channel(4);
        connection.subscribe(Target::Queue(tx));
        session.subscribe(Target::Publisher(Arc::clone(&connection)));
        drop(rx);

        assert_eq!(session.publish(&Event::GameStarted, &CancellationToken::new()), 0);
        assert!(connection.is_empty());
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_publish_reaches_nobody() {
        let publisher = Publisher::new();
        let (tx, mut rx) = mpsc::channel(4);
        publisher.subscribe(Target::Queue(tx));

        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(publisher.publish(&Event::GameStarted, &cancel), 0);
        assert_err!(rx.try_recv());
        assert_eq!(publisher.len(), 1);
    }
}

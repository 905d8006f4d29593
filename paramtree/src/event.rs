//! Change events for parameter updates
//!
//! Every committed mutation of a device's map emits a `ChangeEvent` naming
//! the destination and what happened to it. Events carry no values; read
//! the map after receiving one.

use std::sync::mpsc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::iter::ChangeIterator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Removed,
    /// Attributes changed, or a subtree was refreshed from a peer
    Changed,
}

/// A change event emitted after a mutation commits
///
/// # Example
///
/// ```rust,ignore
/// for event in device.changes() {
///     if event.kind == ChangeKind::Changed {
///         println!("{} is now {:?}", event.destination, device.get(&event.destination));
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub destination: String,
    pub kind: ChangeKind,
    /// When the change was committed
    pub timestamp: Instant,
}

impl ChangeEvent {
    pub fn new(destination: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            destination: destination.into(),
            kind,
            timestamp: Instant::now(),
        }
    }
}

impl PartialEq for ChangeEvent {
    fn eq(&self, other: &Self) -> bool {
        // Timestamp not included in equality
        self.destination == other.destination && self.kind == other.kind
    }
}

/// Fan-out of change events to any number of iterators
///
/// Senders whose iterator was dropped are discarded on the next emit.
#[derive(Debug, Default)]
pub(crate) struct ChangeFeed {
    subscribers: Mutex<Vec<mpsc::Sender<ChangeEvent>>>,
}

impl ChangeFeed {
    pub(crate) fn subscribe(&self) -> ChangeIterator {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        ChangeIterator::new(rx)
    }

    pub(crate) fn emit(&self, destination: &str, kind: ChangeKind) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        let event = ChangeEvent::new(destination, kind);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_event_equality() {
        let event1 = ChangeEvent::new("/a", ChangeKind::Changed);
        let event2 = ChangeEvent::new("/a", ChangeKind::Changed);
        let event3 = ChangeEvent::new("/b", ChangeKind::Changed);
        let event4 = ChangeEvent::new("/a", ChangeKind::Removed);

        assert_eq!(event1, event2);
        assert_ne!(event1, event3);
        assert_ne!(event1, event4);
    }

    #[test]
    fn test_feed_reaches_every_subscriber() {
        let feed = ChangeFeed::default();
        let first = feed.subscribe();
        let second = feed.subscribe();

        feed.emit("/x", ChangeKind::Added);

        assert_eq!(first.try_recv(), Some(ChangeEvent::new("/x", ChangeKind::Added)));
        assert_eq!(second.try_recv(), Some(ChangeEvent::new("/x", ChangeKind::Added)));
    }

    #[test]
    fn test_feed_drops_closed_subscribers() {
        let feed = ChangeFeed::default();
        let kept = feed.subscribe();
        drop(feed.subscribe());

        feed.emit("/x", ChangeKind::Removed);
        assert_eq!(feed.subscribers.lock().len(), 1);
        assert!(kept.try_recv().is_some());
    }
}

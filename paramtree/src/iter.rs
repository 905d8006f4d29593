//! Blocking iterator over change events
//!
//! - Blocking: `recv()`, `for event in iter`
//! - Non-blocking: `try_recv()`, `try_iter()`
//! - Timeout: `recv_timeout()`, `timeout_iter()`

use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::event::ChangeEvent;

/// Blocking iterator over a device's change events
///
/// All methods are synchronous. The iterator ends once the device is
/// dropped.
///
/// ```rust,ignore
/// // With timeout
/// if let Some(event) = device.changes().recv_timeout(Duration::from_secs(1)) {
///     println!("Got event: {:?}", event);
/// }
/// ```
pub struct ChangeIterator {
    rx: Mutex<mpsc::Receiver<ChangeEvent>>,
}

impl ChangeIterator {
    pub(crate) fn new(rx: mpsc::Receiver<ChangeEvent>) -> Self {
        Self { rx: Mutex::new(rx) }
    }

    /// Block until the next event; `None` once the channel is closed
    pub fn recv(&self) -> Option<ChangeEvent> {
        self.rx.lock().recv().ok()
    }

    /// Block until the next event or until `timeout` expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        self.rx.lock().recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<ChangeEvent> {
        self.rx.lock().try_recv().ok()
    }

    /// Iterator over the events already queued
    pub fn try_iter(&self) -> TryIter<'_> {
        TryIter { inner: self }
    }

    /// Iterator that stops after `timeout` passes without an event
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIter<'_> {
        TimeoutIter { inner: self, timeout }
    }
}

impl Iterator for ChangeIterator {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Non-blocking iterator over currently available events
pub struct TryIter<'a> {
    inner: &'a ChangeIterator,
}

impl Iterator for TryIter<'_> {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with timeout
pub struct TimeoutIter<'a> {
    inner: &'a ChangeIterator,
    timeout: Duration,
}

impl Iterator for TimeoutIter<'_> {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;
    use std::thread;
    use std::time::Instant;

    fn event(destination: &str) -> ChangeEvent {
        ChangeEvent::new(destination, ChangeKind::Changed)
    }

    #[test]
    fn test_try_recv() {
        let (tx, rx) = mpsc::channel();
        let iter = ChangeIterator::new(rx);
        assert!(iter.try_recv().is_none());

        tx.send(event("/a")).unwrap();
        assert_eq!(iter.try_recv().unwrap().destination, "/a");
        assert!(iter.try_recv().is_none());
    }

    #[test]
    fn test_recv_timeout() {
        let (tx, rx) = mpsc::channel::<ChangeEvent>();
        let iter = ChangeIterator::new(rx);

        let start = Instant::now();
        assert!(iter.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tx.send(event("/late")).unwrap();
        });
        assert!(iter.recv_timeout(Duration::from_millis(500)).is_some());
    }

    #[test]
    fn test_try_iter_drains_queue() {
        let (tx, rx) = mpsc::channel();
        let iter = ChangeIterator::new(rx);
        for path in ["/a", "/b", "/c"] {
            tx.send(event(path)).unwrap();
        }

        let paths: Vec<_> = iter.try_iter().map(|e| e.destination).collect();
        assert_eq!(paths, ["/a", "/b", "/c"]);
    }

    #[test]
    fn test_timeout_iter_stops() {
        let (tx, rx) = mpsc::channel();
        let iter = ChangeIterator::new(rx);
        tx.send(event("/a")).unwrap();

        assert_eq!(iter.timeout_iter(Duration::from_millis(20)).count(), 1);
    }

    #[test]
    fn test_channel_closed() {
        let (tx, rx) = mpsc::channel::<ChangeEvent>();
        let mut iter = ChangeIterator::new(rx);
        drop(tx);
        assert!(iter.next().is_none());
    }
}

//! One-shot completion latch with bounded waits

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{DeviceError, Result};

/// Cloneable handle signalled once when an outstanding exchange finishes
///
/// Clones share state, so a refresh requested while another is pending can
/// hand out the same handle.
#[derive(Clone, Default)]
pub struct Completion {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark complete and wake every waiter; later calls do nothing
    pub fn complete(&self) {
        let (done, condvar) = &*self.inner;
        let mut done = done.lock();
        if !*done {
            *done = true;
            condvar.notify_all();
        }
    }

    pub fn is_complete(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block until complete, or fail with `Timeout` after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let (done, condvar) = &*self.inner;
        let mut done = done.lock();
        while !*done {
            if condvar.wait_until(&mut done, deadline).timed_out() {
                return if *done { Ok(()) } else { Err(DeviceError::Timeout(timeout)) };
            }
        }
        Ok(())
    }

    /// Whether `other` is a clone of this handle
    pub fn same_as(&self, other: &Completion) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out() {
        let completion = Completion::new();
        let err = completion.wait_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, DeviceError::Timeout(d) if d == Duration::from_millis(20)));
        assert!(!completion.is_complete());
    }

    #[test]
    fn test_complete_wakes_waiter() {
        let completion = Completion::new();
        let signaller = completion.clone();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            signaller.complete();
        });

        completion.wait_timeout(Duration::from_secs(2)).unwrap();
        assert!(completion.is_complete());
    }

    #[test]
    fn test_clones_share_state() {
        let a = Completion::new();
        let b = a.clone();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Completion::new()));

        b.complete();
        b.complete();
        assert!(a.is_complete());
        assert!(a.wait_timeout(Duration::ZERO).is_ok());
    }
}

//! One-shot latch: a single-slot rendezvous released from another thread.
//!
//! The bridge blocks on a latch at each of its wait points; the runtime platform releases it from a callback
//! running on its own threads. The first [`Latch::signal`] wins. Once the waiting side gives up it calls
//! [`Latch::close`], after which late signals are handed back to the caller so it can clean up.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("timed out after {0:?}")]
pub struct TimedOut(pub Duration);

enum Slot<T> {
    Empty,
    Filled(T),
    Taken,
    Closed,
}

pub struct Latch<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Default for Latch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Latch<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        // A poisoned slot still holds a coherent state: every write is a single assignment.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Release the latch with `value`.
    ///
    /// ## Returns
    /// - `Ok(())` if this call released the latch.
    /// - `Err(value)` if the latch was already released or has been closed by the waiter.
    pub fn signal(&self, value: T) -> Result<(), T> {
        let mut slot = self.lock();
        match *slot {
            Slot::Empty => {
                *slot = Slot::Filled(value);
                drop(slot);
                self.ready.notify_all();
                Ok(())
            }
            Slot::Filled(_) | Slot::Taken | Slot::Closed => Err(value),
        }
    }

    /// Block until the latch is released or `timeout` elapses.
    ///
    /// The deadline is fixed when the wait begins; spurious wakeups re-wait only for the remaining time. A timeout
    /// too large to represent as a deadline waits without one.
    pub fn wait(&self, timeout: Duration) -> Result<T, TimedOut> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.lock();
        loop {
            if let Slot::Filled(_) = *slot {
                if let Slot::Filled(value) = std::mem::replace(&mut *slot, Slot::Taken) {
                    return Ok(value);
                }
            }
            slot = match deadline {
                None => self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TimedOut(timeout));
                    }
                    match self.ready.wait_timeout(slot, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
            };
        }
    }

    /// Mark the latch abandoned. Any value that arrived but was never taken is returned.
    pub fn close(&self) -> Option<T> {
        let mut slot = self.lock();
        match std::mem::replace(&mut *slot, Slot::Closed) {
            Slot::Filled(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock(), Slot::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_signal_before_wait() {
        let latch = Latch::new();
        latch.signal(7).unwrap();
        assert_eq!(latch.wait(Duration::from_millis(10)), Ok(7));
    }

    #[test]
    fn test_signal_from_other_thread() {
        let latch = Arc::new(Latch::new());
        let remote = latch.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.signal("deployed").unwrap();
        });
        assert_eq!(latch.wait(Duration::from_secs(5)), Ok("deployed"));
        handle.join().unwrap();
    }

    #[test]
    fn test_only_first_signal_wins() {
        let latch = Latch::new();
        assert!(latch.signal(1).is_ok());
        assert_eq!(latch.signal(2), Err(2));
        assert_eq!(latch.wait(Duration::ZERO), Ok(1));
        assert_eq!(latch.signal(3), Err(3));
    }

    #[test]
    fn test_wait_times_out_no_earlier_than_deadline() {
        let latch: Latch<()> = Latch::new();
        let start = Instant::now();
        let err = latch.wait(Duration::from_millis(50)).unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(err, TimedOut(Duration::from_millis(50)));
    }

    #[test]
    fn test_unrepresentable_timeout_waits_without_deadline() {
        let latch = Arc::new(Latch::new());
        let remote = latch.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.signal(5).unwrap();
        });
        assert_eq!(latch.wait(Duration::MAX), Ok(5));
        handle.join().unwrap();

        let ready = Latch::new();
        ready.signal("now").unwrap();
        assert_eq!(ready.wait(Duration::from_secs(u64::MAX)), Ok("now"));
    }

    #[test]
    fn test_closed_latch_hands_back_late_signal() {
        let latch = Latch::new();
        assert_eq!(latch.close(), None);
        assert!(latch.is_closed());
        assert_eq!(latch.signal("late"), Err("late"));
    }

    #[test]
    fn test_close_returns_untaken_value() {
        let latch = Latch::new();
        latch.signal(9).unwrap();
        assert_eq!(latch.close(), Some(9));
    }
}

//! A single in-flight load that other callers can wait on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

enum Slot<V, E> {
    Running,
    Settled(Result<V, E>),
    /// The leader went away without producing an outcome (it panicked).
    Abandoned,
}

/// Shared state of one running load.
///
/// The leader that created the flight runs the load and publishes the outcome
/// with [`settle`](Self::settle); every follower blocks in
/// [`wait`](Self::wait) and receives a clone of that outcome.
pub(crate) struct Flight<V, E> {
    slot: Mutex<Slot<V, E>>,
    changed: Condvar,
    waiters: AtomicUsize,
}

impl<V: Clone, E: Clone> Flight<V, E> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Running),
            changed: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Register one more follower.
    pub(crate) fn join(&self) {
        self.waiters.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of followers that joined this flight.
    pub(crate) fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    /// Block until the flight settles.
    ///
    /// Returns `None` if the leader abandoned the flight.
    pub(crate) fn wait(&self) -> Option<Result<V, E>> {
        let mut slot = self.lock();
        loop {
            match &*slot {
                Slot::Running => {
                    slot = self
                        .changed
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Slot::Settled(outcome) => return Some(outcome.clone()),
                Slot::Abandoned => return None,
            }
        }
    }

    /// Publish the outcome and wake every follower.
    pub(crate) fn settle(&self, outcome: Result<V, E>) {
        *self.lock() = Slot::Settled(outcome);
        self.changed.notify_all();
    }

    /// Wake every follower without an outcome.
    pub(crate) fn abandon(&self) {
        *self.lock() = Slot::Abandoned;
        self.changed.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, Slot<V, E>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_settled_flight_returns_outcome() {
        let flight: Flight<u32, String> = Flight::new();
        flight.settle(Ok(7));

        assert_eq!(flight.wait(), Some(Ok(7)));
        // Outcome stays available for late followers
        assert_eq!(flight.wait(), Some(Ok(7)));
    }

    #[test]
    fn test_abandoned_flight_returns_none() {
        let flight: Flight<u32, String> = Flight::new();
        flight.abandon();

        assert_eq!(flight.wait(), None);
    }

    #[test]
    fn test_followers_wake_on_settle() {
        let flight: Arc<Flight<u32, String>> = Arc::new(Flight::new());

        let followers: Vec<_> = (0..4)
            .map(|_| {
                let flight = Arc::clone(&flight);
                flight.join();
                thread::spawn(move || flight.wait())
            })
            .collect();

        assert_eq!(flight.waiters(), 4);
        flight.settle(Err("boom".to_owned()));

        for follower in followers {
            assert_eq!(follower.join().unwrap(), Some(Err("boom".to_owned())));
        }
    }
}

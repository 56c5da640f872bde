//! Keyed memo with a pending-operation registry.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::flight::Flight;

/// How a [`Memo::get_or_load_with_lookup`] call was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Returned a resolved entry without running anything.
    Hit,
    /// Attached to a load another caller had already started.
    Joined,
    /// Ran the loader itself.
    Loaded,
}

struct State<K, V, E> {
    resolved: HashMap<K, V>,
    pending: HashMap<K, Arc<Flight<V, E>>>,
}

impl<K: Eq + Hash, V, E> State<K, V, E> {
    /// Remove the pending marker for `key` if it still points at `flight`.
    fn remove_pending(&mut self, key: &K, flight: &Arc<Flight<V, E>>) {
        if self
            .pending
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            self.pending.remove(key);
        }
    }
}

/// Keyed cache whose misses are deduplicated while in flight.
///
/// At most one load runs per key at any time. A caller arriving while a load
/// for its key is running waits for that load and receives a clone of its
/// outcome, whatever `use_cache` flag either caller passed: the dedup window
/// is per key, not per call.
///
/// Successful loads are stored (replacing any previous entry for the key).
/// Failed loads are not stored and leave a previously resolved entry for the
/// same key untouched. The pending marker is cleared on every outcome, so the
/// next request after a failure retries from scratch.
///
/// The registry lock is never held while a loader runs.
pub struct Memo<K, V, E> {
    name: &'static str,
    state: Mutex<State<K, V, E>>,
}

impl<K, V, E> Default for Memo<K, V, E> {
    fn default() -> Self {
        Self::named("memo")
    }
}

impl<K, V, E> fmt::Debug for Memo<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Memo")
            .field("name", &self.name)
            .field("resolved", &state.resolved.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl<K, V, E> Memo<K, V, E> {
    /// Create an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty memo with a name used in log events.
    #[must_use]
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State {
                resolved: HashMap::new(),
                pending: HashMap::new(),
            }),
        }
    }

    /// Name used in log events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of resolved entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().resolved.len()
    }

    /// True if no entry is resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().resolved.is_empty()
    }

    /// Drop every resolved entry.
    ///
    /// Running loads are not affected and will store their value when done.
    pub fn clear(&self) {
        self.lock().resolved.clear();
    }

    fn lock(&self) -> MutexGuard<'_, State<K, V, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V, E> Memo<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
    E: Clone,
{
    /// Resolved entry for `key`, if any. Never waits on a running load.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().resolved.get(key).cloned()
    }

    /// True if a resolved entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.lock().resolved.contains_key(key)
    }

    /// Drop the resolved entry for `key`.
    pub fn invalidate(&self, key: &K) {
        self.lock().resolved.remove(key);
    }

    /// True while a load for `key` is running.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.lock().pending.contains_key(key)
    }

    /// Number of callers waiting on the running load for `key`.
    ///
    /// Zero when nothing is in flight. The leader running the load is not
    /// counted.
    #[must_use]
    pub fn waiters(&self, key: &K) -> usize {
        self.lock().pending.get(key).map_or(0, |flight| flight.waiters())
    }

    /// Return the value for `key`, loading it if needed.
    ///
    /// See [`get_or_load_with_lookup`](Self::get_or_load_with_lookup).
    ///
    /// # Errors
    ///
    /// Returns the loader's error, whether this caller ran the loader or
    /// joined another caller's load.
    pub fn get_or_load<F>(&self, key: K, use_cache: bool, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.get_or_load_with_lookup(key, use_cache, load).0
    }

    /// Return the value for `key` and how it was obtained.
    ///
    /// 1. With `use_cache` and a resolved entry: return it.
    /// 2. With a load for `key` in flight: wait for it and share its outcome.
    /// 3. Otherwise: run `load`, store a successful value, wake all waiters.
    ///
    /// If the caller running a load panics, its waiters start over instead of
    /// blocking forever.
    pub fn get_or_load_with_lookup<F>(
        &self,
        key: K,
        use_cache: bool,
        load: F,
    ) -> (Result<V, E>, Lookup)
    where
        F: FnOnce() -> Result<V, E>,
    {
        let flight = loop {
            let joined = {
                let mut state = self.lock();

                if use_cache && let Some(value) = state.resolved.get(&key) {
                    tracing::trace!(memo = self.name, ?key, "cache hit");
                    return (Ok(value.clone()), Lookup::Hit);
                }

                match state.pending.get(&key) {
                    Some(flight) => {
                        flight.join();
                        Arc::clone(flight)
                    }
                    None => {
                        let flight = Arc::new(Flight::new());
                        state.pending.insert(key.clone(), Arc::clone(&flight));
                        break flight;
                    }
                }
            };

            tracing::trace!(memo = self.name, ?key, "joining in-flight load");
            match joined.wait() {
                Some(outcome) => return (outcome, Lookup::Joined),
                None => {
                    tracing::warn!(memo = self.name, ?key, "in-flight load abandoned, retrying");
                }
            }
        };

        let mut guard = LeaderGuard {
            memo: self,
            key: &key,
            flight: &flight,
            finished: false,
        };
        let outcome = load();
        guard.finish(&outcome);
        flight.settle(outcome.clone());

        (outcome, Lookup::Loaded)
    }
}

/// Clears the pending marker of a leader's flight, even if the loader panics.
struct LeaderGuard<'a, K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
    E: Clone,
{
    memo: &'a Memo<K, V, E>,
    key: &'a K,
    flight: &'a Arc<Flight<V, E>>,
    finished: bool,
}

impl<K, V, E> LeaderGuard<'_, K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
    E: Clone,
{
    fn finish(&mut self, outcome: &Result<V, E>) {
        let mut state = self.memo.lock();
        match outcome {
            Ok(value) => {
                state.resolved.insert(self.key.clone(), value.clone());
                tracing::debug!(memo = self.memo.name, key = ?self.key, "stored");
            }
            Err(_) => {
                tracing::debug!(memo = self.memo.name, key = ?self.key, "load failed, not stored");
            }
        }
        state.remove_pending(self.key, self.flight);
        self.finished = true;
    }
}

impl<K, V, E> Drop for LeaderGuard<'_, K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
    E: Clone,
{
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.memo.lock().remove_pending(self.key, self.flight);
        self.flight.abandon();
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    type TestMemo = Memo<String, String, String>;

    fn key(s: &str) -> String {
        s.to_owned()
    }

    /// Wait until `n` callers have joined the flight for `k`.
    fn wait_for_waiters(memo: &TestMemo, k: &str, n: usize) {
        while memo.waiters(&key(k)) < n {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_cached_load_runs_once() {
        let memo = TestMemo::new();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("value".to_owned())
        };

        let (first, first_lookup) = memo.get_or_load_with_lookup(key("a"), true, load);
        let (second, second_lookup) = memo.get_or_load_with_lookup(key("a"), true, load);

        assert_eq!(first, Ok("value".to_owned()));
        assert_eq!(second, Ok("value".to_owned()));
        assert_eq!(first_lookup, Lookup::Loaded);
        assert_eq!(second_lookup, Lookup::Hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_uncached_load_always_runs() {
        let memo = TestMemo::new();
        let calls = AtomicUsize::new(0);
        let load = || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("v{n}"))
        };

        assert_eq!(memo.get_or_load(key("a"), false, load), Ok("v0".to_owned()));
        assert_eq!(memo.get_or_load(key("a"), false, load), Ok("v1".to_owned()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The latest successful load is what cached callers see
        assert_eq!(memo.get(&key("a")), Some("v1".to_owned()));
    }

    #[test]
    fn test_failure_is_not_cached() {
        let memo = TestMemo::new();

        let err = memo.get_or_load(key("a"), true, || Err("boom".to_owned()));
        assert_eq!(err, Err("boom".to_owned()));
        assert!(!memo.contains(&key("a")));
        assert!(!memo.is_pending(&key("a")));

        let ok = memo.get_or_load(key("a"), true, || Ok("recovered".to_owned()));
        assert_eq!(ok, Ok("recovered".to_owned()));
    }

    #[test]
    fn test_failure_keeps_previous_entry() {
        let memo = TestMemo::new();
        memo.get_or_load(key("a"), true, || Ok("good".to_owned())).unwrap();

        let err = memo.get_or_load(key("a"), false, || Err("bad".to_owned()));

        assert_eq!(err, Err("bad".to_owned()));
        assert_eq!(memo.get(&key("a")), Some("good".to_owned()));
    }

    #[test]
    fn test_concurrent_callers_share_one_load() {
        let memo = Arc::new(TestMemo::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let leader = {
            let memo = Arc::clone(&memo);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                memo.get_or_load_with_lookup(key("a"), true, move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    release_rx.recv().unwrap();
                    Ok("shared".to_owned())
                })
            })
        };
        while !memo.is_pending(&key("a")) {
            thread::sleep(Duration::from_millis(1));
        }

        let followers: Vec<_> = (0..3)
            .map(|_| {
                let memo = Arc::clone(&memo);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    memo.get_or_load_with_lookup(key("a"), true, move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("duplicate".to_owned())
                    })
                })
            })
            .collect();
        wait_for_waiters(&memo, "a", 3);
        release_tx.send(()).unwrap();

        assert_eq!(
            leader.join().unwrap(),
            (Ok("shared".to_owned()), Lookup::Loaded)
        );
        for follower in followers {
            assert_eq!(
                follower.join().unwrap(),
                (Ok("shared".to_owned()), Lookup::Joined)
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!memo.is_pending(&key("a")));
        assert_eq!(memo.waiters(&key("a")), 0);
    }

    #[test]
    fn test_uncached_caller_joins_running_load() {
        let memo = Arc::new(TestMemo::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let leader = {
            let memo = Arc::clone(&memo);
            thread::spawn(move || {
                memo.get_or_load(key("a"), true, move || {
                    release_rx.recv().unwrap();
                    Ok("first".to_owned())
                })
            })
        };
        while !memo.is_pending(&key("a")) {
            thread::sleep(Duration::from_millis(1));
        }

        let uncached = {
            let memo = Arc::clone(&memo);
            thread::spawn(move || {
                memo.get_or_load_with_lookup(key("a"), false, || Ok("second".to_owned()))
            })
        };
        wait_for_waiters(&memo, "a", 1);
        release_tx.send(()).unwrap();

        assert_eq!(leader.join().unwrap(), Ok("first".to_owned()));
        assert_eq!(
            uncached.join().unwrap(),
            (Ok("first".to_owned()), Lookup::Joined)
        );
    }

    #[test]
    fn test_concurrent_failure_reaches_every_waiter() {
        let memo = Arc::new(TestMemo::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let leader = {
            let memo = Arc::clone(&memo);
            thread::spawn(move || {
                memo.get_or_load(key("a"), true, move || {
                    release_rx.recv().unwrap();
                    Err("io".to_owned())
                })
            })
        };
        while !memo.is_pending(&key("a")) {
            thread::sleep(Duration::from_millis(1));
        }
        let follower = {
            let memo = Arc::clone(&memo);
            thread::spawn(move || memo.get_or_load(key("a"), true, || Ok("late".to_owned())))
        };
        wait_for_waiters(&memo, "a", 1);
        release_tx.send(()).unwrap();

        assert_eq!(leader.join().unwrap(), Err("io".to_owned()));
        assert_eq!(follower.join().unwrap(), Err("io".to_owned()));
        assert!(!memo.contains(&key("a")));
        assert!(!memo.is_pending(&key("a")));
    }

    #[test]
    fn test_panicking_loader_clears_pending() {
        let memo = TestMemo::new();

        let result = catch_unwind(AssertUnwindSafe(|| {
            memo.get_or_load(key("a"), true, || panic!("loader exploded"))
        }));

        assert!(result.is_err());
        assert!(!memo.is_pending(&key("a")));
        assert_eq!(
            memo.get_or_load(key("a"), true, || Ok("retried".to_owned())),
            Ok("retried".to_owned())
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let memo = TestMemo::new();

        memo.get_or_load(key("a"), true, || Ok("A".to_owned())).unwrap();
        memo.get_or_load(key("b"), true, || Ok("B".to_owned())).unwrap();

        assert_eq!(memo.len(), 2);
        memo.invalidate(&key("a"));
        assert_eq!(memo.get(&key("a")), None);
        assert_eq!(memo.get(&key("b")), Some("B".to_owned()));

        memo.clear();
        assert!(memo.is_empty());
    }

    #[test]
    fn test_debug_reports_counts() {
        let memo = TestMemo::named("files");
        memo.get_or_load(key("a"), true, || Ok("A".to_owned())).unwrap();

        let debug = format!("{memo:?}");

        assert!(debug.contains("files"));
        assert!(debug.contains("resolved: 1"));
    }
}

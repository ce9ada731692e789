//! Concurrent key/value store with blocking retrieval.
//!
//! A key is expected to be inserted once with [`BlockingStore::put_new`] and
//! removed once with [`BlockingStore::take`], but the two may arrive in
//! either order: a `take` that arrives first waits for the insert.
//!
//! All operations share one lock and one broadcast notifier per store, so
//! every insert or removal wakes every waiter regardless of which key it is
//! waiting on. Waiters re-check their own key and go back to sleep. This
//! costs spurious wakeups proportional to the number of concurrent waiters.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

/// Keyed store whose readers can wait for entries to appear or disappear.
#[derive(Debug)]
pub struct BlockingStore<K, V> {
    entries: Mutex<HashMap<K, V>>,
    changed: Notify,
}

impl<K, V> BlockingStore<K, V>
where
    K: Eq + Hash,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            changed: Notify::new(),
        }
    }

    /// Inserts `value` under `key` if no entry for `key` is present.
    ///
    /// Returns `false`, leaving the store untouched, when the key is already
    /// present. On success every waiter on this store is woken.
    pub fn put_new(&self, key: K, value: V) -> bool {
        {
            let mut entries = self.entries.lock();
            if entries.contains_key(&key) {
                return false;
            }
            entries.insert(key, value);
        }
        self.changed.notify_waiters();
        true
    }

    /// Waits up to `wait` for `key` to be present, then removes and returns
    /// its value.
    ///
    /// Returns `None` without side effects if the key did not appear in
    /// time. An insert that lands before the deadline is always observed.
    pub async fn take<Q>(&self, key: &Q, wait: Duration) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let deadline = deadline_after(wait);
        loop {
            // Register interest before checking so a concurrent insert
            // between the check and the await cannot be missed.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.remove(key) {
                return Some(value);
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.remove(key);
            }
        }
    }

    /// Waits up to `wait` for `key` to be taken by somebody else.
    ///
    /// Returns `false` if another caller removed the entry in time. If the
    /// entry is still present at the deadline it is removed here and `true`
    /// is returned. Either way the key is absent when this returns.
    pub async fn remove_untaken<Q>(&self, key: &Q, wait: Duration) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let deadline = deadline_after(wait);
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.contains(key) {
                return false;
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.remove(key).is_some();
            }
        }
    }

    /// Removes `key` immediately, without waiting, waking waiters if an
    /// entry was removed.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.entries.lock().remove(key);
        if removed.is_some() {
            self.changed.notify_waiters();
        }
        removed
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Deadline `wait` from now, saturating at a far-future instant instead of
/// overflowing.
fn deadline_after(wait: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
    let now = Instant::now();
    now.checked_add(wait)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

impl<K, V> Default for BlockingStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

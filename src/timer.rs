//! Cancelable one-shot timers keyed by an arbitrary value.
//!
//! Each scheduled timer is a Tokio task sleeping until its deadline, after
//! which it posts a [`TimerFired`] record on the table's queue. A record only
//! counts if its generation still matches the table entry for that key, so a
//! timer that was canceled or replaced after it already fired never acts.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired<K> {
    pub key: K,
    pub generation: u64,
}

#[derive(Debug)]
struct Pending {
    generation: u64,
    deadline: Instant,
    handle: AbortHandle,
}

/// At most one pending timer per key. Must be used inside a Tokio runtime.
#[derive(Debug)]
pub struct TimerTable<K> {
    pending: HashMap<K, Pending>,
    next_generation: u64,
    fired_tx: mpsc::UnboundedSender<TimerFired<K>>,
    fired_rx: mpsc::UnboundedReceiver<TimerFired<K>>,
    notify: Option<Arc<watch::Sender<u64>>>,
}

impl<K> TimerTable<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new() -> Self {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        Self {
            pending: HashMap::new(),
            next_generation: 0,
            fired_tx,
            fired_rx,
            notify: None,
        }
    }

    /// Also bump `revision` the moment a timer fires, before anyone polls.
    pub fn notify_on_fire(mut self, revision: Arc<watch::Sender<u64>>) -> Self {
        self.notify = Some(revision);
        self
    }

    /// Replace whatever timer `key` had with a fresh one firing after `delay`.
    pub fn schedule(&mut self, key: K, delay: Duration) -> Instant {
        self.cancel(&key);

        self.next_generation += 1;
        let generation = self.next_generation;
        let deadline = Instant::now() + delay;
        let fired_tx = self.fired_tx.clone();
        let fired_key = key.clone();
        let notify = self.notify.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // The table may already be gone; nothing to notify then.
            let _ = fired_tx.send(TimerFired {
                key: fired_key,
                generation,
            });
            if let Some(revision) = notify {
                revision.send_modify(|r| *r = r.wrapping_add(1));
            }
        })
        .abort_handle();

        self.pending.insert(
            key,
            Pending {
                generation,
                deadline,
                handle,
            },
        );
        deadline
    }

    /// Returns whether a timer was pending for `key`.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn deadline(&self, key: &K) -> Option<Instant> {
        self.pending.get(key).map(|p| p.deadline)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain fired timers and return the keys whose timer was still current.
    pub fn poll_fired(&mut self) -> Vec<K> {
        let mut expired = Vec::new();
        while let Ok(fired) = self.fired_rx.try_recv() {
            if self.take_if_current(&fired) {
                expired.push(fired.key);
            }
        }
        expired
    }

    fn take_if_current(&mut self, fired: &TimerFired<K>) -> bool {
        let current = self
            .pending
            .get(&fired.key)
            .is_some_and(|p| p.generation == fired.generation);
        if current {
            self.pending.remove(&fired.key);
        }
        current
    }
}

impl<K> Default for TimerTable<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for TimerTable<K> {
    fn drop(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
    }
}

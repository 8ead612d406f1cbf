//! Known peers ordered by when they were last seen alive
//!
//! The oldest entry has the highest probe priority. Blacklisted peers are
//! removed and every later attempt to add them is ignored.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mixcraft_core::{FixedBytes, PublicKey};
use parking_lot::Mutex;
use tracing::debug;

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    duration_millis(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default(),
    )
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A peer and the last time it was seen alive (unix millis)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub id: PublicKey,
    pub last_seen: u64,
}

/// (last_seen, insertion sequence, id)
type OrderKey = (u64, u64, PublicKey);

#[derive(Default)]
struct Inner {
    index: HashMap<PublicKey, OrderKey>,
    order: BTreeSet<OrderKey>,
    blacklist: HashSet<PublicKey>,
    next_seq: u64,
}

impl Inner {
    fn remove(&mut self, id: &PublicKey) -> Option<OrderKey> {
        let key = self.index.remove(id)?;
        self.order.remove(&key);
        Some(key)
    }

    fn pop_first(&mut self) -> Option<Entry> {
        let key = self.order.pop_first()?;
        self.index.remove(&key.2);
        Some(Entry {
            id: key.2,
            last_seen: key.0,
        })
    }
}

/// Time-ordered peer registry shared by the heartbeat and the connection
/// listener. Every operation takes the lock once for its whole duration.
#[derive(Default)]
pub struct NetworkPeerStore {
    inner: Mutex<Inner>,
}

impl NetworkPeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer or update its last-seen time. Returns false if the peer
    /// is blacklisted.
    pub fn push(&self, id: PublicKey, last_seen: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.blacklist.contains(&id) {
            return false;
        }

        inner.remove(&id);
        let key = (last_seen, inner.next_seq, id);
        inner.next_seq += 1;
        inner.order.insert(key);
        inner.index.insert(id, key);
        true
    }

    /// Remove and return the oldest entry
    pub fn pop(&self) -> Option<Entry> {
        self.inner.lock().pop_first()
    }

    /// Remove and return the oldest entry if it was last seen before `threshold`
    pub fn pop_stale(&self, threshold: u64) -> Option<Entry> {
        let mut inner = self.inner.lock();
        let stale = inner
            .order
            .first()
            .map(|(last_seen, _, _)| *last_seen < threshold)
            .unwrap_or(false);
        if stale {
            inner.pop_first()
        } else {
            None
        }
    }

    /// The `n` oldest entries, oldest first, without removing them
    pub fn top(&self, n: usize) -> Vec<Entry> {
        self.inner
            .lock()
            .order
            .iter()
            .take(n)
            .map(|(last_seen, _, id)| Entry {
                id: *id,
                last_seen: *last_seen,
            })
            .collect()
    }

    /// Whether any entry was seen at or after `threshold`
    pub fn updated_since(&self, threshold: u64) -> bool {
        self.inner
            .lock()
            .order
            .last()
            .map(|(last_seen, _, _)| *last_seen >= threshold)
            .unwrap_or(false)
    }

    /// Remove a peer and exclude it from the store for good
    pub fn blacklist_peer(&self, id: &PublicKey) {
        let mut inner = self.inner.lock();
        inner.remove(id);
        if inner.blacklist.insert(*id) {
            debug!("Blacklisted peer {}", id.short_hex());
        }
    }

    pub fn is_blacklisted(&self, id: &PublicKey) -> bool {
        self.inner.lock().blacklist.contains(id)
    }

    pub fn contains(&self, id: &PublicKey) -> bool {
        self.inner.lock().index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

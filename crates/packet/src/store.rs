//! Pending acknowledgement storage
//!
//! Records what a node waits for under each acknowledgement challenge:
//! either confirmation that the first hop picked up its packet, or the ack
//! key share that makes a held ticket redeemable.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mixcraft_core::{AcknowledgedTicket, FixedBytes, HalfKeyChallenge, PendingAcknowledgement};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Default time a pending record waits for its acknowledgement (1 hour)
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Maximum number of pending records
const DEFAULT_MAX_PENDING: usize = 10000;

/// Maximum number of acknowledged tickets awaiting redemption
const DEFAULT_MAX_ACKNOWLEDGED: usize = 10000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub ttl: Duration,
    pub max_pending: usize,
    /// Past this many, the oldest acknowledged ticket is dropped
    pub max_acknowledged: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_pending: DEFAULT_MAX_PENDING,
            max_acknowledged: DEFAULT_MAX_ACKNOWLEDGED,
        }
    }
}

/// Persistence boundary for pending and acknowledged tickets
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn store_unacknowledged_ticket(
        &self,
        challenge: HalfKeyChallenge,
        pending: PendingAcknowledgement,
    ) -> Result<(), StoreError>;

    async fn get_unacknowledged_ticket(
        &self,
        challenge: &HalfKeyChallenge,
    ) -> Result<Option<PendingAcknowledgement>, StoreError>;

    /// Remove the pending record for `challenge`, keeping `acknowledged` if
    /// given. Returns false if nothing was pending, so exactly one caller
    /// wins when the same acknowledgement arrives twice.
    async fn mark_resolved(
        &self,
        challenge: &HalfKeyChallenge,
        acknowledged: Option<AcknowledgedTicket>,
    ) -> Result<bool, StoreError>;

    async fn acknowledged_tickets(&self) -> Result<Vec<AcknowledgedTicket>, StoreError>;

    /// Remove and return every acknowledged ticket, handing them over for
    /// redemption
    async fn take_acknowledged_tickets(&self) -> Result<Vec<AcknowledgedTicket>, StoreError>;

    /// Drop pending records older than the TTL. Returns how many were dropped.
    async fn prune_expired(&self) -> Result<usize, StoreError>;
}

struct PendingEntry {
    pending: PendingAcknowledgement,
    created_at: Instant,
}

#[derive(Default)]
struct Inner {
    pending: HashMap<HalfKeyChallenge, PendingEntry>,
    acknowledged: VecDeque<AcknowledgedTicket>,
}

impl Inner {
    fn evict_expired(&mut self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.pending.len();
        self.pending
            .retain(|_, entry| now.duration_since(entry.created_at) < ttl);
        before - self.pending.len()
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest_key) = self
            .pending
            .iter()
            .min_by_key(|(_, entry)| entry.created_at)
            .map(|(k, _)| *k)
        {
            debug!("Pending store full, evicting {}", oldest_key.short_hex());
            self.pending.remove(&oldest_key);
        }
    }
}

/// In-memory `TicketStore` with a TTL and a capacity on pending records
pub struct MemoryTicketStore {
    inner: Mutex<Inner>,
    config: StoreConfig,
}

impl MemoryTicketStore {
    /// Create a new store with default settings
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn acknowledged_count(&self) -> usize {
        self.inner.lock().acknowledged.len()
    }
}

impl Default for MemoryTicketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn store_unacknowledged_ticket(
        &self,
        challenge: HalfKeyChallenge,
        pending: PendingAcknowledgement,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        if inner.pending.len() >= self.config.max_pending {
            inner.evict_expired(self.config.ttl);
        }
        if inner.pending.len() >= self.config.max_pending {
            inner.evict_oldest();
        }

        inner.pending.insert(
            challenge,
            PendingEntry {
                pending,
                created_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn get_unacknowledged_ticket(
        &self,
        challenge: &HalfKeyChallenge,
    ) -> Result<Option<PendingAcknowledgement>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.pending.get(challenge).and_then(|entry| {
            if entry.created_at.elapsed() < self.config.ttl {
                Some(entry.pending.clone())
            } else {
                None
            }
        }))
    }

    async fn mark_resolved(
        &self,
        challenge: &HalfKeyChallenge,
        acknowledged: Option<AcknowledgedTicket>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if inner.pending.remove(challenge).is_none() {
            return Ok(false);
        }
        if let Some(ticket) = acknowledged {
            if inner.acknowledged.len() >= self.config.max_acknowledged.max(1) {
                if let Some(dropped) = inner.acknowledged.pop_front() {
                    warn!(
                        "Acknowledged tickets not redeemed, dropping ticket {}",
                        dropped.ticket.hash().short_hex()
                    );
                }
            }
            inner.acknowledged.push_back(ticket);
        }
        Ok(true)
    }

    async fn acknowledged_tickets(&self) -> Result<Vec<AcknowledgedTicket>, StoreError> {
        Ok(self.inner.lock().acknowledged.iter().cloned().collect())
    }

    async fn take_acknowledged_tickets(&self) -> Result<Vec<AcknowledgedTicket>, StoreError> {
        Ok(self.inner.lock().acknowledged.drain(..).collect())
    }

    async fn prune_expired(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().evict_expired(self.config.ttl))
    }
}

//! Heartbeat
//!
//! Periodically probes every peer that has not been seen for `refresh_time`.
//! Peers that answer are pushed back with a fresh last-seen time; peers that
//! fail are disconnected and blacklisted for good. At most
//! `max_parallel_connections` probes are in flight at any time.

use std::sync::Arc;
use std::time::Duration;

use mixcraft_core::{FixedBytes, PublicKey};
use parking_lot::Mutex;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::peer_store::{duration_millis, now_millis, Entry, NetworkPeerStore};
use crate::transport::{PeerEvent, Transport, TransportError, HEARTBEAT_PROTOCOL};

/// Peers not seen for this long are probed
pub const DEFAULT_REFRESH_TIME: Duration = Duration::from_secs(103);
pub const DEFAULT_CHECK_INTERVAL_LOWER: Duration = Duration::from_secs(41);
pub const DEFAULT_CHECK_INTERVAL_UPPER: Duration = Duration::from_secs(59);
pub const DEFAULT_MAX_PARALLEL_CONNECTIONS: usize = 10;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Heartbeat challenge length in bytes
const CHALLENGE_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub refresh_time: Duration,
    /// Bounds of the uniformly jittered delay between two checks
    pub check_interval_lower: Duration,
    pub check_interval_upper: Duration,
    /// Peers checked at once. A cycle always runs at least one worker.
    pub max_parallel_connections: usize,
    pub probe_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            refresh_time: DEFAULT_REFRESH_TIME,
            check_interval_lower: DEFAULT_CHECK_INTERVAL_LOWER,
            check_interval_upper: DEFAULT_CHECK_INTERVAL_UPPER,
            max_parallel_connections: DEFAULT_MAX_PARALLEL_CONNECTIONS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl HeartbeatConfig {
    /// Random delay until the next check
    pub fn next_check_delay(&self) -> Duration {
        let a = duration_millis(self.check_interval_lower);
        let b = duration_millis(self.check_interval_upper);
        let millis = rand::thread_rng().gen_range(a.min(b)..=a.max(b));
        Duration::from_millis(millis)
    }
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Probe timed out")]
    Timeout,

    #[error("Invalid heartbeat response")]
    InvalidResponse,
}

/// Outcome of one `check_nodes` cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub probed: usize,
    pub alive: usize,
    pub evicted: usize,
}

impl CheckSummary {
    fn merge(&mut self, other: CheckSummary) {
        self.probed += other.probed;
        self.alive += other.alive;
        self.evicted += other.evicted;
    }
}

/// The answer a live node gives to a heartbeat challenge
pub fn heartbeat_response(challenge: &[u8]) -> Vec<u8> {
    Sha256::digest(challenge).to_vec()
}

/// Send a random challenge and expect its SHA-256 back within `timeout`
pub async fn probe_peer(
    transport: &dyn Transport,
    peer: &PublicKey,
    timeout: Duration,
) -> Result<(), ProbeError> {
    let mut challenge = [0u8; CHALLENGE_SIZE];
    rand::thread_rng().fill_bytes(&mut challenge);

    let response = tokio::time::timeout(
        timeout,
        transport.request(peer, HEARTBEAT_PROTOCOL, challenge.to_vec()),
    )
    .await
    .map_err(|_| ProbeError::Timeout)??;

    if response != heartbeat_response(&challenge) {
        return Err(ProbeError::InvalidResponse);
    }
    Ok(())
}

/// Answer heartbeat challenges. A peer that probes us is alive, so it is
/// pushed into `store` as well.
pub fn spawn_heartbeat_responder(
    transport: Arc<dyn Transport>,
    store: Arc<NetworkPeerStore>,
) -> JoinHandle<()> {
    let mut inbound = transport.subscribe(HEARTBEAT_PROTOCOL);

    tokio::spawn(async move {
        while let Some(msg) = inbound.recv().await {
            store.push(msg.sender, now_millis());
            let response = heartbeat_response(&msg.payload);
            if !msg.respond(response) {
                debug!("Heartbeat requester went away before our response");
            }
        }
    })
}

/// Probe `first`, then keep pulling stale peers until none remain
async fn run_worker(
    transport: Arc<dyn Transport>,
    store: Arc<NetworkPeerStore>,
    first: Entry,
    threshold: u64,
    timeout: Duration,
) -> CheckSummary {
    let mut summary = CheckSummary::default();
    let mut current = Some(first);

    while let Some(entry) = current {
        summary.probed += 1;

        match probe_peer(transport.as_ref(), &entry.id, timeout).await {
            Ok(()) => {
                store.push(entry.id, now_millis());
                summary.alive += 1;
            }
            Err(e) => {
                transport.hang_up(&entry.id).await;
                store.blacklist_peer(&entry.id);
                summary.evicted += 1;
                info!("Evicted peer {}: {}", entry.id.short_hex(), e);
            }
        }

        current = store.pop_stale(threshold);
    }

    summary
}

/// Heartbeat prober for one node
pub struct Heartbeat {
    transport: Arc<dyn Transport>,
    store: Arc<NetworkPeerStore>,
    config: HeartbeatConfig,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    /// Connection listener and responder; aborted on stop
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Heartbeat {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<NetworkPeerStore>,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            transport,
            store,
            config,
            shutdown_tx: Mutex::new(None),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<NetworkPeerStore> {
        &self.store
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.lock().is_some()
    }

    /// Run one probing cycle over every stale peer
    pub async fn check_nodes(&self) -> CheckSummary {
        let refresh = duration_millis(self.config.refresh_time);
        let threshold = now_millis().saturating_sub(refresh);
        debug!("Checking nodes ({} known)", self.store.len());

        let mut workers = JoinSet::new();
        for _ in 0..self.config.max_parallel_connections.max(1) {
            let Some(first) = self.store.pop_stale(threshold) else {
                break;
            };
            workers.spawn(run_worker(
                self.transport.clone(),
                self.store.clone(),
                first,
                threshold,
                self.config.probe_timeout,
            ));
        }

        let mut summary = CheckSummary::default();
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(worker_summary) => summary.merge(worker_summary),
                Err(e) => warn!("Heartbeat worker failed: {}", e),
            }
        }

        summary
    }

    /// Start the timer loop, the connection listener and the responder
    pub fn start(self: &Arc<Self>) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        {
            let mut guard = self.shutdown_tx.lock();
            if guard.is_some() {
                return;
            }
            *guard = Some(shutdown_tx);
        }

        let listener = self.spawn_connection_listener();
        let responder = spawn_heartbeat_responder(self.transport.clone(), self.store.clone());
        self.background.lock().extend([listener, responder]);

        let heartbeat = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let delay = heartbeat.config.next_check_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        let summary = heartbeat.check_nodes().await;
                        debug!(
                            "Heartbeat cycle: {} probed, {} alive, {} evicted",
                            summary.probed, summary.alive, summary.evicted
                        );
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        info!("Heartbeat mechanism started");
    }

    /// Cancel the timer. A cycle already in flight runs to completion.
    pub async fn stop(&self) {
        let shutdown_tx = self.shutdown_tx.lock().take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(()).await;
        }

        let background = std::mem::take(&mut *self.background.lock());
        for task in background {
            task.abort();
        }

        info!("Heartbeat mechanism stopped");
    }

    fn spawn_connection_listener(&self) -> JoinHandle<()> {
        let mut events = self.transport.peer_events();
        let store = self.store.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let PeerEvent::Connected(peer) = event {
                    if store.push(peer, now_millis()) {
                        debug!("Peer connected: {}", peer.short_hex());
                    }
                }
            }
        })
    }
}

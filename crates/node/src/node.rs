//! Node lifecycle

use std::sync::Arc;
use std::time::Duration;

use mixcraft_core::{AcknowledgedTicket, PathHop, PublicKey, TicketSummary};
use mixcraft_crypto::Identity;
use mixcraft_network::{CheckSummary, Heartbeat, NetworkPeerStore, Transport};
use mixcraft_packet::{
    AcknowledgementEvent, AcknowledgementInteraction, DeliveredMessage, ForwardOutcome,
    MemoryTicketStore, PacketForwardInteraction, TicketIssuer, TicketStore,
};
use mixcraft_settings::Settings;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{NodeError, Result};

const MIN_PRUNE_INTERVAL: Duration = Duration::from_secs(1);
const MIN_CHANNEL_CAPACITY: usize = 1;

/// One relay identity bound to a transport
pub struct Node {
    identity: Arc<Identity>,
    transport: Arc<dyn Transport>,
    ticket_store: Arc<dyn TicketStore>,
    heartbeat: Arc<Heartbeat>,
    forward: Arc<PacketForwardInteraction>,
    acknowledgements: Arc<AcknowledgementInteraction>,
    prune_interval: Duration,

    delivered_rx: Mutex<Option<mpsc::Receiver<DeliveredMessage>>>,
    events_rx: Mutex<Option<mpsc::Receiver<AcknowledgementEvent>>>,
    /// Interaction subscriptions and the maintenance loop; `None` when stopped
    tasks: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl Node {
    /// Create a node with an in-memory ticket store
    pub fn new(identity: Identity, transport: Arc<dyn Transport>, settings: &Settings) -> Self {
        let store = Arc::new(MemoryTicketStore::with_config(settings.store_config()));
        Self::with_store(identity, transport, store, settings)
    }

    pub fn with_store(
        identity: Identity,
        transport: Arc<dyn Transport>,
        ticket_store: Arc<dyn TicketStore>,
        settings: &Settings,
    ) -> Self {
        let identity = Arc::new(identity);
        let issuer = Arc::new(TicketIssuer::new(settings.ticket_config()));
        let capacity = settings.node.channel_capacity.max(MIN_CHANNEL_CAPACITY);
        let (delivered_tx, delivered_rx) = mpsc::channel(capacity);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let forward = Arc::new(PacketForwardInteraction::new(
            identity.clone(),
            transport.clone(),
            ticket_store.clone(),
            issuer,
            delivered_tx,
        ));
        let acknowledgements = Arc::new(AcknowledgementInteraction::new(
            ticket_store.clone(),
            transport.clone(),
            events_tx,
        ));
        let heartbeat = Arc::new(Heartbeat::new(
            transport.clone(),
            Arc::new(NetworkPeerStore::new()),
            settings.heartbeat_config(),
        ));

        Self {
            identity,
            transport,
            ticket_store,
            heartbeat,
            forward,
            acknowledgements,
            prune_interval: Duration::from_secs(settings.node.prune_interval_secs)
                .max(MIN_PRUNE_INTERVAL),
            delivered_rx: Mutex::new(Some(delivered_rx)),
            events_rx: Mutex::new(Some(events_rx)),
            tasks: Mutex::new(None),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// How other nodes address us in a path
    pub fn path_hop(&self) -> PathHop {
        self.identity.path_hop()
    }

    pub fn peer_store(&self) -> &Arc<NetworkPeerStore> {
        self.heartbeat.store()
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// Subscribe to inbound packets and acknowledgements and start the
    /// heartbeat and maintenance loops
    pub fn start(&self) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return Err(NodeError::AlreadyRunning);
        }

        let handles = vec![
            self.forward.clone().subscribe(),
            self.acknowledgements.clone().subscribe(),
            self.spawn_maintenance(),
        ];
        self.heartbeat.start();
        *tasks = Some(handles);

        info!("Node {} started", self.identity.public_key());
        Ok(())
    }

    /// Stop every loop. Packets already being processed run to completion.
    pub async fn stop(&self) {
        let Some(tasks) = self.tasks.lock().take() else {
            return;
        };
        for task in tasks {
            task.abort();
        }
        self.heartbeat.stop().await;

        info!("Node {} stopped", self.identity.public_key());
    }

    /// Send `message` along `path`; the last hop is the receiver
    pub async fn send_message(&self, message: &[u8], path: &[PathHop]) -> Result<()> {
        self.forward.send_message(message, path).await?;
        Ok(())
    }

    /// Process one packet directly, bypassing the transport subscription
    pub async fn handle_packet(&self, sender: &PublicKey, bytes: &[u8]) -> ForwardOutcome {
        self.forward.handle_packet(sender, bytes).await
    }

    /// Run one heartbeat cycle now
    pub async fn check_nodes(&self) -> CheckSummary {
        self.heartbeat.check_nodes().await
    }

    /// Messages delivered to us as the final hop. Can be taken once.
    ///
    /// Holds at most `channel_capacity` messages; later ones are dropped
    /// until the receiver catches up.
    pub fn take_incoming(&self) -> Option<mpsc::Receiver<DeliveredMessage>> {
        self.delivered_rx.lock().take()
    }

    /// Resolved acknowledgements. Can be taken once.
    pub fn take_acknowledgement_events(&self) -> Option<mpsc::Receiver<AcknowledgementEvent>> {
        self.events_rx.lock().take()
    }

    pub async fn acknowledged_tickets(&self) -> Result<Vec<AcknowledgedTicket>> {
        Ok(self.ticket_store.acknowledged_tickets().await?)
    }

    /// Hand over every acknowledged ticket for redemption, removing them
    /// from the store
    pub async fn take_acknowledged_tickets(&self) -> Result<Vec<AcknowledgedTicket>> {
        let tickets = self.ticket_store.take_acknowledged_tickets().await?;
        if !tickets.is_empty() {
            info!("Handing over {} acknowledged ticket(s)", tickets.len());
        }
        Ok(tickets)
    }

    pub async fn ticket_summaries(&self) -> Result<Vec<TicketSummary>> {
        let tickets = self.ticket_store.acknowledged_tickets().await?;
        Ok(tickets.iter().map(TicketSummary::from).collect())
    }

    /// Close the connection to a peer
    pub async fn hang_up(&self, peer: &PublicKey) {
        self.transport.hang_up(peer).await;
    }

    fn spawn_maintenance(&self) -> JoinHandle<()> {
        let store = self.ticket_store.clone();
        let period = self.prune_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                match store.prune_expired().await {
                    Ok(0) => {}
                    Ok(pruned) => debug!("Pruned {} expired pending records", pruned),
                    Err(e) => warn!("Pruning pending records failed: {}", e),
                }
            }
        })
    }
}

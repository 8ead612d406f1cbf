//! MixCraft Network
//!
//! The transport boundary and peer liveness management.
//!
//! ## Features
//!
//! - `Transport` trait over which packets, acknowledgements and heartbeats travel
//! - In-memory transport hub for tests and local simulation
//! - Peer store ordered by last-seen time, with a permanent blacklist
//! - Heartbeat prober with a bounded number of concurrent probes

mod heartbeat;
mod memory;
mod peer_store;
mod transport;

pub use heartbeat::{
    heartbeat_response, probe_peer, spawn_heartbeat_responder, CheckSummary, Heartbeat,
    HeartbeatConfig, ProbeError,
};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use peer_store::{now_millis, Entry, NetworkPeerStore};
pub use transport::{
    InboundMessage, PeerEvent, Transport, TransportError, ACK_PROTOCOL, HEARTBEAT_PROTOCOL,
    PACKET_PROTOCOL,
};

//! MixCraft Node
//!
//! Wires one identity's packet forwarding, acknowledgement handling,
//! heartbeat and stores onto a transport.
//!
//! ## Components
//!
//! - **PacketForwardInteraction**: relays and delivers inbound packets
//! - **AcknowledgementInteraction**: resolves pending tickets
//! - **Heartbeat**: probes stale peers and evicts dead ones
//! - **Maintenance**: prunes expired pending records

mod node;

pub use node::Node;

use mixcraft_packet::{PacketError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Already running")]
    AlreadyRunning,

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, NodeError>;

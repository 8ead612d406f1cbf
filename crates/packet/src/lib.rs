//! MixCraft Packet
//!
//! Packet construction and the two interactions every node runs:
//! forwarding packets along their path and resolving acknowledgements.
//!
//! ## Lifecycle of a packet at one hop
//!
//! 1. Peel one onion layer and check the embedded PoR values
//! 2. Final hop: hand the payload to the application
//! 3. Relay: store the ticket it was paid with, then forward a new packet
//! 4. Send the acknowledgement back to the previous hop

mod acknowledgement;
mod error;
mod forward;
mod messages;
mod packet;
mod store;

pub use acknowledgement::{send_acknowledgement, AcknowledgementEvent, AcknowledgementInteraction};
pub use error::{PacketError, Result};
pub use forward::{DeliveredMessage, ForwardOutcome, PacketForwardInteraction};
pub use messages::{Acknowledgement, AcknowledgementChallenge};
pub use packet::{DecodedPacket, Packet, TicketConfig, TicketIssuer, MAX_MESSAGE_SIZE};
pub use store::{MemoryTicketStore, StoreConfig, StoreError, TicketStore};

//! MixCraft Core Types
//!
//! This crate defines the fundamental data structures used throughout MixCraft:
//! fixed-size byte values, payment tickets and the decrypted onion layer.

mod error;
mod onion;
mod ticket;
mod types;

pub use error::*;
pub use onion::*;
pub use ticket::*;
pub use types::*;

pub use primitive_types::U256;

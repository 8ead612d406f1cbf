//! MixCraft Cryptography
//!
//! This crate provides cryptographic primitives for MixCraft: node keys,
//! signatures, per-hop encryption, the proof-of-relay scheme and onion
//! construction.

mod encrypt;
mod keys;
mod onion;
mod por;
mod sign;

pub use encrypt::*;
pub use keys::*;
pub use onion::*;
pub use por::*;
pub use sign::*;

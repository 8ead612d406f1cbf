use std::fmt;

use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use sha2::{Digest, Sha256};

use crate::{CoreError, Result};

/// Shared behaviour of every fixed-width byte value.
///
/// Widths are checked once at construction; afterwards a value is immutable.
pub trait FixedBytes: Sized + Copy {
    /// Encoded width in bytes
    const SIZE: usize;
    /// Type name used in error messages
    const NAME: &'static str;

    /// Borrow the raw bytes
    fn as_slice(&self) -> &[u8];

    /// Build from a slice, failing if its length is not `SIZE`
    fn from_slice(bytes: &[u8]) -> Result<Self>;

    /// Lowercase hex encoding
    fn to_hex(&self) -> String {
        hex::encode(self.as_slice())
    }

    /// First four bytes as hex, for log lines
    fn short_hex(&self) -> String {
        let len = Self::SIZE.min(4);
        hex::encode(&self.as_slice()[..len])
    }

    /// Parse from hex (an optional `0x` prefix is accepted)
    fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $size:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "BigArray")] [u8; $size]);

        impl $name {
            pub const SIZE: usize = $size;

            pub const fn new(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }

            pub fn to_bytes(&self) -> [u8; $size] {
                self.0
            }
        }

        impl FixedBytes for $name {
            const SIZE: usize = $size;
            const NAME: &'static str = stringify!($name);

            fn as_slice(&self) -> &[u8] {
                &self.0
            }

            fn from_slice(bytes: &[u8]) -> Result<Self> {
                let arr: [u8; $size] = bytes.try_into().map_err(|_| CoreError::InvalidLength {
                    name: stringify!($name),
                    expected: $size,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }
        }

        impl From<[u8; $size]> for $name {
            fn from(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = CoreError;

            fn try_from(bytes: &[u8]) -> Result<Self> {
                <Self as FixedBytes>::from_slice(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }
    };
}

fixed_bytes!(
    /// Ed25519 public key identifying a node on the transport
    PublicKey,
    32
);

fixed_bytes!(
    /// On-chain account address: trailing 20 bytes of SHA-256(public key)
    Address,
    20
);

fixed_bytes!(
    /// 32-byte SHA-256 digest
    Hash,
    32
);

fixed_bytes!(
    /// Half-key share: a canonical scalar revealed by acknowledgements
    HalfKey,
    32
);

fixed_bytes!(
    /// Commitment to a half-key share (compressed curve point)
    HalfKeyChallenge,
    32
);

fixed_bytes!(
    /// Ticket challenge: commitment to the sum of two half-key shares
    Challenge,
    32
);

fixed_bytes!(
    /// Ed25519 signature
    Signature,
    64
);

impl Address {
    /// Derive the account address of a public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = Hash::create(&[public_key.as_slice()]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest.as_bytes()[12..]);
        Self(addr)
    }
}

impl PublicKey {
    pub fn to_address(&self) -> Address {
        Address::from_public_key(self)
    }
}

impl Hash {
    /// SHA-256 over the concatenation of `parts`
    pub fn create(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }
}

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Content hash of a stored blob.
///
/// A `Hash` is the BLAKE3 digest of a blob's canonical bytes and is the only
/// key the object store accepts. Identical bytes always produce the same
/// `Hash`, so blobs are deduplicated and verifiable on receipt.
///
/// In binary encodings a hash is written as its 32 raw bytes; human-readable
/// formats (JSON, TOML) use lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Digest length in bytes.
    pub const LEN: usize = 32;

    const NULL: [u8; Self::LEN] = [0u8; Self::LEN];

    /// BLAKE3 digest of `data`, i.e. the store key `data` would be put under.
    pub fn sum(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap a digest computed elsewhere. No hashing happens.
    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// The all-zero digest, reserved for an unset pointer.
    pub const fn null() -> Self {
        Self(Self::NULL)
    }

    pub fn is_null(&self) -> bool {
        self.0 == Self::NULL
    }

    /// Whether `data` is the blob this hash addresses.
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::sum(data) == *self
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Full 64-character lowercase hex digest, as used in store paths.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First four digest bytes in hex; enough to tell blobs apart in logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse the output of [`to_hex`](Self::to_hex). Anything other than
    /// exactly 32 hex-encoded bytes is rejected.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        <[u8; Self::LEN]>::try_from(bytes.as_slice())
            .map(Self)
            .map_err(|_| TypeError::InvalidLength {
                expected: Self::LEN,
                actual: bytes.len(),
            })
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; 32] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

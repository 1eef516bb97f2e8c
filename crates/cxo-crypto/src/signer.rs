use std::fmt;

use cxo_types::Hash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ed25519 secret key of a root owner.
///
/// Holding the secret key is what makes a root editable.
#[derive(Clone)]
pub struct SecretKey(ed25519_dalek::SigningKey);

/// Ed25519 public key identifying a root owner (a "feed").
///
/// Stored as validated raw bytes so it can key maps and be ordered.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

/// Ed25519 signature over the hash of an encoded root.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "signature_serde")] ed25519_dalek::Signature);

/// Generate a fresh random key pair.
pub fn generate_key_pair() -> (PublicKey, SecretKey) {
    let sk = SecretKey::generate();
    (sk.public_key(), sk)
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    /// Returns `true` if this secret key is the other half of `pk`.
    pub fn matches(&self, pk: &PublicKey) -> bool {
        self.public_key() == *pk
    }

    /// Sign a content hash.
    pub fn sign_hash(&self, hash: &Hash) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.0.sign(hash.as_bytes()))
    }

    /// Raw secret key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl PublicKey {
    /// Length of a public key in bytes.
    pub const LEN: usize = 32;

    /// Create from raw bytes, rejecting bytes that are not a valid curve point.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignatureError> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes).map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s).map_err(|_| SignatureError::InvalidKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::InvalidKey)?;
        Self::from_bytes(arr)
    }

    /// Verify a signature over a content hash.
    pub fn verify_hash(&self, hash: &Hash, signature: &Signature) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| SignatureError::InvalidKey)?;
        key.verify(hash.as_bytes(), &signature.0)
            .map_err(|_| SignatureError::InvalidSignature)
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl Signature {
    /// Length of a signature in bytes.
    pub const LEN: usize = 64;

    /// Create from raw 64-byte signature.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(&bytes))
    }

    /// Raw signature bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<redacted>)")
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0.to_bytes()[..8]))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; 32]>::deserialize(deserializer)?;
            Self::from_bytes(bytes).map_err(serde::de::Error::custom)
        }
    }
}

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid key")]
    InvalidKey,
}

mod signature_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(sig: &ed25519_dalek::Signature, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&sig.to_bytes())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ed25519_dalek::Signature, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 64-byte signature"))?;
        Ok(ed25519_dalek::Signature::from_bytes(&arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let (pk, sk) = generate_key_pair();
        let hash = Hash::sum(b"hello world");
        let sig = sk.sign_hash(&hash);
        assert!(pk.verify_hash(&hash, &sig).is_ok());
    }

    #[test]
    fn verify_fails_on_wrong_hash() {
        let (pk, sk) = generate_key_pair();
        let sig = sk.sign_hash(&Hash::sum(b"correct"));
        assert_eq!(
            pk.verify_hash(&Hash::sum(b"wrong"), &sig),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let (_, sk1) = generate_key_pair();
        let (pk2, _) = generate_key_pair();
        let hash = Hash::sum(b"message");
        let sig = sk1.sign_hash(&hash);
        assert!(pk2.verify_hash(&hash, &sig).is_err());
    }

    #[test]
    fn flipped_signature_byte_fails() {
        let (pk, sk) = generate_key_pair();
        let hash = Hash::sum(b"root body");
        let mut bytes = sk.sign_hash(&hash).to_bytes();
        bytes[10] ^= 0x01;
        let forged = Signature::from_bytes(bytes);
        assert!(pk.verify_hash(&hash, &forged).is_err());
    }

    #[test]
    fn secret_key_matches_its_public_key() {
        let (pk1, sk1) = generate_key_pair();
        let (pk2, _) = generate_key_pair();
        assert!(sk1.matches(&pk1));
        assert!(!sk1.matches(&pk2));
    }

    #[test]
    fn from_bytes_roundtrip() {
        let sk = SecretKey::generate();
        let sk2 = SecretKey::from_bytes(*sk.as_bytes());
        assert_eq!(sk.public_key(), sk2.public_key());
    }

    #[test]
    fn public_key_hex_and_binary_forms() {
        let (pk, _) = generate_key_pair();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_hex()));
        assert_eq!(serde_json::from_str::<PublicKey>(&json).unwrap(), pk);

        let bin = bincode::serialize(&pk).unwrap();
        assert_eq!(bin.len(), PublicKey::LEN);
        assert_eq!(bincode::deserialize::<PublicKey>(&bin).unwrap(), pk);
    }

    #[test]
    fn signature_serde_roundtrip() {
        let sk = SecretKey::generate();
        let sig = sk.sign_hash(&Hash::sum(b"test"));
        let bin = bincode::serialize(&sig).unwrap();
        let parsed: Signature = bincode::deserialize(&bin).unwrap();
        assert_eq!(sig, parsed);
    }

    #[test]
    fn debug_redacts_secret_key() {
        let sk = SecretKey::generate();
        assert!(format!("{sk:?}").contains("redacted"));
    }
}

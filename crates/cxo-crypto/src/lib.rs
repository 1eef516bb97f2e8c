//! Cryptographic primitives for the CXO object store.
//!
//! Provides Ed25519 owner keys and signatures for roots, and verification of
//! the `Seq`/`PrevHash` links that chain one owner's roots together.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod chain;
pub mod signer;

pub use chain::{ChainError, ChainLink, ChainVerifier};
pub use signer::{generate_key_pair, PublicKey, SecretKey, Signature, SignatureError};

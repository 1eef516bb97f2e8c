//! Error taxonomy for roots and the container.

use cxo_schema::SchemaError;
use cxo_store::StoreError;
use cxo_types::{Hash, RegistryReference};

/// Errors from root construction, finalization, ingestion and graph walks.
///
/// Every error is returned to the immediate caller; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum RootError {
    /// The requested object or root is not stored locally.
    #[error("not found: {0}")]
    NotFound(Hash),

    /// A root signature does not verify against its owner key.
    #[error("invalid signature")]
    InvalidSignature,

    /// A root does not extend the local chain of its owner.
    #[error("invalid chain at seq {seq}: {reason}")]
    InvalidChain { seq: u64, reason: String },

    /// Offered bytes do not hash to the claimed key.
    #[error("forged content: claimed {claimed}, computed {computed}")]
    ForgedContent { claimed: Hash, computed: Hash },

    /// Registration was attempted on a sealed registry.
    #[error("registry is sealed")]
    AlreadySealed,

    /// A mutating operation was attempted on a read-only root.
    #[error("root is read-only")]
    ReadOnly,

    /// The root's registry is not known to this container.
    #[error("registry not found: {0:?}")]
    RegistryNotFound(RegistryReference),

    /// No schema is registered under this name.
    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    /// The secret key does not belong to the public key.
    #[error("secret key does not match public key")]
    InvalidKeyPair,

    /// An object exceeds the configured size limit.
    #[error("object of {size} bytes exceeds limit of {limit}")]
    ObjectTooLarge { size: u64, limit: u64 },

    /// A root body or object could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Storage backend failure.
    #[error("store error: {0}")]
    Store(StoreError),

    /// Schema or codec failure not covered by a dedicated variant.
    #[error("schema error: {0}")]
    Schema(SchemaError),

    /// A lock guarding container state was poisoned.
    #[error("container lock poisoned")]
    LockPoisoned,
}

impl From<StoreError> for RootError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(hash) => RootError::NotFound(hash),
            StoreError::ForgedContent { claimed, computed } => {
                RootError::ForgedContent { claimed, computed }
            }
            other => RootError::Store(other),
        }
    }
}

impl From<SchemaError> for RootError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::AlreadySealed => RootError::AlreadySealed,
            SchemaError::SchemaNotFound(name) => RootError::SchemaNotFound(name),
            SchemaError::SchemaRefNotFound(reference) => {
                RootError::SchemaNotFound(reference.hash().to_hex())
            }
            SchemaError::Decode(reason) => RootError::Decode(reason),
            other => RootError::Schema(other),
        }
    }
}

/// Convenience alias for root and container results.
pub type RootResult<T> = Result<T, RootError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cxo_types::SchemaReference;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let hash = Hash::sum(b"x");
        assert!(matches!(
            RootError::from(StoreError::NotFound(hash)),
            RootError::NotFound(h) if h == hash
        ));
        assert!(matches!(
            RootError::from(StoreError::ForgedContent { claimed: hash, computed: hash }),
            RootError::ForgedContent { .. }
        ));
        assert!(matches!(
            RootError::from(StoreError::LockPoisoned),
            RootError::Store(_)
        ));
    }

    #[test]
    fn schema_errors_map_to_taxonomy() {
        assert!(matches!(
            RootError::from(SchemaError::AlreadySealed),
            RootError::AlreadySealed
        ));
        assert!(matches!(
            RootError::from(SchemaError::SchemaNotFound("cxo.User".into())),
            RootError::SchemaNotFound(ref n) if n == "cxo.User"
        ));
        let reference = SchemaReference(Hash::sum(b"schema"));
        assert!(matches!(
            RootError::from(SchemaError::SchemaRefNotFound(reference)),
            RootError::SchemaNotFound(ref n) if *n == reference.hash().to_hex()
        ));
        assert!(matches!(
            RootError::from(SchemaError::InvalidType("struct without fields".into())),
            RootError::Schema(SchemaError::InvalidType(_))
        ));
    }
}

//! Error types for schemas, the codec and the registry.

use cxo_types::SchemaReference;

/// Errors from schema registration, lookup and value encoding.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Registration was attempted on a sealed registry.
    #[error("registry is sealed")]
    AlreadySealed,

    /// The operation needs a sealed registry.
    #[error("registry is not sealed")]
    NotSealed,

    /// No schema is registered under this name.
    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    /// No schema has this reference.
    #[error("schema not found: {0:?}")]
    SchemaRefNotFound(SchemaReference),

    /// A name was registered twice.
    #[error("duplicate schema name: {0}")]
    DuplicateName(String),

    /// Schema names must be non-empty.
    #[error("invalid schema name: {0:?}")]
    InvalidName(String),

    /// A type that cannot be decoded safely: too deeply nested, or a
    /// struct with no fields.
    #[error("invalid field type: {0}")]
    InvalidType(String),

    /// A typed reference names a schema the registry does not contain.
    #[error("schema {schema} references unknown schema {target}")]
    UnresolvedReference {
        /// The schema containing the reference.
        schema: String,
        /// The missing target name.
        target: String,
    },

    /// Bytes do not decode under the schema they claim.
    #[error("value does not match schema {schema}: {reason}")]
    Mismatch { schema: String, reason: String },

    /// Serialization failure.
    #[error("encode error: {0}")]
    Encode(String),

    /// Deserialization failure.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Convenience alias for schema results.
pub type SchemaResult<T> = Result<T, SchemaError>;

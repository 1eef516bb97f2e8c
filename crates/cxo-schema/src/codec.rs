//! Canonical binary encoding.
//!
//! Every blob, schema, registry and root body is encoded with one fixed
//! bincode configuration: fixed-width little-endian integers, `u64` length
//! prefixes, and trailing bytes rejected. With those options a value has
//! exactly one encoding, which is what makes its hash an identity.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{SchemaError, SchemaResult};
use crate::schema::FieldType;
use crate::value::{Value, ValueSeed};

/// Upper bound on any single encoded value.
pub const MAX_ENCODED_SIZE: u64 = 64 * 1024 * 1024;

pub(crate) fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_ENCODED_SIZE)
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Encode a value to its canonical bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> SchemaResult<Vec<u8>> {
    options()
        .serialize(value)
        .map_err(|e| SchemaError::Encode(e.to_string()))
}

/// Decode a typed value from canonical bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> SchemaResult<T> {
    options()
        .deserialize(bytes)
        .map_err(|e| SchemaError::Decode(e.to_string()))
}

/// Decode bytes into a generic [`Value`] driven by `ty`.
///
/// `ty` must pass [`FieldType::validate`]; otherwise decoding could recurse
/// without bound or materialize elements that occupy no input.
pub fn decode_value(bytes: &[u8], ty: &FieldType) -> SchemaResult<Value> {
    ty.validate()?;
    options()
        .deserialize_seed(ValueSeed::new(ty), bytes)
        .map_err(|e| SchemaError::Decode(e.to_string()))
}

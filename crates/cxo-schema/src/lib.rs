//! Schemas and the schema registry for the CXO object store.
//!
//! Stored blobs are untyped bytes. A [`Schema`] gives them meaning: it names
//! a structural [`FieldType`] whose reference-typed fields say which other
//! blobs a value points at. Schemas are collected into a [`Registry`] which,
//! once sealed with [`Registry::done`], is immutable and content-addressed
//! by its [`RegistryReference`](cxo_types::RegistryReference).
//!
//! Decoding is table-driven: [`codec::decode_value`] walks a `FieldType`
//! and produces a generic [`Value`] tree without any compile-time knowledge
//! of the type. Typed values implement [`Schematic`] and go through serde,
//! producing byte-identical encodings.

pub mod codec;
pub mod error;
pub mod registry;
pub mod schema;
pub mod value;

pub use codec::{decode, decode_value, encode};
pub use error::{SchemaError, SchemaResult};
pub use registry::Registry;
pub use schema::{Field, FieldType, Schema, Schematic, MAX_TYPE_DEPTH};
pub use value::Value;

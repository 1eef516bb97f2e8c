//! Foundation types for the CXO object store.
//!
//! Every other CXO crate depends on `cxo-types`. It defines the content hash
//! that identifies every stored blob and the typed pointers that link blobs
//! into object graphs.
//!
//! # Key Types
//!
//! - [`Hash`]: BLAKE3 digest of a blob's canonical bytes
//! - [`Reference`]: pointer to a single stored blob
//! - [`References`]: pointer to a stored, ordered list of references
//! - [`Dynamic`]: self-describing pointer: schema reference + object reference
//! - [`SchemaReference`] / [`RegistryReference`]: hashes of a schema / a sealed registry

pub mod error;
pub mod hash;
pub mod reference;

pub use error::TypeError;
pub use hash::Hash;
pub use reference::{Dynamic, Reference, References, RegistryReference, SchemaReference};

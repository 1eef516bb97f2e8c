//! Content-addressed storage for the CXO object store.
//!
//! Two stores live here:
//!
//! - [`ObjectStore`] -- immutable blobs keyed by the [`Hash`](cxo_types::Hash)
//!   of their bytes. There is no update or delete; changing content changes
//!   identity.
//! - [`RootStore`] -- signed [`RootPack`]s keyed by (owner key, seq), with a
//!   "latest seq" pointer per owner.
//!
//! # Storage Backends
//!
//! - [`InMemoryObjectStore`] / [`InMemoryRootStore`] -- `HashMap`-based, for
//!   tests and embedding
//! - [`FileObjectStore`] / [`FileRootStore`] -- one file per blob or pack,
//!   written to a temporary file and atomically renamed into place
//!
//! # Design Rules
//!
//! 1. `hash(bytes) == key` for every stored blob; a blob is never stored or
//!    returned under a mismatched key.
//! 2. Writes are atomic per blob: readers see the whole blob or nothing.
//! 3. Concurrent reads are always safe (blobs are immutable).
//! 4. The store never interprets blob contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod pack;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::{FileObjectStore, FileRootStore, FileStoreOptions};
pub use memory::{InMemoryObjectStore, InMemoryRootStore};
pub use pack::RootPack;
pub use traits::{ObjectStore, RootStore};

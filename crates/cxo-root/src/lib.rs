//! Signed root chains and the object container.
//!
//! A [`Container`] owns an object store, the schema registries it knows and
//! one append-only chain of signed roots per owner key. Owners build roots
//! through [`EditableRoot`]; everyone else sees [`ReadOnlyRoot`]s received
//! through [`Container::set_encoded_root`].
//!
//! # Graph queries
//!
//! Roots point at objects through [`Dynamic`](cxo_types::Dynamic)
//! references, objects point at each other through typed references. The
//! same walk answers three questions about a root:
//!
//! - [`ReadOnlyRoot::is_full`] -- is everything reachable stored locally?
//! - [`ReadOnlyRoot::want_func`] -- which reachable hashes are missing?
//! - [`ReadOnlyRoot::got_func`] -- which reachable hashes are present?
//!
//! Outer layers drive a container only through the [`Exchange`] trait.

pub mod body;
pub mod config;
pub mod container;
pub mod error;
pub mod exchange;
mod keylock;
pub mod root;
mod walker;

pub use body::RootBody;
pub use config::ContainerConfig;
pub use container::Container;
pub use error::{RootError, RootResult};
pub use exchange::Exchange;
pub use root::{EditableRoot, ReadOnlyRoot, Root};

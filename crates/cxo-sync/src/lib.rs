//! Pull-based synchronization for CXO containers.
//!
//! A [`Puller`] asks a [`RemoteTransport`] for a feed's newest root, hands
//! it to the local container, then repeatedly requests whatever the root
//! still needs until the local graph is complete or the remote stops
//! delivering. Everything received goes through the container's
//! [`Exchange`](cxo_root::Exchange) interface, so roots are checked by
//! signature and chain link and objects by hash before they are stored.

pub mod error;
pub mod negotiation;
pub mod puller;
pub mod transport;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use negotiation::NegotiationEngine;
pub use puller::Puller;
pub use transport::{ContainerTransport, RemoteTransport};
pub use types::{Negotiation, PullResult, SyncConfig};

use async_trait::async_trait;
use bytes::Bytes;
use cxo_crypto::PublicKey;
use cxo_root::{Container, RootError};
use cxo_store::RootPack;
use cxo_types::Hash;

use crate::error::{SyncError, SyncResult};

/// Transport interface for a remote peer.
///
/// Nothing a transport returns is trusted: the puller verifies every root
/// and object before storing it.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Feeds the remote holds roots for.
    async fn list_feeds(&self) -> SyncResult<Vec<PublicKey>>;
    /// The remote's newest root pack for `feed`.
    async fn latest_root(&self, feed: &PublicKey) -> SyncResult<Option<RootPack>>;
    /// Objects for the requested hashes. Hashes the remote lacks are
    /// omitted from the result.
    async fn fetch_objects(&self, wants: &[Hash]) -> SyncResult<Vec<(Hash, Bytes)>>;
}

/// Serves a local [`Container`] as a remote. Used for in-process peers.
#[derive(Clone, Debug)]
pub struct ContainerTransport {
    container: Container,
}

impl ContainerTransport {
    pub fn new(container: Container) -> Self {
        Self { container }
    }
}

fn remote(err: RootError) -> SyncError {
    SyncError::RemoteError(err.to_string())
}

#[async_trait]
impl RemoteTransport for ContainerTransport {
    async fn list_feeds(&self) -> SyncResult<Vec<PublicKey>> {
        self.container.feeds().map_err(remote)
    }

    async fn latest_root(&self, feed: &PublicKey) -> SyncResult<Option<RootPack>> {
        self.container.last_pack(feed).map_err(remote)
    }

    async fn fetch_objects(&self, wants: &[Hash]) -> SyncResult<Vec<(Hash, Bytes)>> {
        let mut objects = Vec::with_capacity(wants.len());
        for hash in wants {
            match self.container.get_object(hash) {
                Ok(data) => objects.push((*hash, data)),
                Err(RootError::NotFound(_)) => {}
                Err(e) => return Err(remote(e)),
            }
        }
        Ok(objects)
    }
}

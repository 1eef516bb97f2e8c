use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cxo_crypto::PublicKey;
use cxo_root::Exchange;
use cxo_types::Hash;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::negotiation::NegotiationEngine;
use crate::transport::RemoteTransport;
use crate::types::{PullResult, SyncConfig};

/// Drives local roots to completeness from one remote.
pub struct Puller<T: RemoteTransport> {
    transport: T,
    local: Arc<dyn Exchange>,
    config: SyncConfig,
}

impl<T: RemoteTransport> Puller<T> {
    pub fn new(transport: T, local: Arc<dyn Exchange>, config: SyncConfig) -> Self {
        Self {
            transport,
            local,
            config,
        }
    }

    async fn timed<F, R>(&self, fut: F) -> SyncResult<R>
    where
        F: Future<Output = SyncResult<R>>,
    {
        let ms = self.config.request_timeout_ms;
        tokio::time::timeout(Duration::from_millis(ms), fut)
            .await
            .map_err(|_| SyncError::Timeout(ms))?
    }

    /// Pull the remote's newest root for `feed` and every object it needs.
    ///
    /// Stops when the local head is full, when the remote stops delivering
    /// what is wanted, or after `max_rounds`.
    pub async fn pull(&self, feed: &PublicKey) -> SyncResult<PullResult> {
        let pack = self
            .timed(self.transport.latest_root(feed))
            .await?
            .ok_or(SyncError::NoRoot(*feed))?;
        if pack.public_key != *feed {
            return Err(SyncError::WrongFeed {
                expected: *feed,
                got: pack.public_key,
            });
        }
        let accepted = self.local.submit_root(feed, &pack.root, &pack.sig)?;
        let mut result = PullResult::new(*feed, pack.seq, accepted);
        debug!(feed = %feed.short_hex(), seq = pack.seq, accepted, "remote root offered");

        let mut requested: HashSet<Hash> = HashSet::new();
        while result.rounds < self.config.max_rounds {
            let negotiation = NegotiationEngine::negotiate(self.local.as_ref(), feed, &requested)?;
            if negotiation.wants.is_empty() {
                result.unavailable = negotiation.unavailable;
                break;
            }
            result.rounds += 1;

            for batch in negotiation.wants.chunks(self.config.batch_size.max(1)) {
                requested.extend(batch.iter().copied());
                let objects = self.timed(self.transport.fetch_objects(batch)).await?;
                for (hash, data) in objects {
                    if !batch.contains(&hash) {
                        return Err(SyncError::Unrequested(hash));
                    }
                    self.local.put_object(&hash, &data)?;
                    result.objects_received += 1;
                    result.bytes_transferred += data.len() as u64;
                }
            }
        }

        result.complete = self.local.enumerate_wanted(feed)?.is_empty()
            && self.local.latest_pack(feed)?.is_some();
        if result.complete {
            info!(
                feed = %feed.short_hex(),
                seq = result.seq,
                objects = result.objects_received,
                rounds = result.rounds,
                "pulled feed"
            );
        } else {
            warn!(
                feed = %feed.short_hex(),
                seq = result.seq,
                unavailable = result.unavailable.len(),
                rounds = result.rounds,
                "pull ended incomplete"
            );
        }
        Ok(result)
    }

    /// Pull every feed the remote advertises.
    pub async fn pull_all(&self) -> SyncResult<Vec<PullResult>> {
        let feeds = self.timed(self.transport.list_feeds()).await?;
        let mut results = Vec::with_capacity(feeds.len());
        for feed in feeds {
            results.push(self.pull(&feed).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ContainerTransport;
    use async_trait::async_trait;
    use bytes::Bytes;
    use cxo_crypto::SecretKey;
    use cxo_root::{Container, RootError};
    use cxo_schema::{FieldType, Registry, Schematic};
    use cxo_store::RootPack;
    use cxo_types::References;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: u32,
        friends: References,
    }

    impl Schematic for User {
        fn field_type() -> FieldType {
            FieldType::structure([
                ("name", String::field_type()),
                ("age", u32::field_type()),
                ("friends", FieldType::references_to("User")),
            ])
        }
    }

    fn core() -> Registry {
        let mut reg = Registry::new();
        reg.register::<User>("User").unwrap();
        reg
    }

    /// A container holding a three-root chain whose head references a
    /// chain of friends lists.
    fn populated() -> (Container, PublicKey) {
        let cont = Container::in_memory(core()).unwrap();
        let sk = SecretKey::generate();
        let pk = sk.public_key();
        let mut root = cont.new_root(pk, sk).unwrap();
        root.touch().unwrap();
        let mut friends = root.save_array::<User>(&[]).unwrap();
        for i in 0..5u32 {
            let user = User {
                name: format!("user-{i}"),
                age: i,
                friends,
            };
            friends = root.save_array(&[user]).unwrap();
        }
        root.inject(
            "User",
            &User {
                name: "Alice".into(),
                age: 20,
                friends,
            },
        )
        .unwrap();
        root.touch().unwrap();
        (cont, pk)
    }

    fn local() -> Container {
        Container::in_memory(core()).unwrap()
    }

    #[tokio::test]
    async fn pull_completes_graph() {
        let (remote, pk) = populated();
        let local = local();
        let puller = Puller::new(
            ContainerTransport::new(remote.clone()),
            Arc::new(local.clone()),
            SyncConfig::default(),
        );

        let result = puller.pull(&pk).await.unwrap();
        assert!(result.root_accepted);
        assert!(result.complete);
        assert_eq!(result.seq, 2);
        assert!(result.unavailable.is_empty());
        assert!(result.rounds > 1);

        let head = local.last_root(&pk).unwrap().unwrap();
        assert!(head.is_full().unwrap());
        assert_eq!(
            local.enumerate_available(&pk).unwrap(),
            remote.enumerate_available(&pk).unwrap()
        );

        let again = puller.pull(&pk).await.unwrap();
        assert!(!again.root_accepted);
        assert!(again.complete);
        assert_eq!(again.objects_received, 0);
    }

    #[tokio::test]
    async fn unknown_registry_is_fetched_with_the_graph() {
        let (remote, pk) = populated();
        let mut notes = Registry::new();
        notes.register::<String>("Note").unwrap();
        let local = Container::in_memory(notes).unwrap();
        let puller = Puller::new(
            ContainerTransport::new(remote.clone()),
            Arc::new(local.clone()),
            SyncConfig::default(),
        );

        let result = puller.pull(&pk).await.unwrap();
        assert!(result.complete);
        let head = local.last_root(&pk).unwrap().unwrap();
        assert!(head.has_registry());
        assert_eq!(head.registry_reference(), remote.core_registry().reference().unwrap());
        assert_eq!(head.values().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn small_batches_still_complete() {
        let (remote, pk) = populated();
        let config = SyncConfig {
            batch_size: 1,
            ..SyncConfig::default()
        };
        let puller = Puller::new(ContainerTransport::new(remote), Arc::new(local()), config);
        assert!(puller.pull(&pk).await.unwrap().complete);
    }

    #[tokio::test]
    async fn round_limit_leaves_pull_incomplete() {
        let (remote, pk) = populated();
        let config = SyncConfig {
            max_rounds: 1,
            ..SyncConfig::default()
        };
        let puller = Puller::new(ContainerTransport::new(remote), Arc::new(local()), config);
        let result = puller.pull(&pk).await.unwrap();
        assert!(!result.complete);
        assert_eq!(result.rounds, 1);
    }

    #[tokio::test]
    async fn unknown_feed_is_no_root() {
        let (remote, _) = populated();
        let puller = Puller::new(
            ContainerTransport::new(remote),
            Arc::new(local()),
            SyncConfig::default(),
        );
        let stranger = SecretKey::generate().public_key();
        assert!(matches!(
            puller.pull(&stranger).await,
            Err(SyncError::NoRoot(_))
        ));
    }

    #[tokio::test]
    async fn pull_all_covers_every_feed() {
        let (remote, a) = populated();
        let sk = SecretKey::generate();
        let mut other = remote.new_root(sk.public_key(), sk.clone()).unwrap();
        other.touch().unwrap();

        let local = local();
        let puller = Puller::new(
            ContainerTransport::new(remote),
            Arc::new(local.clone()),
            SyncConfig::default(),
        );
        let results = puller.pull_all().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.complete));
        let mut feeds = vec![a, sk.public_key()];
        feeds.sort();
        assert_eq!(local.feeds().unwrap(), feeds);
    }

    // -----------------------------------------------------------------------
    // Misbehaving remotes
    // -----------------------------------------------------------------------

    /// Serves the real root but lies about object contents.
    struct LyingTransport {
        inner: ContainerTransport,
    }

    #[async_trait]
    impl RemoteTransport for LyingTransport {
        async fn list_feeds(&self) -> SyncResult<Vec<PublicKey>> {
            self.inner.list_feeds().await
        }

        async fn latest_root(&self, feed: &PublicKey) -> SyncResult<Option<RootPack>> {
            self.inner.latest_root(feed).await
        }

        async fn fetch_objects(&self, wants: &[Hash]) -> SyncResult<Vec<(Hash, Bytes)>> {
            Ok(wants
                .iter()
                .map(|h| (*h, Bytes::from_static(b"forged")))
                .collect())
        }
    }

    /// Serves the root but never any object.
    struct WithholdingTransport {
        inner: ContainerTransport,
    }

    #[async_trait]
    impl RemoteTransport for WithholdingTransport {
        async fn list_feeds(&self) -> SyncResult<Vec<PublicKey>> {
            self.inner.list_feeds().await
        }

        async fn latest_root(&self, feed: &PublicKey) -> SyncResult<Option<RootPack>> {
            self.inner.latest_root(feed).await
        }

        async fn fetch_objects(&self, _wants: &[Hash]) -> SyncResult<Vec<(Hash, Bytes)>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn forged_objects_are_rejected() {
        let (remote, pk) = populated();
        let local = local();
        let puller = Puller::new(
            LyingTransport {
                inner: ContainerTransport::new(remote),
            },
            Arc::new(local.clone()),
            SyncConfig::default(),
        );
        assert!(matches!(
            puller.pull(&pk).await,
            Err(SyncError::Local(RootError::ForgedContent { .. }))
        ));
        assert!(!local.last_root(&pk).unwrap().unwrap().is_full().unwrap());
    }

    #[tokio::test]
    async fn withheld_objects_end_pull_without_error() {
        let (remote, pk) = populated();
        let puller = Puller::new(
            WithholdingTransport {
                inner: ContainerTransport::new(remote),
            },
            Arc::new(local()),
            SyncConfig::default(),
        );
        let result = puller.pull(&pk).await.unwrap();
        assert!(!result.complete);
        assert_eq!(result.rounds, 1);
        assert_eq!(result.unavailable.len(), 1);
        assert_eq!(result.objects_received, 0);
    }
}

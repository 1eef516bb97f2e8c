use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use bytes::Bytes;
use cxo_crypto::PublicKey;
use cxo_types::Hash;

use crate::error::{StoreError, StoreResult};
use crate::pack::RootPack;
use crate::traits::{ObjectStore, RootStore};

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs are held as [`Bytes`] behind a
/// `RwLock`, so reads hand out cheap clones.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<Hash, Bytes>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .map(|m| m.values().map(|b| b.len() as u64).sum())
            .unwrap_or(0)
    }

    /// Return a sorted list of all hashes in the store.
    pub fn all_hashes(&self) -> Vec<Hash> {
        let mut hashes: Vec<Hash> = self
            .objects
            .read()
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        hashes.sort();
        hashes
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get(&self, hash: &Hash) -> StoreResult<Option<Bytes>> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(hash).cloned())
    }

    fn put(&self, data: &[u8]) -> StoreResult<Hash> {
        let hash = Hash::sum(data);
        let mut map = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        map.entry(hash)
            .or_insert_with(|| Bytes::copy_from_slice(data));
        Ok(hash)
    }

    fn has(&self, hash: &Hash) -> StoreResult<bool> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.contains_key(hash))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

/// In-memory root pack store.
///
/// Each owner's packs live in a `BTreeMap` keyed by seq; the last entry is
/// the latest pointer.
#[derive(Debug, Default)]
pub struct InMemoryRootStore {
    feeds: RwLock<HashMap<PublicKey, BTreeMap<u64, RootPack>>>,
}

impl InMemoryRootStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RootStore for InMemoryRootStore {
    fn put(&self, pack: &RootPack) -> StoreResult<()> {
        let mut feeds = self.feeds.write().map_err(|_| StoreError::LockPoisoned)?;
        let chain = feeds.entry(pack.public_key).or_default();
        if let Some(existing) = chain.get(&pack.seq) {
            if existing == pack {
                return Ok(());
            }
            return Err(StoreError::PackConflict {
                feed: pack.public_key.short_hex(),
                seq: pack.seq,
            });
        }
        chain.insert(pack.seq, pack.clone());
        Ok(())
    }

    fn get(&self, feed: &PublicKey, seq: u64) -> StoreResult<Option<RootPack>> {
        let feeds = self.feeds.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(feeds.get(feed).and_then(|chain| chain.get(&seq)).cloned())
    }

    fn latest(&self, feed: &PublicKey) -> StoreResult<Option<RootPack>> {
        let feeds = self.feeds.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(feeds
            .get(feed)
            .and_then(|chain| chain.values().next_back())
            .cloned())
    }

    fn history(&self, feed: &PublicKey) -> StoreResult<Vec<RootPack>> {
        let feeds = self.feeds.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(feeds
            .get(feed)
            .map(|chain| chain.values().cloned().collect())
            .unwrap_or_default())
    }

    fn feeds(&self) -> StoreResult<Vec<PublicKey>> {
        let feeds = self.feeds.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut keys: Vec<PublicKey> = feeds
            .iter()
            .filter(|(_, chain)| !chain.is_empty())
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        Ok(keys)
    }
}

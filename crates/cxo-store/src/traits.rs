use bytes::Bytes;
use cxo_crypto::PublicKey;
use cxo_types::Hash;

use crate::error::{StoreError, StoreResult};
use crate::pack::RootPack;

/// Content-addressed blob store.
///
/// All implementations must satisfy these invariants:
/// - Every stored blob is keyed by the hash of its bytes.
/// - Blobs are immutable; `put` of bytes already present is a no-op.
/// - A concurrent reader of a blob being written sees all of it or nothing.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read a blob by its hash.
    ///
    /// Returns `Ok(None)` if the blob does not exist.
    fn get(&self, hash: &Hash) -> StoreResult<Option<Bytes>>;

    /// Store a blob and return its hash.
    ///
    /// If the blob already exists, this is a no-op (idempotent).
    fn put(&self, data: &[u8]) -> StoreResult<Hash>;

    /// Check whether a blob exists in the store.
    fn has(&self, hash: &Hash) -> StoreResult<bool>;

    /// Store a blob offered under a claimed hash.
    ///
    /// Fails with [`StoreError::ForgedContent`] without storing anything if
    /// the bytes do not hash to `claimed`.
    fn put_verified(&self, claimed: &Hash, data: &[u8]) -> StoreResult<()> {
        let computed = Hash::sum(data);
        if computed != *claimed {
            return Err(StoreError::ForgedContent {
                claimed: *claimed,
                computed,
            });
        }
        self.put(data)?;
        Ok(())
    }

    /// Read multiple blobs in a batch.
    ///
    /// Default implementation calls `get()` for each hash.
    fn get_batch(&self, hashes: &[Hash]) -> StoreResult<Vec<Option<Bytes>>> {
        hashes.iter().map(|hash| self.get(hash)).collect()
    }
}

/// Persistence for signed root packs.
///
/// Packs are keyed by (owner key, seq). Each owner has a "latest" pointer
/// that only ever moves forward.
pub trait RootStore: Send + Sync {
    /// Persist a pack and advance the owner's latest pointer if the pack is
    /// newer than the current head.
    ///
    /// Storing an identical pack twice is a no-op. Storing a different pack
    /// at an occupied (owner, seq) fails with [`StoreError::PackConflict`].
    fn put(&self, pack: &RootPack) -> StoreResult<()>;

    /// Read the pack at a given seq.
    fn get(&self, feed: &PublicKey, seq: u64) -> StoreResult<Option<RootPack>>;

    /// Read the owner's latest pack.
    fn latest(&self, feed: &PublicKey) -> StoreResult<Option<RootPack>>;

    /// All persisted packs of an owner, ordered by seq.
    fn history(&self, feed: &PublicKey) -> StoreResult<Vec<RootPack>>;

    /// All owners with at least one persisted pack, sorted.
    fn feeds(&self) -> StoreResult<Vec<PublicKey>>;

    /// The owner's latest seq, if any.
    fn latest_seq(&self, feed: &PublicKey) -> StoreResult<Option<u64>> {
        Ok(self.latest(feed)?.map(|pack| pack.seq))
    }
}

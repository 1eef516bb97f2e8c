use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use bytes::Bytes;
use cxo_crypto::PublicKey;
use cxo_types::Hash;
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::error::{StoreError, StoreResult};
use crate::pack::RootPack;
use crate::traits::{ObjectStore, RootStore};

const OBJECTS_DIR: &str = "objects";
const ROOTS_DIR: &str = "roots";
const PACK_EXT: &str = "pack";

/// Durability and integrity knobs shared by the file-backed stores.
#[derive(Clone, Debug)]
pub struct FileStoreOptions {
    /// Re-hash blobs on read and refuse to return mismatching content.
    pub verify_reads: bool,
    /// `fsync` every written file before it is renamed into place.
    pub sync_writes: bool,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            verify_reads: true,
            sync_writes: false,
        }
    }
}

/// Write `data` to `path` through a temporary file in the same directory,
/// so a reader never observes a partially written file.
fn write_atomic(path: &Path, data: &[u8], sync: bool) -> StoreResult<()> {
    let dir = path.parent().ok_or_else(|| {
        StoreError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "target path has no parent directory",
        ))
    })?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    if sync {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// One-file-per-blob store laid out as `objects/<2 hex>/<62 hex>`.
pub struct FileObjectStore {
    root: PathBuf,
    options: FileStoreOptions,
}

impl FileObjectStore {
    /// Open (or create) a blob store under `dir`.
    pub fn open(dir: impl AsRef<Path>, options: FileStoreOptions) -> StoreResult<Self> {
        let root = dir.as_ref().join(OBJECTS_DIR);
        fs::create_dir_all(&root)?;
        debug!(path = %root.display(), "opened file object store");
        Ok(Self { root, options })
    }

    fn path_for(&self, hash: &Hash) -> PathBuf {
        let hex = hash.to_hex();
        let (fanout, rest) = hex.split_at(2);
        self.root.join(fanout).join(rest)
    }
}

impl ObjectStore for FileObjectStore {
    fn get(&self, hash: &Hash) -> StoreResult<Option<Bytes>> {
        let path = self.path_for(hash);
        let Some(data) = read_optional(&path)? else {
            return Ok(None);
        };
        if self.options.verify_reads {
            let computed = Hash::sum(&data);
            if computed != *hash {
                error!(
                    key = %hash.short_hex(),
                    computed = %computed.short_hex(),
                    path = %path.display(),
                    "stored blob does not match its key"
                );
                return Ok(None);
            }
        }
        Ok(Some(Bytes::from(data)))
    }

    /// Store `data`. With `verify_reads` on, an existing file that no longer
    /// hashes to its key is overwritten.
    fn put(&self, data: &[u8]) -> StoreResult<Hash> {
        let hash = Hash::sum(data);
        let path = self.path_for(&hash);
        if path.exists() {
            if !self.options.verify_reads || self.get(&hash)?.is_some() {
                return Ok(hash);
            }
            warn!(key = %hash.short_hex(), path = %path.display(), "repairing corrupt blob");
        }
        write_atomic(&path, data, self.options.sync_writes)?;
        Ok(hash)
    }

    /// With `verify_reads` on this agrees with [`get`](Self::get), so a
    /// corrupt blob counts as absent.
    fn has(&self, hash: &Hash) -> StoreResult<bool> {
        if self.options.verify_reads {
            return Ok(self.get(hash)?.is_some());
        }
        Ok(self.path_for(hash).is_file())
    }
}

impl std::fmt::Debug for FileObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileObjectStore")
            .field("root", &self.root)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Root store
// ---------------------------------------------------------------------------

/// Root pack store laid out as `roots/<owner hex>/<seq, 20 digits>.pack`.
///
/// The latest seq of every owner is rebuilt from the directory listing on
/// open and kept in memory afterwards. Writes are serialized so the
/// check-then-write for an occupied position cannot race.
pub struct FileRootStore {
    root: PathBuf,
    options: FileStoreOptions,
    latest: RwLock<HashMap<PublicKey, u64>>,
    write_lock: Mutex<()>,
}

impl FileRootStore {
    /// Open (or create) a root store under `dir`.
    pub fn open(dir: impl AsRef<Path>, options: FileStoreOptions) -> StoreResult<Self> {
        let root = dir.as_ref().join(ROOTS_DIR);
        fs::create_dir_all(&root)?;
        let latest = Self::scan(&root)?;
        debug!(path = %root.display(), feeds = latest.len(), "opened file root store");
        Ok(Self {
            root,
            options,
            latest: RwLock::new(latest),
            write_lock: Mutex::new(()),
        })
    }

    fn scan(root: &Path) -> StoreResult<HashMap<PublicKey, u64>> {
        let mut latest = HashMap::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(feed) = name.to_str().and_then(|s| PublicKey::from_hex(s).ok()) else {
                warn!(path = %entry.path().display(), "skipping unrecognized feed directory");
                continue;
            };
            if let Some(seq) = Self::seqs_in(&entry.path())?.into_iter().max() {
                latest.insert(feed, seq);
            }
        }
        Ok(latest)
    }

    fn seqs_in(dir: &Path) -> StoreResult<Vec<u64>> {
        let mut seqs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PACK_EXT) {
                continue;
            }
            if let Some(seq) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                seqs.push(seq);
            }
        }
        seqs.sort_unstable();
        Ok(seqs)
    }

    fn feed_dir(&self, feed: &PublicKey) -> PathBuf {
        self.root.join(feed.to_hex())
    }

    fn pack_path(&self, feed: &PublicKey, seq: u64) -> PathBuf {
        self.feed_dir(feed).join(format!("{seq:020}.{PACK_EXT}"))
    }

    fn read_pack(&self, feed: &PublicKey, seq: u64) -> StoreResult<Option<RootPack>> {
        let path = self.pack_path(feed, seq);
        let Some(data) = read_optional(&path)? else {
            return Ok(None);
        };
        let pack = RootPack::from_bytes(&data).map_err(|e| StoreError::CorruptRecord {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if pack.seq != seq || pack.public_key != *feed {
            return Err(StoreError::CorruptRecord {
                path,
                reason: format!("pack claims seq {} of {}", pack.seq, pack.public_key.short_hex()),
            });
        }
        Ok(Some(pack))
    }
}

impl RootStore for FileRootStore {
    fn put(&self, pack: &RootPack) -> StoreResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(existing) = self.read_pack(&pack.public_key, pack.seq)? {
            if existing == *pack {
                return Ok(());
            }
            return Err(StoreError::PackConflict {
                feed: pack.public_key.short_hex(),
                seq: pack.seq,
            });
        }

        let path = self.pack_path(&pack.public_key, pack.seq);
        write_atomic(&path, &pack.to_bytes()?, self.options.sync_writes)?;

        let mut latest = self.latest.write().map_err(|_| StoreError::LockPoisoned)?;
        let head = latest.entry(pack.public_key).or_insert(pack.seq);
        if pack.seq > *head {
            *head = pack.seq;
        }
        debug!(feed = %pack.public_key.short_hex(), seq = pack.seq, "persisted root pack");
        Ok(())
    }

    fn get(&self, feed: &PublicKey, seq: u64) -> StoreResult<Option<RootPack>> {
        self.read_pack(feed, seq)
    }

    fn latest(&self, feed: &PublicKey) -> StoreResult<Option<RootPack>> {
        let seq = {
            let latest = self.latest.read().map_err(|_| StoreError::LockPoisoned)?;
            latest.get(feed).copied()
        };
        match seq {
            Some(seq) => self.read_pack(feed, seq),
            None => Ok(None),
        }
    }

    fn history(&self, feed: &PublicKey) -> StoreResult<Vec<RootPack>> {
        let dir = self.feed_dir(feed);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut packs = Vec::new();
        for seq in Self::seqs_in(&dir)? {
            if let Some(pack) = self.read_pack(feed, seq)? {
                packs.push(pack);
            }
        }
        Ok(packs)
    }

    fn feeds(&self) -> StoreResult<Vec<PublicKey>> {
        let latest = self.latest.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut keys: Vec<PublicKey> = latest.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for FileRootStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRootStore")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::tests::make_pack;
    use cxo_crypto::SecretKey;
    use proptest::prelude::*;

    fn object_store(dir: &Path) -> FileObjectStore {
        FileObjectStore::open(dir, FileStoreOptions::default()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Object store
    // -----------------------------------------------------------------------

    #[test]
    fn put_get_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let hash = object_store(dir.path()).put(b"persistent").unwrap();

        let reopened = object_store(dir.path());
        assert!(reopened.has(&hash).unwrap());
        assert_eq!(reopened.get(&hash).unwrap().unwrap(), &b"persistent"[..]);
    }

    #[test]
    fn missing_blob_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = object_store(dir.path());
        assert!(store.get(&Hash::sum(b"nothing")).unwrap().is_none());
    }

    #[test]
    fn tampered_blob_is_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let store = object_store(dir.path());
        let hash = store.put(b"original").unwrap();
        fs::write(store.path_for(&hash), b"tampered").unwrap();
        assert!(store.get(&hash).unwrap().is_none());

        let lax = FileObjectStore::open(
            dir.path(),
            FileStoreOptions {
                verify_reads: false,
                sync_writes: true,
            },
        )
        .unwrap();
        assert_eq!(lax.get(&hash).unwrap().unwrap(), &b"tampered"[..]);
        assert!(lax.has(&hash).unwrap());
    }

    #[test]
    fn corrupt_blob_is_repaired_by_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = object_store(dir.path());
        let hash = store.put(b"original").unwrap();
        fs::write(store.path_for(&hash), b"tampered").unwrap();
        assert!(!store.has(&hash).unwrap());

        store.put_verified(&hash, b"original").unwrap();
        assert_eq!(store.get(&hash).unwrap().unwrap(), &b"original"[..]);
        assert!(store.has(&hash).unwrap());
        assert_eq!(fs::read(store.path_for(&hash)).unwrap(), b"original");
    }

    #[test]
    fn fanout_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = object_store(dir.path());
        let hash = store.put(b"layout").unwrap();
        let hex = hash.to_hex();
        let expected = dir.path().join("objects").join(&hex[..2]).join(&hex[2..]);
        assert!(expected.is_file());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        #[test]
        fn put_then_get_returns_same_bytes(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let dir = tempfile::tempdir().unwrap();
            let store = object_store(dir.path());
            let hash = store.put(&data).unwrap();
            let read = store.get(&hash).unwrap().unwrap();
            prop_assert_eq!(&read[..], &data[..]);
        }
    }

    // -----------------------------------------------------------------------
    // Root store
    // -----------------------------------------------------------------------

    #[test]
    fn latest_is_rebuilt_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let sk = SecretKey::generate();
        let feed = sk.public_key();
        {
            let store = FileRootStore::open(dir.path(), FileStoreOptions::default()).unwrap();
            for seq in 0..3 {
                store.put(&make_pack(&sk, seq, b"body")).unwrap();
            }
        }
        let store = FileRootStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        assert_eq!(store.latest_seq(&feed).unwrap(), Some(2));
        assert_eq!(store.feeds().unwrap(), vec![feed]);
        let seqs: Vec<u64> = store.history(&feed).unwrap().iter().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn out_of_order_put_does_not_move_latest_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRootStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        let sk = SecretKey::generate();
        store.put(&make_pack(&sk, 5, b"five")).unwrap();
        store.put(&make_pack(&sk, 4, b"four")).unwrap();
        assert_eq!(store.latest_seq(&sk.public_key()).unwrap(), Some(5));
    }

    #[test]
    fn conflicting_pack_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRootStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        let sk = SecretKey::generate();
        let pack = make_pack(&sk, 0, b"a");
        store.put(&pack).unwrap();
        store.put(&pack).unwrap();
        assert!(matches!(
            store.put(&make_pack(&sk, 0, b"b")),
            Err(StoreError::PackConflict { seq: 0, .. })
        ));
    }

    #[test]
    fn corrupt_pack_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRootStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        let sk = SecretKey::generate();
        store.put(&make_pack(&sk, 0, b"a")).unwrap();
        fs::write(store.pack_path(&sk.public_key(), 0), b"junk").unwrap();
        assert!(matches!(
            store.get(&sk.public_key(), 0),
            Err(StoreError::CorruptRecord { .. })
        ));
    }
}

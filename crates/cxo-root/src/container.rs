use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use cxo_crypto::{ChainError, ChainVerifier, PublicKey, SecretKey, Signature};
use cxo_schema::Registry;
use cxo_store::{
    FileObjectStore, FileRootStore, FileStoreOptions, InMemoryObjectStore, InMemoryRootStore,
    ObjectStore, RootPack, RootStore,
};
use cxo_types::{Hash, RegistryReference};
use tracing::{debug, info, warn};

use crate::body::{RootBody, RootRecord};
use crate::config::ContainerConfig;
use crate::error::{RootError, RootResult};
use crate::keylock::KeyLocks;
use crate::root::{EditableRoot, ReadOnlyRoot, RootState};

/// Owner of the object store, the known registries and every key's chain
/// of roots.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

struct Inner {
    db: Arc<dyn ObjectStore>,
    roots: Arc<dyn RootStore>,
    core: Arc<Registry>,
    registries: RwLock<HashMap<RegistryReference, Arc<Registry>>>,
    /// Registries named by accepted roots but not yet held.
    pending: RwLock<HashSet<RegistryReference>>,
    locks: KeyLocks,
    config: ContainerConfig,
}

impl Container {
    /// Build a container over explicit stores. `core` is sealed if it is
    /// not already.
    pub fn new(
        db: Arc<dyn ObjectStore>,
        roots: Arc<dyn RootStore>,
        core: Registry,
        config: ContainerConfig,
    ) -> RootResult<Self> {
        let mut core = core;
        core.done()?;
        let core_ref = core.reference()?;
        db.put(core.encode()?)?;
        let core = Arc::new(core);

        let mut registries = HashMap::new();
        registries.insert(core_ref, Arc::clone(&core));

        Ok(Self {
            inner: Arc::new(Inner {
                db,
                roots,
                core,
                registries: RwLock::new(registries),
                pending: RwLock::new(HashSet::new()),
                locks: KeyLocks::default(),
                config,
            }),
        })
    }

    /// An in-memory container with default configuration.
    pub fn in_memory(core: Registry) -> RootResult<Self> {
        Self::open(ContainerConfig::default(), core)
    }

    /// Open a container as described by `config`.
    pub fn open(config: ContainerConfig, core: Registry) -> RootResult<Self> {
        let (db, roots): (Arc<dyn ObjectStore>, Arc<dyn RootStore>) = match &config.data_dir {
            Some(dir) => {
                let options = FileStoreOptions {
                    verify_reads: config.verify_reads,
                    sync_writes: config.sync_writes,
                };
                let db = FileObjectStore::open(dir, options.clone())?;
                let roots = FileRootStore::open(dir, options)?;
                info!(path = %dir.display(), "opened persistent container");
                (Arc::new(db), Arc::new(roots))
            }
            None => {
                debug!("opened in-memory container");
                (
                    Arc::new(InMemoryObjectStore::new()),
                    Arc::new(InMemoryRootStore::new()),
                )
            }
        };
        Self::new(db, roots, core, config)
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    pub fn db(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.inner.db)
    }

    pub(crate) fn roots(&self) -> &dyn RootStore {
        self.inner.roots.as_ref()
    }

    pub(crate) fn key_token(&self, key: &PublicKey) -> RootResult<Arc<Mutex<()>>> {
        self.inner.locks.token(key)
    }

    /// Store an object produced locally, enforcing the size limit.
    pub(crate) fn store_object(&self, data: &[u8]) -> RootResult<Hash> {
        self.check_size(data.len())?;
        let hash = self.inner.db.put(data)?;
        debug!(object = %hash.short_hex(), size = data.len(), "stored object");
        Ok(hash)
    }

    pub(crate) fn check_size(&self, size: usize) -> RootResult<()> {
        let limit = self.inner.config.max_object_size;
        if size as u64 > limit {
            return Err(RootError::ObjectTooLarge {
                size: size as u64,
                limit,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Registries
    // -----------------------------------------------------------------------

    pub fn core_registry(&self) -> Arc<Registry> {
        Arc::clone(&self.inner.core)
    }

    /// Make a registry known. It is sealed if needed and its encoding is
    /// stored so peers can fetch it by reference.
    pub fn add_registry(&self, registry: Registry) -> RootResult<RegistryReference> {
        let mut registry = registry;
        registry.done()?;
        let reference = registry.reference()?;
        self.inner.db.put(registry.encode()?)?;
        self.insert_registry(reference, Arc::new(registry))?;
        Ok(reference)
    }

    fn insert_registry(&self, reference: RegistryReference, registry: Arc<Registry>) -> RootResult<()> {
        {
            let mut registries = self
                .inner
                .registries
                .write()
                .map_err(|_| RootError::LockPoisoned)?;
            registries.entry(reference).or_insert(registry);
        }
        let mut pending = self.inner.pending.write().map_err(|_| RootError::LockPoisoned)?;
        pending.remove(&reference);
        debug!(registry = %reference.hash().short_hex(), "registry available");
        Ok(())
    }

    /// Look up a registry. A registry whose encoding is in the object store
    /// (for example after reopening from disk) is loaded on first use.
    pub fn registry(&self, reference: &RegistryReference) -> RootResult<Arc<Registry>> {
        {
            let registries = self
                .inner
                .registries
                .read()
                .map_err(|_| RootError::LockPoisoned)?;
            if let Some(registry) = registries.get(reference) {
                return Ok(Arc::clone(registry));
            }
        }
        let Some(data) = self.inner.db.get(&reference.hash())? else {
            return Err(RootError::RegistryNotFound(*reference));
        };
        let registry = match Registry::decode(&data) {
            Ok(registry) => Arc::new(registry),
            Err(e) => {
                warn!(registry = %reference.hash().short_hex(), error = %e, "stored blob is not a registry");
                return Err(RootError::RegistryNotFound(*reference));
            }
        };
        self.insert_registry(*reference, Arc::clone(&registry))?;
        Ok(registry)
    }

    pub fn has_registry(&self, reference: &RegistryReference) -> bool {
        self.registry(reference).is_ok()
    }

    pub(crate) fn is_pending_registry(&self, reference: &RegistryReference) -> RootResult<bool> {
        let pending = self.inner.pending.read().map_err(|_| RootError::LockPoisoned)?;
        Ok(pending.contains(reference))
    }

    /// Install a registry received from a peer under the reference a root
    /// named. The bytes have already been verified against `reference`.
    pub(crate) fn accept_registry_blob(&self, reference: RegistryReference, data: &[u8]) -> RootResult<()> {
        let registry = Registry::decode(data)?;
        self.insert_registry(reference, Arc::new(registry))
    }

    // -----------------------------------------------------------------------
    // Roots
    // -----------------------------------------------------------------------

    /// A detached, editable root typed by the core registry.
    pub fn new_root(&self, public_key: PublicKey, sec: SecretKey) -> RootResult<EditableRoot> {
        let core_ref = self.inner.core.reference()?;
        self.new_root_reg(public_key, sec, core_ref)
    }

    /// A detached, editable root pinned to `registry`, which need not be
    /// known yet.
    pub fn new_root_reg(
        &self,
        public_key: PublicKey,
        sec: SecretKey,
        registry: RegistryReference,
    ) -> RootResult<EditableRoot> {
        if !sec.matches(&public_key) {
            return Err(RootError::InvalidKeyPair);
        }
        Ok(EditableRoot::new(
            RootState::detached(public_key, registry),
            self.clone(),
            sec,
        ))
    }

    /// The head of `public_key`'s chain.
    pub fn last_root(&self, public_key: &PublicKey) -> RootResult<Option<ReadOnlyRoot>> {
        self.inner
            .roots
            .latest(public_key)?
            .map(|pack| self.root_from_pack(pack))
            .transpose()
    }

    /// A specific root of `public_key`'s chain.
    pub fn root_by_seq(&self, public_key: &PublicKey, seq: u64) -> RootResult<Option<ReadOnlyRoot>> {
        self.inner
            .roots
            .get(public_key, seq)?
            .map(|pack| self.root_from_pack(pack))
            .transpose()
    }

    /// The newest persisted pack of `public_key`.
    pub fn last_pack(&self, public_key: &PublicKey) -> RootResult<Option<RootPack>> {
        Ok(self.inner.roots.latest(public_key)?)
    }

    /// Every key with at least one persisted root.
    pub fn feeds(&self) -> RootResult<Vec<PublicKey>> {
        Ok(self.inner.roots.feeds()?)
    }

    fn root_from_pack(&self, pack: RootPack) -> RootResult<ReadOnlyRoot> {
        let record = RootRecord::from_pack(pack)?;
        Ok(ReadOnlyRoot::new(RootState::from_record(record), self.clone()))
    }

    /// Ingest a root received from elsewhere.
    ///
    /// Returns `Ok(true)` if the root became the new head of its chain and
    /// `Ok(false)` if it is not newer than the local head (a duplicate or
    /// stale root is not an error). Fails with
    /// [`RootError::InvalidSignature`] if `sig` does not cover the bytes and
    /// [`RootError::InvalidChain`] if the root skips a seq or its previous
    /// hash does not match the local head.
    pub fn set_encoded_root(&self, root: &[u8], public_key: &PublicKey, sig: &Signature) -> RootResult<bool> {
        self.check_size(root.len())?;
        let hash = Hash::sum(root);
        public_key
            .verify_hash(&hash, sig)
            .map_err(|_| RootError::InvalidSignature)?;
        let body = RootBody::decode(root)?;
        let record = RootRecord {
            pack: RootPack {
                root: root.to_vec(),
                public_key: *public_key,
                sig: sig.clone(),
                seq: body.seq,
            },
            body,
        };

        let token = self.key_token(public_key)?;
        let _guard = token.lock().map_err(|_| RootError::LockPoisoned)?;

        let head = self
            .inner
            .roots
            .latest(public_key)?
            .map(RootRecord::from_pack)
            .transpose()?;
        if let Some(head) = &head {
            if record.body.seq <= head.body.seq {
                let same_seq = record.body.seq == head.body.seq;
                if same_seq && head.pack.hash() != hash {
                    warn!(
                        feed = %public_key.short_hex(),
                        seq = record.body.seq,
                        local = %head.pack.hash().short_hex(),
                        remote = %hash.short_hex(),
                        "ignoring forked root"
                    );
                } else {
                    debug!(feed = %public_key.short_hex(), seq = record.body.seq, "ignoring stale root");
                }
                return Ok(false);
            }
        }
        ChainVerifier::verify_link(head.as_ref(), &record).map_err(chain_error)?;

        self.inner.roots.put(&record.pack)?;
        let registry = record.body.registry;
        if !self.has_registry(&registry) {
            let mut pending = self.inner.pending.write().map_err(|_| RootError::LockPoisoned)?;
            pending.insert(registry);
        }
        info!(
            feed = %public_key.short_hex(),
            seq = record.body.seq,
            root = %hash.short_hex(),
            "accepted root"
        );
        Ok(true)
    }

    /// Re-verify every persisted root of `public_key`: signatures, body
    /// encodings, sequence numbers and previous-hash links.
    pub fn verify_chain(&self, public_key: &PublicKey) -> RootResult<()> {
        let records = self
            .inner
            .roots
            .history(public_key)?
            .into_iter()
            .map(|pack| {
                pack.public_key
                    .verify_hash(&pack.hash(), &pack.sig)
                    .map_err(|_| RootError::InvalidSignature)?;
                RootRecord::from_pack(pack)
            })
            .collect::<RootResult<Vec<_>>>()?;
        ChainVerifier::verify_chain(&records).map_err(chain_error)
    }
}

fn chain_error(err: ChainError) -> RootError {
    let seq = match &err {
        ChainError::GenesisHasPrevHash => 0,
        ChainError::BrokenLink { seq } | ChainError::MissingPrevHash { seq } => *seq,
        ChainError::SequenceGap { got, .. } => *got,
    };
    RootError::InvalidChain {
        seq,
        reason: err.to_string(),
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("config", &self.inner.config)
            .finish()
    }
}

//! Roots: signed, ordered snapshots of one owner's object graph.
//!
//! A root is either [`ReadOnlyRoot`] (anyone can inspect and walk it) or
//! [`EditableRoot`] (the holder has the owner's secret key and can save
//! objects and finalize new roots). [`Root`] holds either.

use std::ops::{ControlFlow, Deref};
use std::sync::Arc;

use cxo_crypto::{PublicKey, SecretKey, Signature};
use cxo_schema::{codec, Registry, Value};
use cxo_store::{ObjectStore, RootPack};
use cxo_types::{Dynamic, Hash, Reference, References, RegistryReference};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::body::{now_nanos, RootBody, RootRecord};
use crate::container::Container;
use crate::error::{RootError, RootResult};
use crate::walker::Walker;

/// Mutable fields of a root. Finalization fills in `seq`, `time`, `prev`,
/// `sig` and `hash` and marks the root attached.
#[derive(Clone, Debug)]
pub(crate) struct RootState {
    pub public_key: PublicKey,
    pub seq: u64,
    pub time: i64,
    pub registry: RegistryReference,
    pub refs: Vec<Dynamic>,
    pub prev: Option<Hash>,
    pub sig: Option<Signature>,
    pub hash: Option<Hash>,
    pub attached: bool,
}

impl RootState {
    pub(crate) fn detached(public_key: PublicKey, registry: RegistryReference) -> Self {
        Self {
            public_key,
            seq: 0,
            time: 0,
            registry,
            refs: Vec::new(),
            prev: None,
            sig: None,
            hash: None,
            attached: false,
        }
    }

    pub(crate) fn from_record(record: RootRecord) -> Self {
        let hash = record.pack.hash();
        Self {
            public_key: record.pack.public_key,
            seq: record.body.seq,
            time: record.body.time,
            registry: record.body.registry,
            refs: record.body.refs,
            prev: record.body.prev,
            sig: Some(record.pack.sig),
            hash: Some(hash),
            attached: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Read-only roots
// ---------------------------------------------------------------------------

/// A root that can be inspected and walked but not changed.
#[derive(Clone)]
pub struct ReadOnlyRoot {
    pub(crate) state: RootState,
    pub(crate) cont: Container,
}

impl ReadOnlyRoot {
    pub(crate) fn new(state: RootState, cont: Container) -> Self {
        Self { state, cont }
    }

    pub fn is_read_only(&self) -> bool {
        true
    }

    /// Whether this root has been finalized into its owner's chain.
    pub fn is_attached(&self) -> bool {
        self.state.attached
    }

    pub fn seq(&self) -> u64 {
        self.state.seq
    }

    /// Finalization time, Unix nanoseconds. Zero until finalized.
    pub fn time(&self) -> i64 {
        self.state.time
    }

    pub fn public_key(&self) -> PublicKey {
        self.state.public_key
    }

    /// Signature of the last finalization, if any.
    pub fn signature(&self) -> Option<&Signature> {
        self.state.sig.as_ref()
    }

    /// Hash of the encoded body, if finalized.
    pub fn hash(&self) -> Option<Hash> {
        self.state.hash
    }

    pub fn prev_hash(&self) -> Option<Hash> {
        self.state.prev
    }

    pub fn refs(&self) -> &[Dynamic] {
        &self.state.refs
    }

    pub fn registry_reference(&self) -> RegistryReference {
        self.state.registry
    }

    pub fn has_registry(&self) -> bool {
        self.cont.has_registry(&self.state.registry)
    }

    /// The registry this root's values are typed by.
    pub fn registry(&self) -> RootResult<Arc<Registry>> {
        self.cont.registry(&self.state.registry)
    }

    pub fn db(&self) -> Arc<dyn ObjectStore> {
        self.cont.db()
    }

    pub fn container(&self) -> &Container {
        &self.cont
    }

    /// Promote to an editable root. Fails unless `sec` belongs to this
    /// root's owner.
    pub fn edit(self, sec: SecretKey) -> RootResult<EditableRoot> {
        if !sec.matches(&self.state.public_key) {
            return Err(RootError::InvalidKeyPair);
        }
        Ok(EditableRoot { root: self, sec })
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    /// Decode the object `dynamic` points at into a generic [`Value`].
    pub fn value_of(&self, dynamic: &Dynamic) -> RootResult<Value> {
        let registry = self.registry()?;
        let data = self.cont.get_object(&dynamic.object.hash())?;
        Ok(registry.decode_value(&dynamic.schema, &data)?)
    }

    /// Decode every entry point of the root.
    pub fn values(&self) -> RootResult<Vec<Value>> {
        self.state.refs.iter().map(|d| self.value_of(d)).collect()
    }

    /// Decode the object `dynamic` points at into a typed value.
    pub fn get<T: DeserializeOwned>(&self, dynamic: &Dynamic) -> RootResult<T> {
        let data = self.cont.get_object(&dynamic.object.hash())?;
        Ok(codec::decode(&data)?)
    }

    // -----------------------------------------------------------------------
    // Graph walks
    // -----------------------------------------------------------------------

    /// Whether every hash reachable from this root is stored locally.
    ///
    /// A root whose registry is unknown is never full: its values cannot be
    /// decoded, so its graph cannot be enumerated.
    pub fn is_full(&self) -> RootResult<bool> {
        let Ok(registry) = self.registry() else {
            return Ok(false);
        };
        let flow = self.walk(
            Some(registry.as_ref()),
            &self.state.refs,
            |_| ControlFlow::Break(()),
            |_| ControlFlow::Continue(()),
        )?;
        Ok(flow.is_continue())
    }

    /// Call `f` for every reachable hash that is not stored locally.
    /// Nothing below a missing node is visited.
    pub fn want_func<F>(&self, f: F) -> RootResult<()>
    where
        F: FnMut(Hash) -> ControlFlow<()>,
    {
        let registry = self.registry().ok();
        self.walk(registry.as_deref(), &self.state.refs, f, |_| ControlFlow::Continue(()))?;
        Ok(())
    }

    /// Call `f` for every reachable hash that is stored locally.
    pub fn got_func<F>(&self, f: F) -> RootResult<()>
    where
        F: FnMut(Hash) -> ControlFlow<()>,
    {
        let registry = self.registry().ok();
        self.walk(registry.as_deref(), &self.state.refs, |_| ControlFlow::Continue(()), f)?;
        Ok(())
    }

    /// [`got_func`](Self::got_func) rooted at a single dynamic reference.
    pub fn got_of_func<F>(&self, dynamic: &Dynamic, f: F) -> RootResult<()>
    where
        F: FnMut(Hash) -> ControlFlow<()>,
    {
        let registry = self.registry().ok();
        self.walk(
            registry.as_deref(),
            std::slice::from_ref(dynamic),
            |_| ControlFlow::Continue(()),
            f,
        )?;
        Ok(())
    }

    /// [`want_func`](Self::want_func) rooted at a single dynamic reference.
    pub fn want_of_func<F>(&self, dynamic: &Dynamic, f: F) -> RootResult<()>
    where
        F: FnMut(Hash) -> ControlFlow<()>,
    {
        let registry = self.registry().ok();
        self.walk(
            registry.as_deref(),
            std::slice::from_ref(dynamic),
            f,
            |_| ControlFlow::Continue(()),
        )?;
        Ok(())
    }

    fn walk<M, P>(
        &self,
        registry: Option<&Registry>,
        starts: &[Dynamic],
        on_missing: M,
        on_present: P,
    ) -> RootResult<ControlFlow<()>>
    where
        M: FnMut(Hash) -> ControlFlow<()>,
        P: FnMut(Hash) -> ControlFlow<()>,
    {
        let db = self.cont.db();
        let mut walker = Walker::new(db.as_ref(), registry);
        let starts = starts
            .iter()
            .filter(|d| !d.is_blank())
            .map(|d| walker.dynamic_node(d))
            .collect();
        walker.walk(starts, on_missing, on_present)
    }
}

impl std::fmt::Debug for ReadOnlyRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOnlyRoot")
            .field("public_key", &self.state.public_key)
            .field("seq", &self.state.seq)
            .field("attached", &self.state.attached)
            .field("refs", &self.state.refs.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Editable roots
// ---------------------------------------------------------------------------

/// A root whose holder owns the secret key and can finalize new versions.
///
/// Dereferences to [`ReadOnlyRoot`] for every inspection method.
pub struct EditableRoot {
    root: ReadOnlyRoot,
    sec: SecretKey,
}

impl Deref for EditableRoot {
    type Target = ReadOnlyRoot;

    fn deref(&self) -> &ReadOnlyRoot {
        &self.root
    }
}

impl EditableRoot {
    pub(crate) fn new(state: RootState, cont: Container, sec: SecretKey) -> Self {
        Self {
            root: ReadOnlyRoot::new(state, cont),
            sec,
        }
    }

    pub fn is_read_only(&self) -> bool {
        false
    }

    /// Drop the secret key.
    pub fn into_read_only(self) -> ReadOnlyRoot {
        self.root
    }

    /// Encode and store a value, returning its reference.
    pub fn save<T: Serialize + ?Sized>(&self, value: &T) -> RootResult<Reference> {
        let data = codec::encode(value)?;
        Ok(Reference(self.cont.store_object(&data)?))
    }

    /// Store each value, then store the ordered list of their references.
    pub fn save_array<T: Serialize>(&self, values: &[T]) -> RootResult<References> {
        let refs = values
            .iter()
            .map(|v| self.save(v))
            .collect::<RootResult<Vec<Reference>>>()?;
        let data = codec::encode(&refs)?;
        Ok(References(self.cont.store_object(&data)?))
    }

    /// Store a value under the named schema of this root's registry.
    ///
    /// The encoded value is checked against the schema before storing.
    pub fn dynamic<T: Serialize + ?Sized>(&self, schema_name: &str, value: &T) -> RootResult<Dynamic> {
        let registry = self.registry()?;
        let schema_ref = registry.schema_reference(schema_name)?;
        let data = codec::encode(value)?;
        registry.decode_value(&schema_ref, &data)?;
        let hash = self.cont.store_object(&data)?;
        Ok(Dynamic::new(schema_ref, Reference(hash)))
    }

    /// Like [`dynamic`](Self::dynamic) but panics on failure.
    ///
    /// # Panics
    ///
    /// Panics if the registry or schema is unknown, the value does not match
    /// the schema, or the object store fails.
    pub fn must_dynamic<T: Serialize + ?Sized>(&self, schema_name: &str, value: &T) -> Dynamic {
        match self.dynamic(schema_name, value) {
            Ok(dynamic) => dynamic,
            Err(e) => panic!("must_dynamic({schema_name}): {e}"),
        }
    }

    /// Save `value`, append it to the entry points and finalize.
    pub fn inject<T: Serialize + ?Sized>(
        &mut self,
        schema_name: &str,
        value: &T,
    ) -> RootResult<(Dynamic, RootPack)> {
        let dynamic = self.dynamic(schema_name, value)?;
        self.root.state.refs.push(dynamic);
        match self.touch() {
            Ok(pack) => Ok((dynamic, pack)),
            Err(e) => {
                self.root.state.refs.pop();
                Err(e)
            }
        }
    }

    /// Save several values, append them all and finalize once.
    pub fn inject_many<T: Serialize>(
        &mut self,
        schema_name: &str,
        values: &[T],
    ) -> RootResult<(Vec<Dynamic>, RootPack)> {
        let dynamics = values
            .iter()
            .map(|v| self.dynamic(schema_name, v))
            .collect::<RootResult<Vec<_>>>()?;
        let before = self.root.state.refs.len();
        self.root.state.refs.extend_from_slice(&dynamics);
        match self.touch() {
            Ok(pack) => Ok((dynamics, pack)),
            Err(e) => {
                self.root.state.refs.truncate(before);
                Err(e)
            }
        }
    }

    /// Swap the entry points for `refs` and finalize. Returns the previous
    /// entry points.
    pub fn replace(&mut self, refs: Vec<Dynamic>) -> RootResult<(Vec<Dynamic>, RootPack)> {
        if let Some(bad) = refs.iter().find(|d| !d.is_valid()) {
            return Err(RootError::Decode(format!("half-set dynamic reference {bad:?}")));
        }
        let previous = std::mem::replace(&mut self.root.state.refs, refs);
        match self.touch() {
            Ok(pack) => Ok((previous, pack)),
            Err(e) => {
                self.root.state.refs = previous;
                Err(e)
            }
        }
    }

    /// Finalize the current state as the next root of the owner's chain.
    ///
    /// A detached root becomes seq 0 and may only start a new chain. An
    /// attached root must still be the chain head; it becomes `seq + 1`
    /// linked to the head's hash. The pack is signed, persisted, and the
    /// root becomes attached.
    pub fn touch(&mut self) -> RootResult<RootPack> {
        let public_key = self.root.state.public_key;
        let token = self.root.cont.key_token(&public_key)?;
        let _guard = token.lock().map_err(|_| RootError::LockPoisoned)?;

        let head = self.root.cont.roots().latest(&public_key)?;
        let (seq, prev) = match (self.root.state.attached, head) {
            (false, None) => (0, None),
            (false, Some(head)) => {
                return Err(RootError::InvalidChain {
                    seq: head.seq,
                    reason: "key already has a chain; a detached root cannot start another".into(),
                });
            }
            (true, Some(head))
                if head.seq == self.root.state.seq && Some(head.hash()) == self.root.state.hash =>
            {
                (head.seq + 1, Some(head.hash()))
            }
            (true, Some(head)) => {
                return Err(RootError::InvalidChain {
                    seq: head.seq,
                    reason: format!("chain head moved past seq {}", self.root.state.seq),
                });
            }
            (true, None) => {
                return Err(RootError::InvalidChain {
                    seq: self.root.state.seq,
                    reason: "attached root has no persisted chain".into(),
                });
            }
        };

        let body = RootBody {
            seq,
            time: now_nanos(),
            registry: self.root.state.registry,
            refs: self.root.state.refs.clone(),
            prev,
        };
        let root = body.encode()?;
        let hash = Hash::sum(&root);
        let sig = self.sec.sign_hash(&hash);
        let pack = RootPack {
            root,
            public_key,
            sig: sig.clone(),
            seq,
        };
        self.root.cont.roots().put(&pack)?;
        debug!(root = %hash.short_hex(), refs = body.refs.len(), "persisted root pack");

        let state = &mut self.root.state;
        state.seq = seq;
        state.time = body.time;
        state.prev = prev;
        state.sig = Some(sig);
        state.hash = Some(hash);
        state.attached = true;

        info!(feed = %public_key.short_hex(), seq, "finalized root");
        Ok(pack)
    }
}

impl std::fmt::Debug for EditableRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditableRoot")
            .field("public_key", &self.root.state.public_key)
            .field("seq", &self.root.state.seq)
            .field("attached", &self.root.state.attached)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Either
// ---------------------------------------------------------------------------

/// A root with or without write capability.
#[derive(Debug)]
pub enum Root {
    ReadOnly(ReadOnlyRoot),
    Editable(EditableRoot),
}

impl Root {
    pub fn is_read_only(&self) -> bool {
        matches!(self, Root::ReadOnly(_))
    }

    /// Inspection view, available for both variants.
    pub fn view(&self) -> &ReadOnlyRoot {
        match self {
            Root::ReadOnly(root) => root,
            Root::Editable(root) => &root.root,
        }
    }

    /// Write access. Fails with [`RootError::ReadOnly`] for read-only roots.
    pub fn editable(&mut self) -> RootResult<&mut EditableRoot> {
        match self {
            Root::ReadOnly(_) => Err(RootError::ReadOnly),
            Root::Editable(root) => Ok(root),
        }
    }

    /// Finalize; fails with [`RootError::ReadOnly`] without the secret key.
    pub fn touch(&mut self) -> RootResult<RootPack> {
        self.editable()?.touch()
    }

    /// Promote to editable. An editable root re-checks the key as well.
    pub fn edit(self, sec: SecretKey) -> RootResult<Root> {
        let read_only = match self {
            Root::ReadOnly(root) => root,
            Root::Editable(root) => root.into_read_only(),
        };
        read_only.edit(sec).map(Root::Editable)
    }
}

impl From<ReadOnlyRoot> for Root {
    fn from(root: ReadOnlyRoot) -> Self {
        Root::ReadOnly(root)
    }
}

impl From<EditableRoot> for Root {
    fn from(root: EditableRoot) -> Self {
        Root::Editable(root)
    }
}

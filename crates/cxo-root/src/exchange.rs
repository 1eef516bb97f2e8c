//! The narrow interface through which transports and other outer layers
//! drive a container.

use std::ops::ControlFlow;

use bytes::Bytes;
use cxo_crypto::{PublicKey, Signature};
use cxo_store::RootPack;
use cxo_types::{Hash, RegistryReference};
use tracing::debug;

use crate::container::Container;
use crate::error::{RootError, RootResult};

/// Operations a network or sync layer needs from a container.
///
/// Every byte that enters through this trait is verified: roots by
/// signature and chain link, objects by hash.
pub trait Exchange: Send + Sync {
    /// Offer a root. `Ok(false)` means it was not newer than the local head.
    fn submit_root(&self, public_key: &PublicKey, root: &[u8], sig: &Signature) -> RootResult<bool>;

    /// Newest persisted root pack of a key, for serving to peers.
    fn latest_pack(&self, public_key: &PublicKey) -> RootResult<Option<RootPack>>;

    /// Read a stored object. Fails with [`RootError::NotFound`] if absent.
    fn get_object(&self, hash: &Hash) -> RootResult<Bytes>;

    /// Store an object offered under `hash`. Fails with
    /// [`RootError::ForgedContent`] if the bytes do not hash to `hash`.
    fn put_object(&self, hash: &Hash, data: &[u8]) -> RootResult<()>;

    /// Hashes reachable from the key's head root that are not stored
    /// locally. A missing registry is listed first.
    fn enumerate_wanted(&self, public_key: &PublicKey) -> RootResult<Vec<Hash>>;

    /// Hashes reachable from the key's head root that are stored locally,
    /// including the registry blob when held.
    fn enumerate_available(&self, public_key: &PublicKey) -> RootResult<Vec<Hash>>;
}

impl Container {
    pub fn submit_root(&self, public_key: &PublicKey, root: &[u8], sig: &Signature) -> RootResult<bool> {
        self.set_encoded_root(root, public_key, sig)
    }

    pub fn get_object(&self, hash: &Hash) -> RootResult<Bytes> {
        self.db().get(hash)?.ok_or(RootError::NotFound(*hash))
    }

    pub fn put_object(&self, hash: &Hash, data: &[u8]) -> RootResult<()> {
        self.check_size(data.len())?;
        self.db().put_verified(hash, data)?;
        debug!(object = %hash.short_hex(), size = data.len(), "received object");

        let reference = RegistryReference(*hash);
        if self.is_pending_registry(&reference)? {
            self.accept_registry_blob(reference, data)?;
        }
        Ok(())
    }

    pub fn enumerate_wanted(&self, public_key: &PublicKey) -> RootResult<Vec<Hash>> {
        let Some(root) = self.last_root(public_key)? else {
            return Ok(Vec::new());
        };
        let mut wanted = Vec::new();
        if !root.has_registry() {
            wanted.push(root.registry_reference().hash());
        }
        root.want_func(|hash| {
            wanted.push(hash);
            ControlFlow::Continue(())
        })?;
        Ok(wanted)
    }

    pub fn enumerate_available(&self, public_key: &PublicKey) -> RootResult<Vec<Hash>> {
        let Some(root) = self.last_root(public_key)? else {
            return Ok(Vec::new());
        };
        let mut available = Vec::new();
        if root.has_registry() {
            available.push(root.registry_reference().hash());
        }
        root.got_func(|hash| {
            available.push(hash);
            ControlFlow::Continue(())
        })?;
        Ok(available)
    }
}

impl Exchange for Container {
    fn submit_root(&self, public_key: &PublicKey, root: &[u8], sig: &Signature) -> RootResult<bool> {
        Container::submit_root(self, public_key, root, sig)
    }

    fn latest_pack(&self, public_key: &PublicKey) -> RootResult<Option<RootPack>> {
        self.last_pack(public_key)
    }

    fn get_object(&self, hash: &Hash) -> RootResult<Bytes> {
        Container::get_object(self, hash)
    }

    fn put_object(&self, hash: &Hash, data: &[u8]) -> RootResult<()> {
        Container::put_object(self, hash, data)
    }

    fn enumerate_wanted(&self, public_key: &PublicKey) -> RootResult<Vec<Hash>> {
        Container::enumerate_wanted(self, public_key)
    }

    fn enumerate_available(&self, public_key: &PublicKey) -> RootResult<Vec<Hash>> {
        Container::enumerate_available(self, public_key)
    }
}

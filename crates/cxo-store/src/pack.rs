use cxo_crypto::{PublicKey, Signature};
use cxo_types::Hash;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Wire and persisted form of a finalized root.
///
/// `root` holds the canonical encoding of the root body; `sig` signs the
/// hash of exactly those bytes. `seq` duplicates the body's sequence number
/// so stores can index packs without decoding them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootPack {
    pub root: Vec<u8>,
    pub public_key: PublicKey,
    pub sig: Signature,
    pub seq: u64,
}

impl RootPack {
    /// Hash of the encoded root body. This is the root's identity and the
    /// value the next root stores as its previous hash.
    pub fn hash(&self) -> Hash {
        Hash::sum(&self.root)
    }

    /// Serialize for storage.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Deserialize from storage.
    pub fn from_bytes(data: &[u8]) -> StoreResult<Self> {
        bincode::deserialize(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cxo_crypto::SecretKey;

    pub(crate) fn make_pack(sk: &SecretKey, seq: u64, body: &[u8]) -> RootPack {
        let root = [&seq.to_le_bytes()[..], body].concat();
        let sig = sk.sign_hash(&Hash::sum(&root));
        RootPack {
            root,
            public_key: sk.public_key(),
            sig,
            seq,
        }
    }

    #[test]
    fn hash_covers_root_bytes_only() {
        let sk = SecretKey::generate();
        let pack = make_pack(&sk, 3, b"body");
        assert_eq!(pack.hash(), Hash::sum(&pack.root));
    }

    #[test]
    fn bytes_roundtrip() {
        let sk = SecretKey::generate();
        let pack = make_pack(&sk, 7, b"some body");
        let decoded = RootPack::from_bytes(&pack.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, pack);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            RootPack::from_bytes(b"nope"),
            Err(StoreError::Serialization(_))
        ));
    }
}

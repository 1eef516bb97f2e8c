use std::time::{SystemTime, UNIX_EPOCH};

use cxo_crypto::ChainLink;
use cxo_schema::codec;
use cxo_store::RootPack;
use cxo_types::{Dynamic, Hash, RegistryReference};
use serde::{Deserialize, Serialize};

use crate::error::{RootError, RootResult};

/// The signed part of a root.
///
/// A root's identity is the hash of this struct's canonical encoding, and
/// that hash is what the owner signs and what the next root stores as its
/// `prev`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootBody {
    pub seq: u64,
    /// Unix time in nanoseconds at finalization.
    pub time: i64,
    pub registry: RegistryReference,
    pub refs: Vec<Dynamic>,
    /// Hash of the previous root's body; `None` only at seq 0.
    pub prev: Option<Hash>,
}

impl RootBody {
    pub fn encode(&self) -> RootResult<Vec<u8>> {
        Ok(codec::encode(self)?)
    }

    /// Decode a body, rejecting any input that is not the canonical
    /// encoding of the result.
    pub fn decode(bytes: &[u8]) -> RootResult<Self> {
        let body: Self = codec::decode(bytes)?;
        if body.encode()? != bytes {
            return Err(RootError::Decode("root body is not canonically encoded".into()));
        }
        if let Some(bad) = body.refs.iter().find(|d| !d.is_valid()) {
            return Err(RootError::Decode(format!("half-set dynamic reference {bad:?}")));
        }
        Ok(body)
    }
}

/// A persisted pack together with its decoded body.
#[derive(Clone, Debug)]
pub(crate) struct RootRecord {
    pub pack: RootPack,
    pub body: RootBody,
}

impl RootRecord {
    pub fn from_pack(pack: RootPack) -> RootResult<Self> {
        let body = RootBody::decode(&pack.root)?;
        if body.seq != pack.seq {
            return Err(RootError::Decode(format!(
                "pack seq {} disagrees with body seq {}",
                pack.seq, body.seq
            )));
        }
        Ok(Self { pack, body })
    }
}

impl ChainLink for RootRecord {
    fn seq(&self) -> u64 {
        self.body.seq
    }

    fn prev_hash(&self) -> Option<Hash> {
        self.body.prev
    }

    fn link_hash(&self) -> Hash {
        self.pack.hash()
    }
}

pub(crate) fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxo_types::{Reference, SchemaReference};

    fn body(seq: u64, prev: Option<Hash>) -> RootBody {
        RootBody {
            seq,
            time: 1_700_000_000_000_000_000,
            registry: RegistryReference(Hash::sum(b"registry")),
            refs: vec![Dynamic::new(
                SchemaReference(Hash::sum(b"schema")),
                Reference(Hash::sum(b"object")),
            )],
            prev,
        }
    }

    #[test]
    fn encode_decode_is_identity_on_bytes() {
        let bytes = body(3, Some(Hash::sum(b"prev"))).encode().unwrap();
        let decoded = RootBody::decode(&bytes).unwrap();
        assert_eq!(decoded.encode().unwrap(), bytes);
        assert_eq!(decoded.seq, 3);
    }

    #[test]
    fn invalid_option_tag_rejected() {
        let mut bytes = body(0, None).encode().unwrap();
        let last = bytes.len() - 1;
        assert_eq!(bytes[last], 0);
        bytes[last] = 7;
        assert!(RootBody::decode(&bytes).is_err());
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = body(0, None).encode().unwrap();
        bytes.push(0);
        assert!(matches!(RootBody::decode(&bytes), Err(RootError::Decode(_))));
    }

    #[test]
    fn half_set_dynamic_rejected() {
        let mut b = body(0, None);
        b.refs.push(Dynamic::new(SchemaReference::default(), Reference(Hash::sum(b"x"))));
        let bytes = b.encode().unwrap();
        assert!(matches!(RootBody::decode(&bytes), Err(RootError::Decode(_))));
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_nanos() > 1_577_836_800_000_000_000);
    }
}

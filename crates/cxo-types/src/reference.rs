//! Typed pointers between stored blobs.
//!
//! All pointer types are thin wrappers over a [`Hash`]. The wrappers carry
//! no extra bytes on the wire: a `Reference` encodes as 32 bytes and a
//! `Dynamic` as 64.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::Hash;

macro_rules! hash_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Hash);

        impl $name {
            /// The underlying content hash.
            pub fn hash(&self) -> Hash {
                self.0
            }

            /// Returns `true` if the pointer is unset.
            pub fn is_null(&self) -> bool {
                self.0.is_null()
            }
        }

        impl From<Hash> for $name {
            fn from(hash: Hash) -> Self {
                Self(hash)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0.short_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

hash_newtype!(
    /// Pointer to a single stored blob.
    Reference
);

hash_newtype!(
    /// Pointer to a stored blob holding an ordered list of [`Reference`]s.
    ///
    /// The list itself is one blob, so the hash of a `References` commits to
    /// every element and their order.
    References
);

hash_newtype!(
    /// Hash of a schema's canonical encoding.
    SchemaReference
);

hash_newtype!(
    /// Hash of a sealed registry's canonical encoding.
    RegistryReference
);

/// Self-describing pointer: which schema the object uses and where it is.
///
/// A `Dynamic` carries enough information to decode its target without any
/// outside type context, provided the schema is known to the registry in use.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dynamic {
    pub schema: SchemaReference,
    pub object: Reference,
}

impl Dynamic {
    pub fn new(schema: SchemaReference, object: Reference) -> Self {
        Self { schema, object }
    }

    /// Both halves unset.
    pub fn is_blank(&self) -> bool {
        self.schema.is_null() && self.object.is_null()
    }

    /// A dynamic is valid when both halves are set or both are unset.
    pub fn is_valid(&self) -> bool {
        self.schema.is_null() == self.object.is_null()
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dynamic({}:{})",
            self.schema.0.short_hex(),
            self.object.0.short_hex()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_wraps_hash() {
        let hash = Hash::sum(b"object");
        let reference = Reference::from(hash);
        assert_eq!(reference.hash(), hash);
        assert!(!reference.is_null());
        assert!(Reference::default().is_null());
    }

    #[test]
    fn references_json_is_plain_hex() {
        let refs = References(Hash::sum(b"list"));
        let json = serde_json::to_string(&refs).unwrap();
        assert_eq!(json, format!("\"{}\"", refs.0.to_hex()));
    }

    #[test]
    fn dynamic_validity() {
        let schema = SchemaReference(Hash::sum(b"schema"));
        let object = Reference(Hash::sum(b"object"));
        assert!(Dynamic::new(schema, object).is_valid());
        assert!(Dynamic::default().is_valid());
        assert!(Dynamic::default().is_blank());
        assert!(!Dynamic::new(schema, Reference::default()).is_valid());
        assert!(!Dynamic::new(SchemaReference::default(), object).is_valid());
    }

    #[test]
    fn debug_is_short() {
        let reference = Reference(Hash::sum(b"x"));
        let debug = format!("{reference:?}");
        assert!(debug.starts_with("Reference("));
        assert_eq!(debug.len(), "Reference()".len() + 8);
    }
}

use std::fmt;

use cxo_types::{Dynamic, Hash, Reference, References, SchemaReference};
use serde::de::{self, DeserializeSeed, Deserializer, EnumAccess, MapAccess, SeqAccess};
use serde::de::{VariantAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{SchemaError, SchemaResult};

/// Deepest `List`/`Struct` nesting a type may have. The outermost type is
/// at depth 1.
pub const MAX_TYPE_DEPTH: usize = 64;

/// Structural type of a value or field.
///
/// Reference-typed variants carry an optional target schema name. A
/// targeted reference lets a graph walk decode and descend into the blob it
/// points at; an untargeted one is an opaque leaf.
///
/// Decoding a `FieldType` refuses nesting deeper than [`MAX_TYPE_DEPTH`], so
/// a type received from a peer cannot exhaust the stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    /// A single [`Reference`], optionally to a named schema.
    Reference(Option<String>),
    /// A [`References`] list blob whose elements point at a named schema.
    References(Option<String>),
    /// A self-describing [`Dynamic`] pointer.
    Dynamic,
    /// Variable-length sequence of one element type.
    List(Box<FieldType>),
    /// Ordered named fields.
    Struct(Vec<Field>),
}

/// A named field of a struct type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
}

/// A named type registered in a [`Registry`](crate::Registry).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub ty: FieldType,
}

impl FieldType {
    /// Build a struct type from `(name, type)` pairs, in order.
    pub fn structure<'a>(fields: impl IntoIterator<Item = (&'a str, FieldType)>) -> Self {
        Self::Struct(
            fields
                .into_iter()
                .map(|(name, ty)| Field {
                    name: name.to_string(),
                    ty,
                })
                .collect(),
        )
    }

    /// A reference to a blob of the named schema.
    pub fn reference_to(schema: &str) -> Self {
        Self::Reference(Some(schema.to_string()))
    }

    /// A references list whose elements are of the named schema.
    pub fn references_to(schema: &str) -> Self {
        Self::References(Some(schema.to_string()))
    }

    pub fn list_of(ty: FieldType) -> Self {
        Self::List(Box::new(ty))
    }

    /// Schema names this type points at through targeted references,
    /// in field order.
    pub fn targets(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(ty) = stack.pop() {
            match ty {
                FieldType::Reference(Some(name)) | FieldType::References(Some(name)) => {
                    out.push(name.as_str())
                }
                FieldType::List(inner) => stack.push(inner),
                FieldType::Struct(fields) => {
                    stack.extend(fields.iter().rev().map(|f| &f.ty));
                }
                _ => {}
            }
        }
        out
    }

    /// Check that values of this type can be decoded safely: nesting stays
    /// within [`MAX_TYPE_DEPTH`] and every struct has at least one field.
    ///
    /// A field-less struct encodes to zero bytes, so a list of them would
    /// let an eight-byte length prefix stand for any number of elements.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut stack = vec![(self, 1usize)];
        while let Some((ty, depth)) = stack.pop() {
            if depth > MAX_TYPE_DEPTH {
                return Err(SchemaError::InvalidType(format!(
                    "nested deeper than {MAX_TYPE_DEPTH} levels"
                )));
            }
            match ty {
                FieldType::List(inner) => stack.push((inner, depth + 1)),
                FieldType::Struct(fields) if fields.is_empty() => {
                    return Err(SchemaError::InvalidType("struct without fields".to_string()));
                }
                FieldType::Struct(fields) => {
                    stack.extend(fields.iter().map(|f| (&f.ty, depth + 1)));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Schema {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Content address of this schema: the hash of its canonical encoding.
    pub fn reference(&self) -> SchemaResult<SchemaReference> {
        let bytes = codec::encode(self)?;
        Ok(SchemaReference(Hash::sum(&bytes)))
    }
}

/// Types that can describe their own encoding as a [`FieldType`].
///
/// The serde encoding of an implementor must match what
/// [`codec::decode_value`] expects for the returned type. Derived
/// `Serialize` on a struct whose fields are all `Schematic` satisfies this
/// when `field_type` lists the fields in declaration order.
///
/// ```
/// use cxo_schema::{FieldType, Schematic};
/// use cxo_types::References;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     name: String,
///     age: u32,
///     friends: References,
/// }
///
/// impl Schematic for User {
///     fn field_type() -> FieldType {
///         FieldType::structure([
///             ("name", String::field_type()),
///             ("age", u32::field_type()),
///             ("friends", FieldType::references_to("User")),
///         ])
///     }
/// }
/// ```
pub trait Schematic {
    fn field_type() -> FieldType;
}

macro_rules! primitive_schematic {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Schematic for $ty {
                fn field_type() -> FieldType {
                    FieldType::$variant
                }
            }
        )*
    };
}

primitive_schematic! {
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => String,
    Dynamic => Dynamic,
}

impl Schematic for Reference {
    fn field_type() -> FieldType {
        FieldType::Reference(None)
    }
}

impl Schematic for References {
    fn field_type() -> FieldType {
        FieldType::References(None)
    }
}

impl<T: Schematic> Schematic for Vec<T> {
    fn field_type() -> FieldType {
        FieldType::List(Box::new(T::field_type()))
    }
}

// ---------------------------------------------------------------------------
// Depth-limited decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(variant_identifier)]
enum Tag {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Reference,
    References,
    Dynamic,
    List,
    Struct,
}

const VARIANTS: &[&str] = &[
    "Bool",
    "U8",
    "U16",
    "U32",
    "U64",
    "I8",
    "I16",
    "I32",
    "I64",
    "F32",
    "F64",
    "String",
    "Bytes",
    "Reference",
    "References",
    "Dynamic",
    "List",
    "Struct",
];

#[derive(Deserialize)]
#[serde(field_identifier, rename_all = "lowercase")]
enum FieldKey {
    Name,
    Ty,
}

fn too_deep<E: de::Error>() -> E {
    E::custom(format_args!("field type nested deeper than {MAX_TYPE_DEPTH} levels"))
}

fn unit<'de, V: VariantAccess<'de>>(variant: V, ty: FieldType) -> Result<FieldType, V::Error> {
    variant.unit_variant().map(|()| ty)
}

/// Decodes a [`FieldType`] found `depth` levels down.
#[derive(Clone, Copy)]
struct FieldTypeSeed {
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for FieldTypeSeed {
    type Value = FieldType;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<FieldType, D::Error> {
        if self.depth > MAX_TYPE_DEPTH {
            return Err(too_deep());
        }
        deserializer.deserialize_enum("FieldType", VARIANTS, self)
    }
}

impl<'de> Visitor<'de> for FieldTypeSeed {
    type Value = FieldType;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a field type")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<FieldType, A::Error> {
        let nested = self.depth + 1;
        let (tag, variant) = data.variant::<Tag>()?;
        match tag {
            Tag::Bool => unit(variant, FieldType::Bool),
            Tag::U8 => unit(variant, FieldType::U8),
            Tag::U16 => unit(variant, FieldType::U16),
            Tag::U32 => unit(variant, FieldType::U32),
            Tag::U64 => unit(variant, FieldType::U64),
            Tag::I8 => unit(variant, FieldType::I8),
            Tag::I16 => unit(variant, FieldType::I16),
            Tag::I32 => unit(variant, FieldType::I32),
            Tag::I64 => unit(variant, FieldType::I64),
            Tag::F32 => unit(variant, FieldType::F32),
            Tag::F64 => unit(variant, FieldType::F64),
            Tag::String => unit(variant, FieldType::String),
            Tag::Bytes => unit(variant, FieldType::Bytes),
            Tag::Dynamic => unit(variant, FieldType::Dynamic),
            Tag::Reference => variant.newtype_variant().map(FieldType::Reference),
            Tag::References => variant.newtype_variant().map(FieldType::References),
            Tag::List => variant
                .newtype_variant_seed(FieldTypeSeed { depth: nested })
                .map(|inner| FieldType::List(Box::new(inner))),
            Tag::Struct => variant
                .newtype_variant_seed(FieldsSeed { depth: nested })
                .map(FieldType::Struct),
        }
    }
}

/// Decodes the field list of a struct type whose fields sit at `depth`.
#[derive(Clone, Copy)]
struct FieldsSeed {
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for FieldsSeed {
    type Value = Vec<Field>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Vec<Field>, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for FieldsSeed {
    type Value = Vec<Field>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of fields")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<Field>, A::Error> {
        let mut fields = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(64));
        while let Some(field) = seq.next_element_seed(FieldSeed { depth: self.depth })? {
            fields.push(field);
        }
        Ok(fields)
    }
}

#[derive(Clone, Copy)]
struct FieldSeed {
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for FieldSeed {
    type Value = Field;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Field, D::Error> {
        deserializer.deserialize_struct("Field", &["name", "ty"], self)
    }
}

impl<'de> Visitor<'de> for FieldSeed {
    type Value = Field;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a field")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Field, A::Error> {
        let name = seq
            .next_element::<String>()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let ty = seq
            .next_element_seed(FieldTypeSeed { depth: self.depth })?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(Field { name, ty })
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Field, A::Error> {
        let mut name = None;
        let mut ty = None;
        while let Some(key) = map.next_key::<FieldKey>()? {
            match key {
                FieldKey::Name if name.is_some() => return Err(de::Error::duplicate_field("name")),
                FieldKey::Ty if ty.is_some() => return Err(de::Error::duplicate_field("ty")),
                FieldKey::Name => name = Some(map.next_value::<String>()?),
                FieldKey::Ty => {
                    ty = Some(map.next_value_seed(FieldTypeSeed { depth: self.depth })?)
                }
            }
        }
        Ok(Field {
            name: name.ok_or_else(|| de::Error::missing_field("name"))?,
            ty: ty.ok_or_else(|| de::Error::missing_field("ty"))?,
        })
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        FieldTypeSeed { depth: 1 }.deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_reference_is_stable_and_name_sensitive() {
        let a = Schema::new("cxo.User", String::field_type());
        let b = Schema::new("cxo.User", String::field_type());
        let c = Schema::new("cxo.Other", String::field_type());
        assert_eq!(a.reference().unwrap(), b.reference().unwrap());
        assert_ne!(a.reference().unwrap(), c.reference().unwrap());
    }

    #[test]
    fn targets_in_field_order() {
        let ty = FieldType::structure([
            ("owner", FieldType::reference_to("User")),
            ("tags", FieldType::list_of(FieldType::reference_to("Tag"))),
            ("blob", Reference::field_type()),
            ("items", FieldType::references_to("Item")),
        ]);
        assert_eq!(ty.targets(), vec!["User", "Tag", "Item"]);
    }

    #[test]
    fn vec_of_primitives() {
        assert_eq!(
            Vec::<u16>::field_type(),
            FieldType::List(Box::new(FieldType::U16))
        );
    }

    // -----------------------------------------------------------------------
    // Validation and decoding limits
    // -----------------------------------------------------------------------

    fn nested_list(depth: usize) -> FieldType {
        let mut ty = FieldType::U8;
        for _ in 1..depth {
            ty = FieldType::list_of(ty);
        }
        ty
    }

    #[test]
    fn validate_rejects_empty_struct_anywhere() {
        let ty = FieldType::structure([(
            "items",
            FieldType::list_of(FieldType::structure([])),
        )]);
        assert!(matches!(ty.validate(), Err(SchemaError::InvalidType(_))));
        assert!(FieldType::structure([("a", FieldType::U8)]).validate().is_ok());
    }

    #[test]
    fn validate_bounds_depth() {
        assert!(nested_list(MAX_TYPE_DEPTH).validate().is_ok());
        assert!(matches!(
            nested_list(MAX_TYPE_DEPTH + 1).validate(),
            Err(SchemaError::InvalidType(_))
        ));
    }

    #[test]
    fn field_type_decodes_in_both_formats() {
        let ty = FieldType::structure([
            ("name", FieldType::String),
            ("friends", FieldType::references_to("User")),
            ("tags", FieldType::list_of(FieldType::Reference(None))),
        ]);
        let bytes = codec::encode(&ty).unwrap();
        assert_eq!(codec::decode::<FieldType>(&bytes).unwrap(), ty);

        let json = serde_json::to_string(&ty).unwrap();
        assert_eq!(serde_json::from_str::<FieldType>(&json).unwrap(), ty);
    }

    #[test]
    fn decode_stops_at_depth_limit() {
        let ok = codec::encode(&nested_list(MAX_TYPE_DEPTH)).unwrap();
        assert_eq!(
            codec::decode::<FieldType>(&ok).unwrap(),
            nested_list(MAX_TYPE_DEPTH)
        );

        // List tag (16) repeated far past the limit, never terminated.
        let hostile: Vec<u8> = std::iter::repeat(16u32.to_le_bytes())
            .take(200_000)
            .flatten()
            .collect();
        assert!(matches!(
            codec::decode::<FieldType>(&hostile),
            Err(SchemaError::Decode(_))
        ));
    }
}

//! Generic, schema-decoded values.

use std::fmt;

use cxo_types::{Dynamic, Hash, Reference, References};
use serde::de::{self, DeserializeSeed, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

use crate::schema::{Field, FieldType, MAX_TYPE_DEPTH};

/// A value decoded without compile-time type knowledge.
///
/// Serializing a `Value` writes only its payload, so a `Value` decoded under
/// a schema re-encodes to exactly the bytes it came from. Human-readable
/// serializers (JSON) get structs as maps keyed by field name.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Reference(Reference),
    References(References),
    Dynamic(Dynamic),
    List(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

/// An outgoing pointer found inside a decoded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge<'t> {
    /// A single reference and the schema it targets, if any.
    Reference {
        hash: Hash,
        target: Option<&'t str>,
    },
    /// A references-list blob and the schema of its elements, if any.
    References {
        hash: Hash,
        target: Option<&'t str>,
    },
    /// A self-describing pointer.
    Dynamic(Dynamic),
}

impl Value {
    /// Field of a struct value by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Pointers contained in this value, interpreted under `ty`, in field
    /// order. Unset (null) pointers are skipped.
    ///
    /// `ty` must be the type the value was decoded with; mismatched
    /// positions are ignored.
    pub fn edges<'t>(&self, ty: &'t FieldType) -> Vec<Edge<'t>> {
        let mut out = Vec::new();
        let mut stack = vec![(self, ty)];
        while let Some((value, ty)) = stack.pop() {
            match (value, ty) {
                (Value::Reference(r), FieldType::Reference(target)) if !r.is_null() => {
                    out.push(Edge::Reference {
                        hash: r.hash(),
                        target: target.as_deref(),
                    });
                }
                (Value::References(r), FieldType::References(target)) if !r.is_null() => {
                    out.push(Edge::References {
                        hash: r.hash(),
                        target: target.as_deref(),
                    });
                }
                (Value::Dynamic(d), FieldType::Dynamic) if !d.object.is_null() => {
                    out.push(Edge::Dynamic(*d));
                }
                (Value::List(items), FieldType::List(inner)) => {
                    stack.extend(items.iter().rev().map(|item| (item, inner.as_ref())));
                }
                (Value::Struct(values), FieldType::Struct(fields)) => {
                    stack.extend(
                        values
                            .iter()
                            .zip(fields.iter())
                            .rev()
                            .map(|((_, v), f)| (v, &f.ty)),
                    );
                }
                _ => {}
            }
        }
        out
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::U8(v) => serializer.serialize_u8(*v),
            Value::U16(v) => serializer.serialize_u16(*v),
            Value::U32(v) => serializer.serialize_u32(*v),
            Value::U64(v) => serializer.serialize_u64(*v),
            Value::I8(v) => serializer.serialize_i8(*v),
            Value::I16(v) => serializer.serialize_i16(*v),
            Value::I32(v) => serializer.serialize_i32(*v),
            Value::I64(v) => serializer.serialize_i64(*v),
            Value::F32(v) => serializer.serialize_f32(*v),
            Value::F64(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Bytes(v) => serializer.serialize_bytes(v),
            Value::Reference(v) => v.serialize(serializer),
            Value::References(v) => v.serialize(serializer),
            Value::Dynamic(v) => v.serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Struct(fields) if serializer.is_human_readable() => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Value::Struct(fields) => {
                let mut tuple = serializer.serialize_tuple(fields.len())?;
                for (_, value) in fields {
                    tuple.serialize_element(value)?;
                }
                tuple.end()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Schema-driven decoding
// ---------------------------------------------------------------------------

/// Decodes one value of a known [`FieldType`] from a non-self-describing
/// format. Refuses to descend past [`MAX_TYPE_DEPTH`].
#[derive(Clone, Copy)]
pub(crate) struct ValueSeed<'t> {
    ty: &'t FieldType,
    depth: usize,
}

impl<'t> ValueSeed<'t> {
    pub(crate) fn new(ty: &'t FieldType) -> Self {
        Self { ty, depth: 1 }
    }

    fn child(self, ty: &'t FieldType) -> Self {
        Self {
            ty,
            depth: self.depth + 1,
        }
    }
}

macro_rules! primitive_visitor {
    ($name:ident, $ty:ty, $method:ident, $variant:ident, $expect:literal) => {
        struct $name;

        impl<'de> Visitor<'de> for $name {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str($expect)
            }

            fn $method<E: de::Error>(self, v: $ty) -> Result<Value, E> {
                Ok(Value::$variant(v))
            }
        }
    };
}

primitive_visitor!(BoolVisitor, bool, visit_bool, Bool, "a bool");
primitive_visitor!(U8Visitor, u8, visit_u8, U8, "a u8");
primitive_visitor!(U16Visitor, u16, visit_u16, U16, "a u16");
primitive_visitor!(U32Visitor, u32, visit_u32, U32, "a u32");
primitive_visitor!(U64Visitor, u64, visit_u64, U64, "a u64");
primitive_visitor!(I8Visitor, i8, visit_i8, I8, "an i8");
primitive_visitor!(I16Visitor, i16, visit_i16, I16, "an i16");
primitive_visitor!(I32Visitor, i32, visit_i32, I32, "an i32");
primitive_visitor!(I64Visitor, i64, visit_i64, I64, "an i64");
primitive_visitor!(F32Visitor, f32, visit_f32, F32, "an f32");
primitive_visitor!(F64Visitor, f64, visit_f64, F64, "an f64");

struct StringVisitor;

impl<'de> Visitor<'de> for StringVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }
}

struct BytesVisitor;

impl<'de> Visitor<'de> for BytesVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a byte string")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(v))
    }
}

struct ListVisitor<'t> {
    seed: ValueSeed<'t>,
    inner: &'t FieldType,
}

impl<'de, 't> Visitor<'de> for ListVisitor<'t> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        // Length prefixes are untrusted; cap the preallocation.
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
        while let Some(item) = seq.next_element_seed(self.seed.child(self.inner))? {
            items.push(item);
        }
        Ok(Value::List(items))
    }
}

struct StructVisitor<'t> {
    seed: ValueSeed<'t>,
    fields: &'t [Field],
}

impl<'de, 't> Visitor<'de> for StructVisitor<'t> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a struct with {} fields", self.fields.len())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut values = Vec::with_capacity(self.fields.len());
        for (index, field) in self.fields.iter().enumerate() {
            let value = seq
                .next_element_seed(self.seed.child(&field.ty))?
                .ok_or_else(|| de::Error::invalid_length(index, &self))?;
            values.push((field.name.clone(), value));
        }
        Ok(Value::Struct(values))
    }
}

impl<'de, 't> DeserializeSeed<'de> for ValueSeed<'t> {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        if self.depth > MAX_TYPE_DEPTH {
            return Err(de::Error::custom(format_args!(
                "value nested deeper than {MAX_TYPE_DEPTH} levels"
            )));
        }
        match self.ty {
            FieldType::Bool => deserializer.deserialize_bool(BoolVisitor),
            FieldType::U8 => deserializer.deserialize_u8(U8Visitor),
            FieldType::U16 => deserializer.deserialize_u16(U16Visitor),
            FieldType::U32 => deserializer.deserialize_u32(U32Visitor),
            FieldType::U64 => deserializer.deserialize_u64(U64Visitor),
            FieldType::I8 => deserializer.deserialize_i8(I8Visitor),
            FieldType::I16 => deserializer.deserialize_i16(I16Visitor),
            FieldType::I32 => deserializer.deserialize_i32(I32Visitor),
            FieldType::I64 => deserializer.deserialize_i64(I64Visitor),
            FieldType::F32 => deserializer.deserialize_f32(F32Visitor),
            FieldType::F64 => deserializer.deserialize_f64(F64Visitor),
            FieldType::String => deserializer.deserialize_string(StringVisitor),
            FieldType::Bytes => deserializer.deserialize_byte_buf(BytesVisitor),
            FieldType::Reference(_) => Reference::deserialize(deserializer).map(Value::Reference),
            FieldType::References(_) => {
                References::deserialize(deserializer).map(Value::References)
            }
            FieldType::Dynamic => Dynamic::deserialize(deserializer).map(Value::Dynamic),
            FieldType::List(inner) => deserializer.deserialize_seq(ListVisitor { seed: self, inner }),
            FieldType::Struct(fields) => {
                deserializer.deserialize_tuple(fields.len(), StructVisitor { seed: self, fields })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bincode::Options;

    fn user_type() -> FieldType {
        FieldType::structure([
            ("name", FieldType::String),
            ("friends", FieldType::references_to("User")),
            ("avatar", FieldType::Reference(None)),
            ("pets", FieldType::list_of(FieldType::reference_to("Pet"))),
            ("extra", FieldType::Dynamic),
        ])
    }

    #[test]
    fn field_lookup() {
        let v = Value::Struct(vec![("name".into(), Value::String("Alice".into()))]);
        assert_eq!(v.field("name"), Some(&Value::String("Alice".into())));
        assert_eq!(v.field("age"), None);
        assert_eq!(Value::U8(1).field("name"), None);
    }

    #[test]
    fn edges_follow_field_order_and_skip_null() {
        let friends = Hash::sum(b"friends");
        let pet_a = Hash::sum(b"pet-a");
        let pet_b = Hash::sum(b"pet-b");
        let value = Value::Struct(vec![
            ("name".into(), Value::String("Alice".into())),
            ("friends".into(), Value::References(References(friends))),
            ("avatar".into(), Value::Reference(Reference::default())),
            (
                "pets".into(),
                Value::List(vec![
                    Value::Reference(Reference(pet_a)),
                    Value::Reference(Reference(pet_b)),
                ]),
            ),
            ("extra".into(), Value::Dynamic(Dynamic::default())),
        ]);
        let ty = user_type();
        assert_eq!(
            value.edges(&ty),
            vec![
                Edge::References {
                    hash: friends,
                    target: Some("User")
                },
                Edge::Reference {
                    hash: pet_a,
                    target: Some("Pet")
                },
                Edge::Reference {
                    hash: pet_b,
                    target: Some("Pet")
                },
            ]
        );
    }

    #[test]
    fn json_renders_struct_as_map() {
        let value = Value::Struct(vec![
            ("name".into(), Value::String("Alice".into())),
            ("age".into(), Value::U32(20)),
        ]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Alice", "age": 20}));
    }

    #[test]
    fn seed_refuses_to_descend_past_depth_limit() {
        let mut ty = FieldType::U8;
        for _ in 0..MAX_TYPE_DEPTH {
            ty = FieldType::list_of(ty);
        }
        // One element per level; the innermost U8 sits past the limit.
        let bytes: Vec<u8> = std::iter::repeat(1u64.to_le_bytes())
            .take(MAX_TYPE_DEPTH)
            .flatten()
            .chain([7u8])
            .collect();
        let result = crate::codec::options().deserialize_seed(ValueSeed::new(&ty), &bytes[..]);
        assert!(result.is_err());

        let ok = FieldType::list_of(FieldType::list_of(FieldType::U8));
        let bytes = [&1u64.to_le_bytes()[..], &1u64.to_le_bytes()[..], &[7u8][..]].concat();
        let value = crate::codec::options()
            .deserialize_seed(ValueSeed::new(&ok), &bytes[..])
            .unwrap();
        assert_eq!(value, Value::List(vec![Value::List(vec![Value::U8(7)])]));
    }
}

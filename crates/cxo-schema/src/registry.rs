use std::collections::{BTreeMap, HashMap};

use cxo_types::{Hash, RegistryReference, SchemaReference};
use tracing::debug;

use crate::codec;
use crate::error::{SchemaError, SchemaResult};
use crate::schema::{FieldType, Schema, Schematic};
use crate::value::Value;

/// A collection of named schemas, sealed once and immutable afterwards.
///
/// Before [`done`](Registry::done) the registry accepts registrations from a
/// single owner. Sealing validates that every typed reference resolves to a
/// registered name and fixes the registry's canonical encoding and
/// [`RegistryReference`]. A sealed registry is freely shareable.
///
/// The canonical encoding is the list of schemas sorted by name, so two
/// registries with the same contents have the same reference regardless of
/// registration order.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    entries: BTreeMap<String, (Schema, SchemaReference)>,
    by_reference: HashMap<SchemaReference, String>,
    sealed: Option<Sealed>,
}

#[derive(Clone, Debug)]
struct Sealed {
    reference: RegistryReference,
    encoded: Vec<u8>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema of `T` under `name`.
    pub fn register<T: Schematic>(&mut self, name: &str) -> SchemaResult<SchemaReference> {
        self.register_type(name, T::field_type())
    }

    /// Register an explicit field type under `name`.
    ///
    /// The type must pass [`FieldType::validate`].
    pub fn register_type(&mut self, name: &str, ty: FieldType) -> SchemaResult<SchemaReference> {
        if self.sealed.is_some() {
            return Err(SchemaError::AlreadySealed);
        }
        if name.is_empty() {
            return Err(SchemaError::InvalidName(name.to_string()));
        }
        if self.entries.contains_key(name) {
            return Err(SchemaError::DuplicateName(name.to_string()));
        }
        ty.validate()?;
        let schema = Schema::new(name, ty);
        let reference = schema.reference()?;
        self.by_reference.insert(reference, name.to_string());
        self.entries.insert(name.to_string(), (schema, reference));
        Ok(reference)
    }

    /// Seal the registry. Idempotent.
    pub fn done(&mut self) -> SchemaResult<()> {
        if self.sealed.is_some() {
            return Ok(());
        }
        for (schema, _) in self.entries.values() {
            for target in schema.ty.targets() {
                if !self.entries.contains_key(target) {
                    return Err(SchemaError::UnresolvedReference {
                        schema: schema.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
        let schemas: Vec<&Schema> = self.entries.values().map(|(s, _)| s).collect();
        let encoded = codec::encode(&schemas)?;
        let reference = RegistryReference(Hash::sum(&encoded));
        debug!(
            registry = %reference.hash().short_hex(),
            schemas = schemas.len(),
            "sealed registry"
        );
        self.sealed = Some(Sealed { reference, encoded });
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    /// The registry's content address. Fails unless sealed.
    pub fn reference(&self) -> SchemaResult<RegistryReference> {
        self.sealed
            .as_ref()
            .map(|s| s.reference)
            .ok_or(SchemaError::NotSealed)
    }

    /// Canonical encoding of a sealed registry.
    pub fn encode(&self) -> SchemaResult<&[u8]> {
        self.sealed
            .as_ref()
            .map(|s| s.encoded.as_slice())
            .ok_or(SchemaError::NotSealed)
    }

    /// Rebuild a sealed registry from its canonical encoding.
    ///
    /// Non-canonical input (unsorted or duplicate names) is rejected, so the
    /// decoded registry's reference is always the hash of `bytes`.
    pub fn decode(bytes: &[u8]) -> SchemaResult<Self> {
        let schemas: Vec<Schema> = codec::decode(bytes)?;
        let mut registry = Self::new();
        for schema in schemas {
            registry.register_type(&schema.name, schema.ty)?;
        }
        registry.done()?;
        if registry.encode()? != bytes {
            return Err(SchemaError::Decode(
                "registry encoding is not canonical".to_string(),
            ));
        }
        Ok(registry)
    }

    pub fn schema_by_name(&self, name: &str) -> SchemaResult<&Schema> {
        self.entries
            .get(name)
            .map(|(schema, _)| schema)
            .ok_or_else(|| SchemaError::SchemaNotFound(name.to_string()))
    }

    pub fn schema_by_reference(&self, reference: &SchemaReference) -> SchemaResult<&Schema> {
        self.by_reference
            .get(reference)
            .and_then(|name| self.entries.get(name))
            .map(|(schema, _)| schema)
            .ok_or(SchemaError::SchemaRefNotFound(*reference))
    }

    /// Reference of the schema registered under `name`.
    pub fn schema_reference(&self, name: &str) -> SchemaResult<SchemaReference> {
        self.entries
            .get(name)
            .map(|(_, reference)| *reference)
            .ok_or_else(|| SchemaError::SchemaNotFound(name.to_string()))
    }

    /// Decode `bytes` under the schema `reference` points at.
    pub fn decode_value(&self, reference: &SchemaReference, bytes: &[u8]) -> SchemaResult<Value> {
        let schema = self.schema_by_reference(reference)?;
        codec::decode_value(bytes, &schema.ty).map_err(|e| SchemaError::Mismatch {
            schema: schema.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

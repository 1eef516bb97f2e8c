//! Graph traversal shared by completeness checks and want/got diffing.
//!
//! Nodes are hashes; a node's children are the references found in its
//! decoded form. The walk is depth-first over an explicit stack with a
//! visited set, so shared subgraphs and cycles are visited once and deep
//! graphs cannot overflow the call stack.
//!
//! A node first reached opaquely may later be reached with a known shape;
//! that second visit still descends. Each hash is reported at most once.

use std::collections::HashSet;
use std::ops::ControlFlow;

use cxo_schema::value::Edge;
use cxo_schema::{codec, FieldType, Registry};
use cxo_store::ObjectStore;
use cxo_types::{Dynamic, Hash, Reference};
use tracing::warn;

use crate::error::RootResult;

/// How a node's bytes are interpreted.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Shape<'r> {
    /// Decode under this type and descend into its references.
    Typed(&'r FieldType),
    /// A references-list blob; elements use the named schema if resolvable.
    List(Option<&'r str>),
    /// Present or absent, but never decoded.
    Opaque,
}

pub(crate) struct Walker<'a> {
    db: &'a dyn ObjectStore,
    registry: Option<&'a Registry>,
    /// Hashes already expanded under a typed or list shape.
    visited: HashSet<Hash>,
    /// Hashes seen only as opaque leaves so far.
    opaque: HashSet<Hash>,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(db: &'a dyn ObjectStore, registry: Option<&'a Registry>) -> Self {
        Self {
            db,
            registry,
            visited: HashSet::new(),
            opaque: HashSet::new(),
        }
    }

    /// Starting node for a top-level dynamic reference.
    pub(crate) fn dynamic_node(&self, dynamic: &Dynamic) -> (Hash, Shape<'a>) {
        (dynamic.object.hash(), self.shape_of_schema_ref(dynamic))
    }

    fn shape_of_schema_ref(&self, dynamic: &Dynamic) -> Shape<'a> {
        self.registry
            .and_then(|reg| reg.schema_by_reference(&dynamic.schema).ok())
            .map_or(Shape::Opaque, |schema| Shape::Typed(&schema.ty))
    }

    fn shape_of_name(&self, target: Option<&str>) -> Shape<'a> {
        target
            .and_then(|name| self.registry?.schema_by_name(name).ok())
            .map_or(Shape::Opaque, |schema| Shape::Typed(&schema.ty))
    }

    fn list_shape(&self, target: Option<&str>) -> Shape<'a> {
        let name = target.and_then(|name| {
            self.registry?
                .schema_by_name(name)
                .ok()
                .map(|schema| schema.name.as_str())
        });
        Shape::List(name)
    }

    /// Walk from `starts`, calling `on_missing` for every reachable absent
    /// hash and `on_present` for every reachable stored hash. Descent stops
    /// at absent nodes. Either callback may break the walk early.
    pub(crate) fn walk<M, P>(
        &mut self,
        starts: Vec<(Hash, Shape<'a>)>,
        mut on_missing: M,
        mut on_present: P,
    ) -> RootResult<ControlFlow<()>>
    where
        M: FnMut(Hash) -> ControlFlow<()>,
        P: FnMut(Hash) -> ControlFlow<()>,
    {
        let mut stack = starts;
        stack.reverse();

        while let Some((hash, shape)) = stack.pop() {
            if hash.is_null() || self.visited.contains(&hash) {
                continue;
            }
            let reported = self.opaque.contains(&hash);
            match shape {
                Shape::Opaque if reported => continue,
                Shape::Opaque => self.opaque.insert(hash),
                _ => self.visited.insert(hash),
            };
            let Some(data) = self.db.get(&hash)? else {
                if !reported && on_missing(hash).is_break() {
                    return Ok(ControlFlow::Break(()));
                }
                continue;
            };
            if !reported && on_present(hash).is_break() {
                return Ok(ControlFlow::Break(()));
            }

            let mut children = self.children(hash, &data, shape);
            children.reverse();
            stack.extend(children);
        }
        Ok(ControlFlow::Continue(()))
    }

    fn children(&self, hash: Hash, data: &[u8], shape: Shape<'a>) -> Vec<(Hash, Shape<'a>)> {
        match shape {
            Shape::Opaque => Vec::new(),
            Shape::Typed(ty) => match codec::decode_value(data, ty) {
                Ok(value) => value
                    .edges(ty)
                    .into_iter()
                    .map(|edge| self.resolve(edge))
                    .collect(),
                Err(e) => {
                    warn!(node = %hash.short_hex(), error = %e, "undecodable node treated as leaf");
                    Vec::new()
                }
            },
            Shape::List(target) => match codec::decode::<Vec<Reference>>(data) {
                Ok(refs) => refs
                    .into_iter()
                    .map(|r| (r.hash(), self.shape_of_name(target)))
                    .collect(),
                Err(e) => {
                    warn!(node = %hash.short_hex(), error = %e, "undecodable reference list treated as leaf");
                    Vec::new()
                }
            },
        }
    }

    fn resolve(&self, edge: Edge<'a>) -> (Hash, Shape<'a>) {
        match edge {
            Edge::Reference { hash, target } => (hash, self.shape_of_name(target)),
            Edge::References { hash, target } => (hash, self.list_shape(target)),
            Edge::Dynamic(dynamic) => self.dynamic_node(&dynamic),
        }
    }
}

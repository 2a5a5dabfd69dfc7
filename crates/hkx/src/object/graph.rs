// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rooted object graphs and identity-aware equality.

use crate::config::{
    ROOT_CONTAINER, ROOT_NAMED_VARIANT, VARIANT_CLASS_NAME_MEMBER, VARIANT_NAME_MEMBER,
};
use crate::error::{HkxError, Result};
use crate::object::{Instance, ObjectArena, ObjectHandle, Value};
use crate::types::TypeRegistry;
use std::collections::HashMap;

/// An arena plus the handle of its root object.
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    pub arena: ObjectArena,
    pub root: ObjectHandle,
}

/// One entry of a root container.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedVariant {
    pub name: Option<String>,
    pub class_name: Option<String>,
    pub object: Option<ObjectHandle>,
}

impl ObjectGraph {
    pub fn new(arena: ObjectArena, root: ObjectHandle) -> Self {
        Self { arena, root }
    }

    /// Wrap objects in a root container, one named variant per entry.
    ///
    /// Each variant's `className` is taken from the object's own type.
    pub fn with_root_container(
        mut arena: ObjectArena,
        registry: &TypeRegistry,
        variants: &[(&str, ObjectHandle)],
    ) -> Result<Self> {
        let container = registry.require(ROOT_CONTAINER)?;
        let named = registry.require(ROOT_NAMED_VARIANT)?;

        let mut records = Vec::with_capacity(variants.len());
        for (name, handle) in variants {
            let class_name = arena.require(*handle)?.type_name().to_string();
            let record = Instance::new(&named)
                .with(VARIANT_NAME_MEMBER, *name)?
                .with(VARIANT_CLASS_NAME_MEMBER, class_name)?
                .with("variant", *handle)?;
            records.push(Value::Record(record));
        }
        let root = arena.alloc(Instance::new(&container).with("namedVariants", records)?);
        Ok(Self { arena, root })
    }

    pub fn root(&self) -> Option<&Instance> {
        self.arena.get(self.root)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&Instance> {
        self.arena.get(handle)
    }

    /// Entries of a root container, in order.
    pub fn named_variants(&self) -> Result<Vec<NamedVariant>> {
        let root = self.arena.require(self.root)?;
        let entries = root
            .get("namedVariants")
            .and_then(Value::elements)
            .ok_or_else(|| HkxError::invalid_value(root.type_name(), "not a root container"))?;
        Ok(entries
            .iter()
            .filter_map(Value::as_record)
            .map(|r| NamedVariant {
                name: r
                    .get(VARIANT_NAME_MEMBER)
                    .and_then(Value::as_str)
                    .map(str::to_string),
                class_name: r
                    .get(VARIANT_CLASS_NAME_MEMBER)
                    .and_then(Value::as_str)
                    .map(str::to_string),
                object: r.get("variant").and_then(Value::as_pointer),
            })
            .collect())
    }

    /// Identity-aware structural equality.
    ///
    /// Two graphs are equal when a bijection between their reachable handles
    /// makes every pair of instances field-wise equal. Sharing patterns must
    /// therefore match: one object referenced twice is not equal to two
    /// equal objects referenced once each. Floats compare by bit pattern and
    /// a [`Value::Block`] equals the [`Value::Array`] it expands to.
    pub fn structurally_eq(&self, other: &ObjectGraph) -> bool {
        let mut matcher = Matcher {
            left: &self.arena,
            right: &other.arena,
            forward: HashMap::new(),
            backward: HashMap::new(),
            pending: Vec::new(),
        };
        if !matcher.bind(self.root, other.root) {
            return false;
        }
        while let Some((l, r)) = matcher.pending.pop() {
            let (Some(a), Some(b)) = (self.arena.get(l), other.arena.get(r)) else {
                return false;
            };
            if !matcher.instances(a, b) {
                return false;
            }
        }
        true
    }
}

struct Matcher<'a> {
    left: &'a ObjectArena,
    right: &'a ObjectArena,
    forward: HashMap<ObjectHandle, ObjectHandle>,
    backward: HashMap<ObjectHandle, ObjectHandle>,
    pending: Vec<(ObjectHandle, ObjectHandle)>,
}

impl Matcher<'_> {
    fn bind(&mut self, l: ObjectHandle, r: ObjectHandle) -> bool {
        match (self.forward.get(&l), self.backward.get(&r)) {
            (Some(fr), Some(bl)) => *fr == r && *bl == l,
            (None, None) => {
                if self.left.get(l).is_none() || self.right.get(r).is_none() {
                    return false;
                }
                self.forward.insert(l, r);
                self.backward.insert(r, l);
                self.pending.push((l, r));
                true
            }
            _ => false,
        }
    }

    fn instances(&mut self, a: &Instance, b: &Instance) -> bool {
        a.type_name() == b.type_name()
            && a.fields().len() == b.fields().len()
            && a
                .fields()
                .iter()
                .zip(b.fields())
                .all(|(x, y)| self.values(x, y))
    }

    fn values(&mut self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(_) | Value::UInt(_), Value::Int(_) | Value::UInt(_)) => {
                match (a.as_i64(), b.as_i64()) {
                    (Some(x), Some(y)) => x == y,
                    _ => a.as_u64() == b.as_u64() && a.as_u64().is_some(),
                }
            }
            (Value::F32(x), Value::F32(y)) => x.to_bits() == y.to_bits(),
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Pointer(None), Value::Pointer(None)) => true,
            (Value::Pointer(Some(x)), Value::Pointer(Some(y))) => self.bind(*x, *y),
            (Value::Record(x), Value::Record(y)) => self.instances(x, y),
            (Value::Tuple(x), Value::Tuple(y)) => self.sequences(x, y),
            (
                Value::Array(_) | Value::Block(_),
                Value::Array(_) | Value::Block(_),
            ) => match (a.elements(), b.elements()) {
                (Some(x), Some(y)) => self.sequences(&x, &y),
                _ => false,
            },
            _ => false,
        }
    }

    fn sequences(&mut self, a: &[Value], b: &[Value]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.values(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::PrimitiveBlock;
    use crate::types::{ClassBuilder, TypeDescriptor};
    use std::sync::Arc;

    fn node_type(registry: &TypeRegistry) -> Arc<TypeDescriptor> {
        let base = registry.expect_type("hkReferencedObject");
        let fwd = ClassBuilder::new("hkxLink").parent(&base).build();
        let fwd = registry.register(fwd);
        let ptr = registry.pointer(&fwd);
        registry.register(
            ClassBuilder::new("hkxPair")
                .parent(&base)
                .member("first", ptr.clone())
                .member("second", ptr)
                .member("weights", registry.array(&registry.expect_type("hkReal")))
                .build(),
        )
    }

    fn pair(registry: &TypeRegistry, shared: bool) -> ObjectGraph {
        let ty = node_type(registry);
        let link = registry.expect_type("hkxLink");
        let mut arena = ObjectArena::new();
        let a = arena.alloc(Instance::new(&link));
        let b = if shared {
            a
        } else {
            arena.alloc(Instance::new(&link))
        };
        let root = Instance::new(&ty)
            .with("first", a)
            .and_then(|r| r.with("second", b))
            .expect("members");
        let root = arena.alloc(root);
        ObjectGraph::new(arena, root)
    }

    #[test]
    fn test_sharing_pattern_matters() {
        let registry = TypeRegistry::with_base_types();
        let shared = pair(&registry, true);
        let split = pair(&registry, false);
        assert!(shared.structurally_eq(&pair(&registry, true)));
        assert!(split.structurally_eq(&pair(&registry, false)));
        assert!(!shared.structurally_eq(&split));
        assert!(!split.structurally_eq(&shared));
    }

    #[test]
    fn test_block_equals_expanded_array() {
        let registry = TypeRegistry::with_base_types();
        let mut left = pair(&registry, false);
        let mut right = pair(&registry, false);
        if let Some(root) = left.arena.get_mut(left.root) {
            root.set(
                "weights",
                vec![Value::F32(0.5), Value::F32(1.0)],
            )
            .expect("member");
        }
        if let Some(root) = right.arena.get_mut(right.root) {
            root.set("weights", PrimitiveBlock::F32(vec![0.5, 1.0]))
                .expect("member");
        }
        assert!(left.structurally_eq(&right));
    }

    #[test]
    fn test_root_container_variants() {
        let registry = TypeRegistry::with_base_types();
        let link = registry.register(
            ClassBuilder::new("hkxLink")
                .parent(&registry.expect_type("hkReferencedObject"))
                .build(),
        );
        let mut arena = ObjectArena::new();
        let obj = arena.alloc(Instance::new(&link));
        let graph =
            ObjectGraph::with_root_container(arena, &registry, &[("Link", obj)]).expect("root");

        let variants = graph.named_variants().expect("container");
        assert_eq!(
            variants,
            vec![NamedVariant {
                name: Some("Link".into()),
                class_name: Some("hkxLink".into()),
                object: Some(obj),
            }]
        );
        assert_eq!(
            graph.root().map(Instance::type_name),
            Some("hkRootLevelContainer")
        );
    }
}

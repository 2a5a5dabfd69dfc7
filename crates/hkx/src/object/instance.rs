// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed, named-field object instances.

use crate::error::{HkxError, Result};
use crate::object::Value;
use crate::types::TypeDescriptor;
use std::fmt;
use std::sync::Arc;

/// One value per effective member of its descriptor, parent members first.
#[derive(Clone)]
pub struct Instance {
    descriptor: Arc<TypeDescriptor>,
    fields: Vec<Value>,
}

impl Instance {
    /// Create an instance with every field at its type's zero value.
    pub fn new(descriptor: &Arc<TypeDescriptor>) -> Self {
        let fields = descriptor
            .effective_members()
            .iter()
            .map(|m| Value::default_for(&m.ty))
            .collect();
        Self {
            descriptor: descriptor.clone(),
            fields,
        }
    }

    pub(crate) fn from_fields(descriptor: Arc<TypeDescriptor>, fields: Vec<Value>) -> Self {
        Self { descriptor, fields }
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn type_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.descriptor
            .member_index(name)
            .and_then(|i| self.fields.get(i))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.descriptor
            .member_index(name)
            .and_then(|i| self.fields.get_mut(i))
    }

    /// Set a field by member name.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let slot = self
            .descriptor
            .member_index(name)
            .and_then(|i| self.fields.get_mut(i))
            .ok_or_else(|| {
                HkxError::invalid_value(
                    format!("{}.{name}", self.descriptor.name),
                    "no such member",
                )
            })?;
        *slot = value.into();
        Ok(())
    }

    /// Builder-style [`Instance::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// `(member name, value)` pairs in effective member order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.descriptor
            .effective_members()
            .into_iter()
            .map(|m| m.name.as_str())
            .zip(self.fields.iter())
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.name == other.descriptor.name && self.fields == other.fields
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(&self.descriptor.name);
        for (name, value) in self.iter() {
            s.field(name, value);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassBuilder, TypeRegistry};

    #[test]
    fn test_fields_cover_parent_members() {
        let registry = TypeRegistry::with_base_types();
        let base = registry.expect_type("hkReferencedObject");
        let ty = registry.register(
            ClassBuilder::new("hkxNode")
                .parent(&base)
                .member("name", registry.expect_type("hkStringPtr"))
                .member("selected", registry.expect_type("hkBool"))
                .build(),
        );

        let node = Instance::new(&ty)
            .with("name", "pelvis")
            .and_then(|n| n.with("selected", true))
            .expect("members exist");
        assert_eq!(node.fields().len(), 3);
        assert_eq!(node.get("memSizeAndRefCount"), Some(&Value::UInt(0)));
        assert_eq!(node.get("name").and_then(Value::as_str), Some("pelvis"));
        assert_eq!(node.get("selected"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_set_replaces_existing_value() {
        let registry = TypeRegistry::with_base_types();
        let ty = registry.register(
            ClassBuilder::new("hkxLabel")
                .member("text", registry.expect_type("hkStringPtr"))
                .build(),
        );
        let mut label = Instance::new(&ty).with("text", "first").expect("text");
        label.set("text", "second").expect("set");
        assert_eq!(label.get("text").and_then(Value::as_str), Some("second"));
        assert_eq!(label.fields().len(), 1);
    }

    #[test]
    fn test_set_unknown_member_fails() {
        let registry = TypeRegistry::with_base_types();
        let mut obj = Instance::new(&registry.expect_type("hkReferencedObject"));
        match obj.set("nope", 1u32) {
            Err(HkxError::InvalidValue { path, .. }) => {
                assert_eq!(path, "hkReferencedObject.nope");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

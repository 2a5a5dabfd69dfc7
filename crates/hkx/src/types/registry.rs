// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session-scoped type registry.
//!
//! Maps type names to compiled descriptors for one engine version. Callers
//! pass a registry into every encode/decode call; there is no global table,
//! so an unrelated later session can never observe a stale registry.
//!
//! The registry also owns the memoizing wrapper factory: asking for
//! `Array[hkaBone]` twice yields the same `Arc`.

use crate::config::REFERENCED_OBJECT;
use crate::error::{HkxError, Result};
use crate::types::descriptor::TypeDescriptor;
use crate::types::wrapper::{instantiate, synthesized_name, WrapperKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Name → descriptor mapping for one engine version.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the engine's base types.
    #[must_use]
    pub fn with_base_types() -> Self {
        let registry = Self::new();
        crate::types::base::register_base_types(&registry);
        registry
    }

    /// Register a descriptor under its name, replacing any previous entry.
    pub fn register(&self, desc: TypeDescriptor) -> Arc<TypeDescriptor> {
        let desc = Arc::new(desc);
        self.types.write().insert(desc.name.clone(), desc.clone());
        desc
    }

    /// Register under an explicit name (aliases such as `hkVector4`).
    pub fn register_as(&self, name: impl Into<String>, desc: Arc<TypeDescriptor>) {
        self.types.write().insert(name.into(), desc);
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.read().get(name).cloned()
    }

    /// Look up a descriptor, failing with [`HkxError::UnknownType`].
    pub fn require(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        self.get(name).ok_or_else(|| HkxError::unknown_type(name))
    }

    /// Look up a non-wrapper descriptor by the name it carries in files.
    pub fn get_by_file_name(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        let types = self.types.read();
        match types.get(name) {
            Some(desc) if desc.file_name() == name => Some(desc.clone()),
            _ => types
                .values()
                .find(|d| d.wrapper.is_none() && d.real_name.as_deref() == Some(name))
                .cloned(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Number of registered types (wrappers included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }

    /// Memoized wrapper instantiation.
    pub fn wrap(&self, kind: WrapperKind, element: &Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        let key = synthesized_name(&kind, &element.name);
        if let Some(hit) = self.types.read().get(&key) {
            return hit.clone();
        }
        let mut types = self.types.write();
        types
            .entry(key)
            .or_insert_with(|| Arc::new(instantiate(kind, element.clone())))
            .clone()
    }

    pub fn pointer(&self, target: &Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        self.wrap(WrapperKind::Pointer, target)
    }

    pub fn smart_pointer(&self, target: &Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        self.wrap(WrapperKind::SmartPointer, target)
    }

    pub fn named_variant(&self, target: &Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        self.wrap(WrapperKind::NamedVariant, target)
    }

    pub fn back_reference(&self, target: &Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        self.wrap(WrapperKind::BackReference, target)
    }

    pub fn array(&self, element: &Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        self.wrap(WrapperKind::Array, element)
    }

    pub fn relative_array(&self, element: &Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        self.wrap(WrapperKind::RelativeArray, element)
    }

    pub fn fixed_struct(&self, element: &Arc<TypeDescriptor>, length: u32) -> Arc<TypeDescriptor> {
        self.wrap(WrapperKind::FixedStruct { length }, element)
    }

    pub fn enumeration(
        &self,
        logical: &Arc<TypeDescriptor>,
        storage: &Arc<TypeDescriptor>,
    ) -> Arc<TypeDescriptor> {
        self.wrap(
            WrapperKind::Enum {
                logical: logical.clone(),
            },
            storage,
        )
    }

    /// Resolve a named variant's `className`.
    ///
    /// The class must be registered and derive from the referenced-object
    /// root; anything else is [`HkxError::UnknownVariantType`].
    pub fn resolve_variant(&self, class_name: &str) -> Result<Arc<TypeDescriptor>> {
        match self.get(class_name) {
            Some(desc) if desc.wrapper.is_none() && desc.is_subclass_of(REFERENCED_OBJECT) => {
                Ok(desc)
            }
            _ => Err(HkxError::UnknownVariantType {
                class_name: class_name.to_string(),
            }),
        }
    }

    /// Test helper: look up a type that must exist.
    #[cfg(test)]
    pub(crate) fn expect_type(&self, name: &str) -> Arc<TypeDescriptor> {
        self.get(name)
            .unwrap_or_else(|| panic!("type {name} not registered"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassBuilder;

    #[test]
    fn test_wrap_is_memoized() {
        let registry = TypeRegistry::with_base_types();
        let real = registry.expect_type("hkReal");
        let a = registry.array(&real);
        let b = registry.array(&real);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.contains("Array[hkReal]"));

        let p = registry.pointer(&real);
        assert!(!Arc::ptr_eq(&a, &p));
    }

    #[test]
    fn test_resolve_variant_capability_check() {
        let registry = TypeRegistry::with_base_types();
        let base = registry.expect_type("hkReferencedObject");
        registry.register(ClassBuilder::new("hkaSkeleton").parent(&base).build());

        assert_eq!(
            registry.resolve_variant("hkaSkeleton").expect("resolves").name,
            "hkaSkeleton"
        );
        assert!(matches!(
            registry.resolve_variant("hkRootLevelContainer"),
            Err(HkxError::UnknownVariantType { .. })
        ));
        assert!(matches!(
            registry.resolve_variant("NoSuchClass"),
            Err(HkxError::UnknownVariantType { .. })
        ));
    }

    #[test]
    fn test_require_reports_unknown_type() {
        let registry = TypeRegistry::new();
        assert!(registry.is_empty());
        match registry.require("hkaBone") {
            Err(HkxError::UnknownType { name, .. }) => assert_eq!(name, "hkaBone"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_lookup_by_file_name() {
        let registry = TypeRegistry::with_base_types();
        registry.register(ClassBuilder::new("Bone").real_name("hkaBone").build());
        assert_eq!(
            registry.get_by_file_name("hkaBone").expect("by real name").name,
            "Bone"
        );
        assert_eq!(
            registry.get_by_file_name("hkReal").expect("plain").name,
            "hkReal"
        );
        assert!(registry.get_by_file_name("Bone").is_none());
    }
}

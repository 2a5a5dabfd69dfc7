// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fluent builder API for class descriptors.

use crate::layout::{LayoutCache, LayoutRules};
use crate::types::descriptor::{
    Extent, FormatFlags, Interface, Member, MemberFlags, TemplateParam, TypeDescriptor,
};
use crate::types::tag::TagDataKind;
use std::sync::Arc;

/// Builder for class-type [`TypeDescriptor`]s.
///
/// Member offsets, byte size and alignment are computed under
/// [`LayoutRules::NATIVE`], which is the layout tagfiles record.
#[derive(Debug)]
pub struct ClassBuilder {
    desc: TypeDescriptor,
}

impl ClassBuilder {
    /// Create a new builder for a class type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            desc: TypeDescriptor::new(
                name,
                TagDataKind::Class.code(),
                Extent::Fixed(0),
                Extent::Fixed(0),
            ),
        }
    }

    pub fn parent(mut self, parent: &Arc<TypeDescriptor>) -> Self {
        self.desc.parent = Some(parent.clone());
        self
    }

    /// Add a member with default flags.
    pub fn member(mut self, name: impl Into<String>, ty: Arc<TypeDescriptor>) -> Self {
        self.desc.members.push(Member::new(name, ty));
        self
    }

    /// Add a member with explicit flags.
    pub fn member_with_flags(
        mut self,
        name: impl Into<String>,
        ty: Arc<TypeDescriptor>,
        flags: MemberFlags,
    ) -> Self {
        self.desc
            .members
            .push(Member::new(name, ty).with_flags(flags));
        self
    }

    /// Override the tag-type code (member-described floats, opaque types).
    pub fn tag_type(mut self, tag: u32) -> Self {
        self.desc.tag_type = tag;
        self
    }

    pub fn real_name(mut self, name: impl Into<String>) -> Self {
        self.desc.real_name = Some(name.into());
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.desc.version = version;
        self
    }

    pub fn hash(mut self, hash: u32) -> Self {
        self.desc.hash = Some(hash);
        self
    }

    pub fn abstract_value(mut self, value: u32) -> Self {
        self.desc.abstract_value = value;
        self
    }

    pub fn format_flags(mut self, flags: FormatFlags) -> Self {
        self.desc.format_flags = Some(flags);
        self
    }

    pub fn template(mut self, param: TemplateParam) -> Self {
        self.desc.templates.push(param);
        self
    }

    pub fn interface(mut self, ty: &Arc<TypeDescriptor>, value: u32) -> Self {
        self.desc.interfaces.push(Interface {
            ty: ty.clone(),
            value,
        });
        self
    }

    /// Declared extent for member-less classes (vtable holders).
    pub fn extent(mut self, byte_size: Extent, alignment: Extent) -> Self {
        self.desc.byte_size = byte_size;
        self.desc.alignment = alignment;
        self
    }

    /// Minimum alignment (e.g. 16 for SIMD-backed classes).
    pub fn alignment(mut self, alignment: u32) -> Self {
        self.desc.alignment = Extent::Fixed(alignment);
        self
    }

    /// Finish: compute native offsets and size.
    pub fn build(self) -> TypeDescriptor {
        let mut desc = self.desc;
        let mut cache = LayoutCache::new(LayoutRules::NATIVE);
        let layout = cache.class(&desc);

        let inherited = desc
            .parent
            .as_ref()
            .map_or(0, |p| p.effective_member_count());
        for (member, offset) in desc
            .members
            .iter_mut()
            .zip(layout.offsets.iter().skip(inherited))
        {
            member.offset = *offset;
        }
        if !matches!(desc.byte_size, Extent::PointerSized) {
            desc.byte_size = Extent::Fixed(layout.size);
        }
        if !matches!(desc.alignment, Extent::PointerSized) {
            desc.alignment = Extent::Fixed(layout.alignment);
        }
        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRegistry;

    #[test]
    fn test_builder_assigns_native_offsets() {
        let registry = TypeRegistry::with_base_types();
        let base = registry.get("hkReferencedObject").expect("base");
        let real = registry.get("hkReal").expect("real");
        let bone = registry.register(
            ClassBuilder::new("hkaBone")
                .parent(&base)
                .member("name", registry.get("hkStringPtr").expect("str"))
                .member("lockTranslation", registry.get("hkBool").expect("bool"))
                .member("weight", real)
                .build(),
        );

        let offsets: Vec<_> = bone.members.iter().map(|m| m.offset).collect();
        // hkReferencedObject: vtable (8) + memSizeAndRefCount (4), padded to 16
        assert_eq!(offsets, [16, 24, 28]);
        assert_eq!(bone.byte_size, Extent::Fixed(32));
        assert_eq!(bone.alignment, Extent::Fixed(8));
    }
}

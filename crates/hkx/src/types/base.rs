// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Base types shared by every engine version.

use crate::config::{
    CHAR_TYPE, REFERENCED_OBJECT, ROOT_CONTAINER, ROOT_NAMED_VARIANT, VARIANT_CLASS_NAME_MEMBER,
    VARIANT_NAME_MEMBER,
};
use crate::types::builder::ClassBuilder;
use crate::types::descriptor::{Extent, MemberFlags, TypeDescriptor};
use crate::types::registry::TypeRegistry;
use crate::types::tag::{self, TagDataKind};
use crate::types::wrapper::{instantiate, WrapperKind};
use std::sync::Arc;

fn primitive(name: &str, tag_type: u32, size: u32) -> TypeDescriptor {
    TypeDescriptor::new(name, tag_type, Extent::Fixed(size), Extent::Fixed(size))
}

fn int(name: &str, width: usize, signed: bool) -> TypeDescriptor {
    let sign = if signed { tag::IS_SIGNED } else { 0 };
    primitive(
        name,
        TagDataKind::Int.code() | sign | tag::int_flag(width),
        width as u32,
    )
}

fn vector(registry: &TypeRegistry, real: &Arc<TypeDescriptor>, name: &str, length: u32, alignment: u32) {
    let mut desc = instantiate(WrapperKind::FixedStruct { length }, real.clone());
    desc.name = name.to_string();
    desc.real_name = None;
    desc.byte_size = Extent::Fixed(length * 4);
    desc.alignment = Extent::Fixed(alignment);
    registry.register(desc);
}

/// Register primitives, vectors, the referenced-object root and the root container.
pub(crate) fn register_base_types(registry: &TypeRegistry) {
    registry.register(primitive(
        "hkBool",
        TagDataKind::Bool.code() | tag::INT8,
        1,
    ));
    registry.register(primitive(CHAR_TYPE, TagDataKind::Int.code() | tag::INT8, 1));
    let int16 = registry.register(int("hkInt16", 2, true));
    let uint32 = registry.register(int("hkUint32", 4, false));
    for (name, width, signed) in [
        ("hkInt8", 1, true),
        ("hkUint8", 1, false),
        ("hkUint16", 2, false),
        ("hkInt32", 4, true),
        ("hkInt64", 8, true),
        ("hkUint64", 8, false),
    ] {
        registry.register(int(name, width, signed));
    }
    let real = registry.register(primitive(
        "hkReal",
        TagDataKind::Float.code() | tag::FLOAT32,
        4,
    ));
    // Half floats are not IEEE single; they recurse into their storage member
    registry.register(
        ClassBuilder::new("hkHalf16")
            .tag_type(TagDataKind::Float.code() | 0x07_4600)
            .member("value", int16)
            .build(),
    );
    let string = registry.register(TypeDescriptor::new(
        "hkStringPtr",
        TagDataKind::String.code(),
        Extent::PointerSized,
        Extent::PointerSized,
    ));

    vector(registry, &real, "hkVector4", 4, 16);
    vector(registry, &real, "hkQuaternion", 4, 16);
    vector(registry, &real, "hkVector3", 3, 4);

    let base_object = registry.register(
        ClassBuilder::new("hkBaseObject")
            .extent(Extent::PointerSized, Extent::PointerSized)
            .hash(0xE070_8A00)
            .build(),
    );
    let referenced = registry.register(
        ClassBuilder::new(REFERENCED_OBJECT)
            .parent(&base_object)
            .member_with_flags(
                "memSizeAndRefCount",
                uint32,
                MemberFlags::NOT_SERIALIZABLE.union(MemberFlags::PRIVATE),
            )
            .hash(0x3B1C_1113)
            .build(),
    );

    let variant = registry.named_variant(&referenced);
    let named = registry.register(
        ClassBuilder::new(ROOT_NAMED_VARIANT)
            .member(VARIANT_NAME_MEMBER, string.clone())
            .member(VARIANT_CLASS_NAME_MEMBER, string)
            .member("variant", variant)
            .version(1)
            .hash(0xB103_A2CD)
            .build(),
    );
    let variants = registry.array(&named);
    registry.register(
        ClassBuilder::new(ROOT_CONTAINER)
            .member("namedVariants", variants)
            .hash(0x2772_C11E)
            .build(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dispatch;

    #[test]
    fn test_base_types_present() {
        let registry = TypeRegistry::with_base_types();
        for name in [
            "hkBool",
            "char",
            "hkInt32",
            "hkUint64",
            "hkReal",
            "hkHalf16",
            "hkStringPtr",
            "hkVector4",
            "hkBaseObject",
            "hkReferencedObject",
            "hkRootLevelContainerNamedVariant",
            "hkRootLevelContainer",
            "Variant[hkReferencedObject]",
            "Array[hkRootLevelContainerNamedVariant]",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_half_recurses_real_inline() {
        let registry = TypeRegistry::with_base_types();
        assert_eq!(
            registry.expect_type("hkHalf16").dispatch(),
            Some(Dispatch::Members)
        );
        assert_eq!(registry.expect_type("hkReal").dispatch(), Some(Dispatch::F32));
    }

    #[test]
    fn test_vector4_is_aligned_tuple() {
        let registry = TypeRegistry::with_base_types();
        let v = registry.expect_type("hkVector4");
        assert_eq!(v.effective_byte_size(8), 16);
        assert_eq!(v.effective_alignment(8), 16);
        assert!(matches!(
            v.wrapper_kind(),
            Some(WrapperKind::FixedStruct { length: 4 })
        ));
    }

    #[test]
    fn test_root_container_shape() {
        let registry = TypeRegistry::with_base_types();
        let named = registry.expect_type("hkRootLevelContainerNamedVariant");
        assert!(named.has_named_variant());
        let names: Vec<_> = named.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["name", "className", "variant"]);
    }
}

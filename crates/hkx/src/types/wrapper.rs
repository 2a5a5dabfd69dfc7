// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generic wrapper descriptors (pointers, arrays, fixed structs, enums).
//!
//! The file formats have no real generics: every `(kind, element)` pair is
//! its own descriptor with a synthesized name such as `Array[hkaBone]`.
//! [`instantiate`] stamps one; [`crate::types::TypeRegistry::wrap`]
//! memoizes them so each instantiation exists exactly once.

use crate::types::descriptor::{Extent, TemplateParam, TypeDescriptor};
use crate::types::tag::{TagDataKind, TUPLE_LENGTH_SHIFT};
use std::sync::Arc;

/// Closed set of wrapper kinds, matched exhaustively by the codecs.
#[derive(Debug, Clone)]
pub enum WrapperKind {
    /// Raw owning reference to another object item.
    Pointer,
    /// Shared-ownership reference.
    SmartPointer,
    /// Target type resolved at run time from a sibling `className` string.
    NamedVariant,
    /// Non-owning reference to an enclosing object; never creates an item.
    BackReference,
    /// `u16` length + `i16` forward offset to an inline run.
    RelativeArray,
    /// Pointer + size + capacity to out-of-line storage.
    Array,
    /// Inline tuple of a compile-time length.
    FixedStruct { length: u32 },
    /// Logical enumeration stored as `element`.
    Enum { logical: Arc<TypeDescriptor> },
}

impl WrapperKind {
    /// Whether the slot holds a reference to an object item.
    pub const fn is_object_reference(&self) -> bool {
        matches!(
            self,
            Self::Pointer | Self::SmartPointer | Self::NamedVariant | Self::BackReference
        )
    }

    /// Name written to tagfile type tables.
    pub fn file_name(&self) -> String {
        match self {
            Self::Pointer => "T*".into(),
            Self::SmartPointer => "hkRefPtr".into(),
            Self::NamedVariant => "hkRefVariant".into(),
            Self::BackReference => "hkViewPtr".into(),
            Self::RelativeArray => "hkRelArray".into(),
            Self::Array => "hkArray".into(),
            Self::FixedStruct { .. } => "T[N]".into(),
            Self::Enum { .. } => "hkEnum".into(),
        }
    }

    fn tag_type(&self, element: &TypeDescriptor) -> u32 {
        match self {
            Self::Pointer | Self::SmartPointer | Self::NamedVariant | Self::BackReference => {
                TagDataKind::Pointer.code()
            }
            Self::RelativeArray | Self::Array => TagDataKind::Array.code(),
            Self::FixedStruct { length } => {
                TagDataKind::Tuple.code() | (length << TUPLE_LENGTH_SHIFT)
            }
            Self::Enum { .. } => element.tag_type,
        }
    }
}

/// Wrapper kind bound to its element descriptor.
#[derive(Debug, Clone)]
pub struct Wrapper {
    pub kind: WrapperKind,
    /// Pointee, array element, tuple element, or enum storage type.
    pub element: Arc<TypeDescriptor>,
}

impl Wrapper {
    /// Size under a pointer width (classes inside tuples use their declared size).
    pub fn byte_size(&self, pointer_size: u32) -> u32 {
        match &self.kind {
            WrapperKind::Pointer
            | WrapperKind::SmartPointer
            | WrapperKind::NamedVariant
            | WrapperKind::BackReference => pointer_size,
            WrapperKind::RelativeArray => 4,
            WrapperKind::Array => pointer_size + 8,
            WrapperKind::FixedStruct { length } => {
                length.saturating_mul(self.element.effective_byte_size(pointer_size))
            }
            WrapperKind::Enum { .. } => self.element.effective_byte_size(pointer_size),
        }
    }

    pub fn alignment(&self, pointer_size: u32) -> u32 {
        match &self.kind {
            WrapperKind::Pointer
            | WrapperKind::SmartPointer
            | WrapperKind::NamedVariant
            | WrapperKind::BackReference
            | WrapperKind::Array => pointer_size,
            WrapperKind::RelativeArray => 2,
            WrapperKind::FixedStruct { .. } | WrapperKind::Enum { .. } => {
                self.element.effective_alignment(pointer_size)
            }
        }
    }
}

/// Synthesized registry name of a wrapper instantiation.
pub fn synthesized_name(kind: &WrapperKind, element: &str) -> String {
    match kind {
        WrapperKind::Pointer => format!("Ptr[{element}]"),
        WrapperKind::SmartPointer => format!("RefPtr[{element}]"),
        WrapperKind::NamedVariant => format!("Variant[{element}]"),
        WrapperKind::BackReference => format!("ViewPtr[{element}]"),
        WrapperKind::RelativeArray => format!("RelArray[{element}]"),
        WrapperKind::Array => format!("Array[{element}]"),
        WrapperKind::FixedStruct { length } => format!("Struct[{element}, {length}]"),
        WrapperKind::Enum { logical } => format!("Enum[{}, {element}]", logical.name),
    }
}

/// Stamp a wrapper descriptor binding `kind` to `element`.
pub fn instantiate(kind: WrapperKind, element: Arc<TypeDescriptor>) -> TypeDescriptor {
    let mut desc = TypeDescriptor::new(
        synthesized_name(&kind, &element.name),
        kind.tag_type(&element),
        Extent::Fixed(0),
        Extent::Fixed(0),
    );
    desc.real_name = Some(kind.file_name());
    desc.templates = match &kind {
        WrapperKind::FixedStruct { length } => vec![
            TemplateParam::ty("tT", element.clone()),
            TemplateParam::int("vN", i64::from(*length)),
        ],
        WrapperKind::Enum { logical } => vec![
            TemplateParam::ty("tENUM", logical.clone()),
            TemplateParam::ty("tSTORAGE", element.clone()),
        ],
        _ => vec![TemplateParam::ty("tT", element.clone())],
    };
    desc.wrapper = Some(Wrapper { kind, element });
    desc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tag;

    fn real() -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor::new(
            "hkReal",
            tag::TagDataKind::Float.code() | tag::FLOAT32,
            Extent::Fixed(4),
            Extent::Fixed(4),
        ))
    }

    #[test]
    fn test_array_sizes_follow_pointer_width() {
        let arr = instantiate(WrapperKind::Array, real());
        assert_eq!(arr.name, "Array[hkReal]");
        assert_eq!(arr.file_name(), "hkArray");
        assert_eq!(arr.effective_byte_size(4), 12);
        assert_eq!(arr.effective_byte_size(8), 16);
        assert_eq!(arr.effective_alignment(8), 8);
        assert_eq!(arr.tag_data_kind(), TagDataKind::Array);
    }

    #[test]
    fn test_fixed_struct_layout_and_templates() {
        let tuple = instantiate(WrapperKind::FixedStruct { length: 3 }, real());
        assert_eq!(tuple.name, "Struct[hkReal, 3]");
        assert_eq!(tuple.effective_byte_size(8), 12);
        assert_eq!(tuple.effective_alignment(8), 4);
        assert_eq!(tuple.tag_type, 40 | (3 << 8));
        assert_eq!(tuple.templates.len(), 2);
    }

    #[test]
    fn test_enum_takes_storage_layout() {
        let storage = Arc::new(TypeDescriptor::new(
            "hkUint8",
            tag::TagDataKind::Int.code() | tag::INT8,
            Extent::Fixed(1),
            Extent::Fixed(1),
        ));
        let logical = Arc::new(TypeDescriptor::new(
            "BlendHint",
            tag::TagDataKind::Int.code() | tag::IS_SIGNED | tag::INT32,
            Extent::Fixed(4),
            Extent::Fixed(4),
        ));
        let e = instantiate(WrapperKind::Enum { logical }, storage.clone());
        assert_eq!(e.name, "Enum[BlendHint, hkUint8]");
        assert_eq!(e.effective_byte_size(8), 1);
        assert_eq!(e.tag_type, storage.tag_type);
        assert!(e.pointer_target().is_none());
    }

    #[test]
    fn test_pointer_kinds_are_object_references() {
        assert!(WrapperKind::BackReference.is_object_reference());
        assert!(WrapperKind::NamedVariant.is_object_reference());
        assert!(!WrapperKind::Array.is_object_reference());
    }
}

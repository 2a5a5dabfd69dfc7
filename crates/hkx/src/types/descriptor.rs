// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type descriptors for reflection-driven serialization.

use crate::types::tag::{Dispatch, TagDataKind};
use crate::types::wrapper::{Wrapper, WrapperKind};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Byte size or alignment of a type, possibly deferred to the pointer width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extent {
    Fixed(u32),
    /// Encoded as `-1` in type tables: one pointer wide.
    PointerSized,
}

impl Extent {
    /// Decode the raw table representation (`-1` = pointer-sized).
    pub const fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            Self::PointerSized
        } else {
            Self::Fixed(raw as u32)
        }
    }

    /// Raw table representation.
    pub const fn raw(self) -> i64 {
        match self {
            Self::Fixed(v) => v as i64,
            Self::PointerSized => -1,
        }
    }

    /// Resolve against a pointer width.
    pub const fn resolve(self, pointer_size: u32) -> u32 {
        match self {
            Self::Fixed(v) => v,
            Self::PointerSized => pointer_size,
        }
    }
}

/// Member serialization flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct MemberFlags(pub u32);

impl MemberFlags {
    /// Member is never written; readers leave it at its default.
    pub const NOT_SERIALIZABLE: Self = Self(0x0001);
    pub const PROTECTED: Self = Self(0x0002);
    pub const PRIVATE: Self = Self(0x0004);
    pub const DEFAULT: Self = Self(0x0020);

    pub const fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_serializable(self) -> bool {
        !self.contains(Self::NOT_SERIALIZABLE)
    }
}

/// Tagfile format flags: which optional body fields are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct FormatFlags(pub u32);

impl FormatFlags {
    pub const SUBTYPE: Self = Self(0x01);
    pub const POINTER: Self = Self(0x02);
    pub const VERSION: Self = Self(0x04);
    pub const BYTE_SIZE: Self = Self(0x08);
    pub const ABSTRACT_VALUE: Self = Self(0x10);
    pub const MEMBERS: Self = Self(0x20);
    pub const INTERFACES: Self = Self(0x40);
    /// Every bit this codec understands.
    pub const KNOWN: Self = Self(0x7F);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    #[must_use]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    /// Bits outside [`FormatFlags::KNOWN`].
    pub const fn unknown_bits(self) -> u32 {
        self.0 & !Self::KNOWN.0
    }
}

/// Value of a template parameter.
#[derive(Debug, Clone)]
pub enum TemplateValue {
    Type(Arc<TypeDescriptor>),
    Int(i64),
}

/// Ordered template parameter (`tT`, `vN`, ...).
#[derive(Debug, Clone)]
pub struct TemplateParam {
    /// Parameter name including its `t`/`v` prefix.
    pub name: String,
    pub value: TemplateValue,
}

impl TemplateParam {
    pub fn ty(name: impl Into<String>, ty: Arc<TypeDescriptor>) -> Self {
        Self {
            name: name.into(),
            value: TemplateValue::Type(ty),
        }
    }

    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value: TemplateValue::Int(value),
        }
    }
}

/// Interface implemented by a class.
#[derive(Debug, Clone)]
pub struct Interface {
    pub ty: Arc<TypeDescriptor>,
    pub value: u32,
}

/// Member of a class type.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    /// Offset under the native layout (tagfile offsets).
    pub offset: u32,
    /// Declared type: plain descriptor or a wrapper instantiation.
    pub ty: Arc<TypeDescriptor>,
    pub flags: MemberFlags,
}

impl Member {
    pub fn new(name: impl Into<String>, ty: Arc<TypeDescriptor>) -> Self {
        Self {
            name: name.into(),
            offset: 0,
            ty,
            flags: MemberFlags::DEFAULT,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: MemberFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Static description of one serializable type.
#[derive(Clone)]
pub struct TypeDescriptor {
    pub name: String,
    /// Qualified name used by the file formats, when it differs from `name`.
    pub real_name: Option<String>,
    pub alignment: Extent,
    pub byte_size: Extent,
    pub tag_type: u32,
    /// Tagfile-only: which optional fields are physically present.
    pub format_flags: Option<FormatFlags>,
    pub version: u32,
    pub abstract_value: u32,
    /// Structural signature hash, when known.
    pub hash: Option<u32>,
    pub templates: Vec<TemplateParam>,
    pub interfaces: Vec<Interface>,
    pub parent: Option<Arc<TypeDescriptor>>,
    /// Locally declared members only.
    pub members: Vec<Member>,
    /// Present on generic wrapper instantiations.
    pub wrapper: Option<Wrapper>,
    kind_cache: OnceLock<TagDataKind>,
}

impl TypeDescriptor {
    /// Create a bare descriptor.
    pub fn new(name: impl Into<String>, tag_type: u32, byte_size: Extent, alignment: Extent) -> Self {
        Self {
            name: name.into(),
            real_name: None,
            alignment,
            byte_size,
            tag_type,
            format_flags: None,
            version: 0,
            abstract_value: 0,
            hash: None,
            templates: Vec::new(),
            interfaces: Vec::new(),
            parent: None,
            members: Vec::new(),
            wrapper: None,
            kind_cache: OnceLock::new(),
        }
    }

    /// Name written to file type tables.
    pub fn file_name(&self) -> &str {
        self.real_name.as_deref().unwrap_or(&self.name)
    }

    /// Primitive kind from the low 8 bits of the tag-type code.
    pub fn tag_data_kind(&self) -> TagDataKind {
        *self
            .kind_cache
            .get_or_init(|| TagDataKind::from_tag(self.tag_type))
    }

    /// Routine for non-wrapper types; `None` for wrappers.
    pub fn dispatch(&self) -> Option<Dispatch> {
        if self.wrapper.is_some() {
            return None;
        }
        Dispatch::from_tag(self.tag_type)
    }

    pub fn wrapper_kind(&self) -> Option<&WrapperKind> {
        self.wrapper.as_ref().map(|w| &w.kind)
    }

    /// Byte size with the pointer-sized sentinel resolved.
    pub fn effective_byte_size(&self, pointer_size: u32) -> u32 {
        match &self.wrapper {
            Some(w) => w.byte_size(pointer_size).max(match self.byte_size {
                Extent::Fixed(v) => v,
                Extent::PointerSized => 0,
            }),
            None => self.byte_size.resolve(pointer_size),
        }
    }

    /// Alignment with the pointer-sized sentinel resolved.
    pub fn effective_alignment(&self, pointer_size: u32) -> u32 {
        let own = self.alignment.resolve(pointer_size).max(1);
        match &self.wrapper {
            Some(w) => w.alignment(pointer_size).max(own),
            None => own,
        }
    }

    /// Parent's effective members followed by the local ones.
    pub fn effective_members(&self) -> Vec<&Member> {
        let mut out = match &self.parent {
            Some(p) => p.effective_members(),
            None => Vec::new(),
        };
        out.extend(self.members.iter());
        out
    }

    pub fn effective_member_count(&self) -> usize {
        self.parent
            .as_ref()
            .map_or(0, |p| p.effective_member_count())
            + self.members.len()
    }

    /// Index of a member in the effective member list.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.effective_members().iter().position(|m| m.name == name)
    }

    /// Whether `self` is `ancestor` or derives from it.
    pub fn is_subclass_of(&self, ancestor: &str) -> bool {
        if self.name == ancestor {
            return true;
        }
        self.parent
            .as_ref()
            .is_some_and(|p| p.is_subclass_of(ancestor))
    }

    /// Whether a local member is a named-variant pointer.
    pub fn has_named_variant(&self) -> bool {
        self.effective_members()
            .iter()
            .any(|m| matches!(m.ty.wrapper_kind(), Some(WrapperKind::NamedVariant)))
    }

    /// Pointer-like, array-like or tuple element type.
    pub fn pointer_target(&self) -> Option<&Arc<TypeDescriptor>> {
        self.wrapper.as_ref().and_then(|w| match w.kind {
            WrapperKind::Enum { .. } => None,
            _ => Some(&w.element),
        })
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Parents and member types are printed by name to keep output flat
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("tag_type", &format_args!("{:#x}", self.tag_type))
            .field("byte_size", &self.byte_size)
            .field("alignment", &self.alignment)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field(
                "members",
                &self
                    .members
                    .iter()
                    .map(|m| (m.name.as_str(), m.ty.name.as_str(), m.offset))
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tag;

    fn int32() -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor::new(
            "hkInt32",
            tag::TagDataKind::Int.code() | tag::IS_SIGNED | tag::INT32,
            Extent::Fixed(4),
            Extent::Fixed(4),
        ))
    }

    #[test]
    fn test_extent_sentinel() {
        assert_eq!(Extent::from_raw(-1), Extent::PointerSized);
        assert_eq!(Extent::PointerSized.resolve(4), 4);
        assert_eq!(Extent::PointerSized.resolve(8), 8);
        assert_eq!(Extent::Fixed(12).raw(), 12);
    }

    #[test]
    fn test_effective_members_parent_first() {
        let mut base = TypeDescriptor::new("Base", 7, Extent::Fixed(4), Extent::Fixed(4));
        base.members.push(Member::new("a", int32()));
        let base = Arc::new(base);

        let mut derived = TypeDescriptor::new("Derived", 7, Extent::Fixed(8), Extent::Fixed(4));
        derived.parent = Some(base);
        derived.members.push(Member::new("b", int32()));
        derived.members.push(Member::new("c", int32()));

        let names: Vec<_> = derived
            .effective_members()
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(derived.effective_member_count(), 3);
        assert_eq!(derived.member_index("c"), Some(2));
        assert!(derived.is_subclass_of("Base"));
        assert!(!derived.is_subclass_of("Other"));
    }

    #[test]
    fn test_tag_data_kind_cached() {
        let t = int32();
        assert_eq!(t.tag_data_kind(), TagDataKind::Int);
        assert_eq!(t.tag_data_kind(), TagDataKind::Int);
    }

    #[test]
    fn test_format_flag_bits() {
        let flags = FormatFlags::empty()
            .with(FormatFlags::SUBTYPE)
            .with(FormatFlags::MEMBERS);
        assert!(flags.contains(FormatFlags::MEMBERS));
        assert!(!flags.contains(FormatFlags::VERSION));
        assert_eq!(FormatFlags(0x80).unknown_bits(), 0x80);
        assert_eq!(flags.unknown_bits(), 0);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary layout of types under a set of compiler layout rules.
//!
//! ```text
//! reuse_padding_optimization = 0        reuse_padding_optimization = 1
//! +--------+----+----+                  +--------+----+
//! | base a | b  |pad |  c  | pad |      | base a | b  | c | pad |
//! +--------+----+----+-----+-----+      +--------+----+---+-----+
//! ```
//!
//! With the optimization disabled every class-hierarchy tier is rounded up
//! to its alignment before the derived members start; enabled, derived
//! members may sit in the base's tail padding and the class is padded once.

use crate::error::{HkxError, Result};
use crate::types::{Dispatch, TypeDescriptor, WrapperKind};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The four layout-rule bytes of a packfile header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayoutRules {
    /// 4 or 8.
    pub pointer_size: u8,
    pub little_endian: bool,
    pub reuse_padding_optimization: bool,
    pub empty_base_class_optimization: bool,
}

impl LayoutRules {
    /// 64-bit little-endian, tier padding kept. Tagfiles always use this.
    pub const NATIVE: Self = Self {
        pointer_size: 8,
        little_endian: true,
        reuse_padding_optimization: false,
        empty_base_class_optimization: true,
    };

    /// 32-bit little-endian variant of [`LayoutRules::NATIVE`].
    pub const NATIVE_32: Self = Self {
        pointer_size: 4,
        ..Self::NATIVE
    };

    /// Parse the header bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Result<Self> {
        if bytes[0] != 4 && bytes[0] != 8 {
            return Err(HkxError::structural(format!(
                "unsupported pointer size {}",
                bytes[0]
            )));
        }
        Ok(Self {
            pointer_size: bytes[0],
            little_endian: bytes[1] != 0,
            reuse_padding_optimization: bytes[2] != 0,
            empty_base_class_optimization: bytes[3] != 0,
        })
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        [
            self.pointer_size,
            self.little_endian as u8,
            self.reuse_padding_optimization as u8,
            self.empty_base_class_optimization as u8,
        ]
    }

    pub const fn pointer_size(self) -> u32 {
        self.pointer_size as u32
    }
}

impl Default for LayoutRules {
    fn default() -> Self {
        Self::NATIVE
    }
}

/// Round `value` up to a power-of-two-or-not alignment.
pub const fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment).saturating_mul(alignment)
}

/// Computed layout of a class under one rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLayout {
    /// Padded size.
    pub size: u32,
    /// End of the last member before tail padding.
    pub unpadded: u32,
    pub alignment: u32,
    /// Offsets of the effective members, parent members first.
    pub offsets: Vec<u32>,
}

/// Per-session cache of class layouts.
#[derive(Debug)]
pub struct LayoutCache {
    rules: LayoutRules,
    classes: HashMap<String, Arc<ClassLayout>>,
}

impl LayoutCache {
    pub fn new(rules: LayoutRules) -> Self {
        Self {
            rules,
            classes: HashMap::new(),
        }
    }

    pub fn rules(&self) -> LayoutRules {
        self.rules
    }

    /// Size of any type.
    pub fn size_of(&mut self, ty: &TypeDescriptor) -> u32 {
        let ptr = self.rules.pointer_size();
        match &ty.wrapper {
            Some(w) => match &w.kind {
                WrapperKind::FixedStruct { length } => {
                    let element = self.size_of(&w.element);
                    let declared = ty.byte_size.resolve(ptr);
                    length.saturating_mul(element).max(declared)
                }
                WrapperKind::Enum { .. } => self.size_of(&w.element),
                _ => w.byte_size(ptr),
            },
            None => match ty.dispatch() {
                Some(Dispatch::Members) => self.class(ty).size,
                _ => ty.byte_size.resolve(ptr),
            },
        }
    }

    /// Alignment of any type.
    pub fn align_of(&mut self, ty: &TypeDescriptor) -> u32 {
        let ptr = self.rules.pointer_size();
        let declared = ty.alignment.resolve(ptr).max(1);
        match &ty.wrapper {
            Some(w) => match &w.kind {
                WrapperKind::FixedStruct { .. } | WrapperKind::Enum { .. } => {
                    self.align_of(&w.element).max(declared)
                }
                _ => w.alignment(ptr).max(declared),
            },
            None => match ty.dispatch() {
                Some(Dispatch::Members) => self.class(ty).alignment,
                _ => declared,
            },
        }
    }

    /// Layout of a class (or member-described float) type.
    pub fn class(&mut self, ty: &TypeDescriptor) -> Arc<ClassLayout> {
        if let Some(hit) = self.classes.get(&ty.name) {
            return hit.clone();
        }
        let ptr = self.rules.pointer_size();

        let (mut offset, mut alignment, mut offsets) = match &ty.parent {
            Some(parent) => {
                let base = self.class(parent);
                let start = if self.rules.reuse_padding_optimization {
                    base.unpadded
                } else {
                    base.size
                };
                (start, base.alignment, base.offsets.clone())
            }
            None => (0, 1, Vec::new()),
        };

        for member in &ty.members {
            let member_align = self.align_of(&member.ty);
            offset = align_up(offset, member_align);
            offsets.push(offset);
            offset = offset.saturating_add(self.size_of(&member.ty));
            alignment = alignment.max(member_align);
        }
        alignment = alignment.max(ty.alignment.resolve(ptr)).max(1);

        if offsets.is_empty() {
            // Opaque class: declared extent (e.g. a vtable pointer)
            offset = offset.max(ty.byte_size.resolve(ptr));
        }
        let unpadded = offset;
        let mut size = align_up(unpadded, alignment);
        if size == 0 && !self.rules.empty_base_class_optimization {
            size = alignment;
        }

        let layout = Arc::new(ClassLayout {
            size,
            unpadded,
            alignment,
            offsets,
        });
        self.classes.insert(ty.name.clone(), layout.clone());
        layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassBuilder, TypeRegistry};

    fn two_tier(registry: &TypeRegistry) -> Arc<TypeDescriptor> {
        let base = registry.register(
            ClassBuilder::new("TierBase")
                .member("a", registry.expect_type("hkInt64"))
                .member("b", registry.expect_type("hkUint8"))
                .build(),
        );
        registry.register(
            ClassBuilder::new("TierDerived")
                .parent(&base)
                .member("c", registry.expect_type("hkUint8"))
                .build(),
        )
    }

    #[test]
    fn test_rule_bytes_round_trip() {
        let rules = LayoutRules::from_bytes([4, 1, 1, 0]).expect("rules");
        assert_eq!(rules.pointer_size(), 4);
        assert!(rules.reuse_padding_optimization);
        assert_eq!(rules.to_bytes(), [4, 1, 1, 0]);
        assert!(LayoutRules::from_bytes([6, 1, 0, 0]).is_err());
    }

    #[test]
    fn test_padding_policy_collapses_tiers() {
        let registry = TypeRegistry::with_base_types();
        let derived = two_tier(&registry);

        let mut tiered = LayoutCache::new(LayoutRules::NATIVE);
        let tiered_layout = tiered.class(&derived);
        assert_eq!(tiered_layout.offsets, [0, 8, 16]);
        assert_eq!(tiered_layout.size, 24);

        let mut collapsed = LayoutCache::new(LayoutRules {
            reuse_padding_optimization: true,
            ..LayoutRules::NATIVE
        });
        let collapsed_layout = collapsed.class(&derived);
        assert_eq!(collapsed_layout.offsets, [0, 8, 9]);
        assert_eq!(collapsed_layout.size, 16);
    }

    #[test]
    fn test_referenced_object_width() {
        let registry = TypeRegistry::with_base_types();
        let obj = registry.expect_type("hkReferencedObject");
        assert_eq!(LayoutCache::new(LayoutRules::NATIVE).size_of(&obj), 16);
        assert_eq!(LayoutCache::new(LayoutRules::NATIVE_32).size_of(&obj), 8);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(17, 4), 20);
        assert_eq!(align_up(5, 1), 5);
    }
}

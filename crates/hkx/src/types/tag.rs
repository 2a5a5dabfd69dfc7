// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tag-type codes: primitive kind in the low byte, width/sign flags above.

/// Mask selecting the data kind from a tag-type code.
pub const KIND_MASK: u32 = 0xFF;
/// Signed integer flag.
pub const IS_SIGNED: u32 = 0x200;
pub const INT8: u32 = 0x2000;
pub const INT16: u32 = 0x4000;
pub const INT32: u32 = 0x8000;
pub const INT64: u32 = 0x10000;
/// IEEE single precision; any other float width is described by members.
pub const FLOAT32: u32 = 0x17_4600;
/// Shift of a tuple's length above the kind byte.
pub const TUPLE_LENGTH_SHIFT: u32 = 8;

/// Primitive data kind stored in the low 8 bits of a tag-type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagDataKind {
    Void,
    Invalid,
    Bool,
    String,
    Int,
    Float,
    Pointer,
    Class,
    Array,
    Tuple,
    /// Low byte not recognized.
    Unknown(u8),
}

impl TagDataKind {
    /// Extract the kind from a full tag-type code.
    pub const fn from_tag(tag: u32) -> Self {
        match (tag & KIND_MASK) as u8 {
            0 => Self::Void,
            1 => Self::Invalid,
            2 => Self::Bool,
            3 => Self::String,
            4 => Self::Int,
            5 => Self::Float,
            6 => Self::Pointer,
            7 => Self::Class,
            8 => Self::Array,
            40 => Self::Tuple,
            other => Self::Unknown(other),
        }
    }

    /// Low-byte code of this kind.
    pub const fn code(self) -> u32 {
        match self {
            Self::Void => 0,
            Self::Invalid => 1,
            Self::Bool => 2,
            Self::String => 3,
            Self::Int => 4,
            Self::Float => 5,
            Self::Pointer => 6,
            Self::Class => 7,
            Self::Array => 8,
            Self::Tuple => 40,
            Self::Unknown(b) => b as u32,
        }
    }

    /// Whether a tagfile body carries a pointer-target index for this kind.
    pub const fn has_pointer_target(self) -> bool {
        matches!(self, Self::Pointer | Self::Array | Self::Tuple)
    }
}

/// Width in bytes encoded by the integer width flags (`None` when absent).
pub const fn int_width(tag: u32) -> Option<usize> {
    if tag & INT64 != 0 {
        Some(8)
    } else if tag & INT32 != 0 {
        Some(4)
    } else if tag & INT16 != 0 {
        Some(2)
    } else if tag & INT8 != 0 {
        Some(1)
    } else {
        None
    }
}

/// Integer width flag for a byte width.
pub const fn int_flag(width: usize) -> u32 {
    match width {
        1 => INT8,
        2 => INT16,
        4 => INT32,
        _ => INT64,
    }
}

/// Routine selected for a non-wrapper type by its tag-type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No bytes (Void / Invalid).
    Nothing,
    /// Boolean stored in `width` bytes.
    Bool { width: usize },
    /// Integer of `width` bytes.
    Int { width: usize, signed: bool },
    /// Inline IEEE single.
    F32,
    /// Pointer-sized slot referencing a NUL-terminated string.
    String,
    /// Recurse into the effective member list.
    Members,
}

impl Dispatch {
    /// The fixed dispatch table keyed by tag-data kind.
    ///
    /// Returns `None` for kinds that only occur on wrapper descriptors.
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match TagDataKind::from_tag(tag) {
            TagDataKind::Void | TagDataKind::Invalid => Some(Self::Nothing),
            TagDataKind::Bool => Some(Self::Bool {
                width: match int_width(tag) {
                    Some(w) => w,
                    None => 1,
                },
            }),
            TagDataKind::Int => Some(Self::Int {
                width: match int_width(tag) {
                    Some(w) => w,
                    None => 4,
                },
                signed: tag & IS_SIGNED != 0,
            }),
            TagDataKind::Float if tag & FLOAT32 == FLOAT32 => Some(Self::F32),
            TagDataKind::Float | TagDataKind::Class => Some(Self::Members),
            TagDataKind::String => Some(Self::String),
            _ => None,
        }
    }
}

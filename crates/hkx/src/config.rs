// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HKX format configuration - single source of truth.
//!
//! Every magic number, tag and flag bit used by the two container formats
//! lives here. Codec modules never hardcode them.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: format constants (magics, chunk tags, fill bytes)
//! - **Level 2 (Runtime)**: [`PackfileOptions`] / [`TagfileOptions`], which a
//!   decoder fills from the file so a re-encode reproduces it verbatim

use crate::layout::LayoutRules;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Packfile constants
// ============================================================================

/// First header magic word.
pub const PACKFILE_MAGIC0: u32 = 0x57E0_E057;
/// Second header magic word.
pub const PACKFILE_MAGIC1: u32 = 0x10C0_C010;

/// Fixed number of sections in every packfile.
pub const PACKFILE_SECTION_COUNT: u32 = 3;

/// Section tags, written zero-padded into a 19-byte field.
pub const SECTION_TAG_CLASSNAMES: &str = "__classnames__";
pub const SECTION_TAG_TYPES: &str = "__types__";
pub const SECTION_TAG_DATA: &str = "__data__";

/// Width of the section tag field, excluding the sentinel byte.
pub const SECTION_TAG_LEN: usize = 19;
/// Byte following every section tag.
pub const SECTION_SENTINEL: u8 = 0xFF;

/// Width of the contents-version field (14 ASCII chars + NUL + 0xFF).
pub const CONTENTS_VERSION_FIELD: usize = 16;
/// Number of significant ASCII characters in the contents-version field.
pub const CONTENTS_VERSION_LEN: usize = 14;

/// Alignment of every major block in a packfile.
pub const PACKFILE_BLOCK_ALIGN: usize = 16;
/// Fill byte between major blocks and at the end of fixup tables.
pub const PACKFILE_BLOCK_FILL: u8 = 0xFF;
/// Fill byte used for padding inside the data section.
pub const PACKFILE_DATA_FILL: u8 = 0x00;

/// Separator between a class hash and its name in `__classnames__`.
pub const CLASSNAME_SEPARATOR: u8 = 0x09;

/// Terminator of every fixup table.
pub const FIXUP_TERMINATOR: u32 = 0xFFFF_FFFF;

/// Flag OR-ed into a serialized array's capacity word.
pub const ARRAY_DONT_DEALLOCATE: u32 = 0x8000_0000;

/// Known packfile header versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PackfileVersion {
    /// Havok 5.x.
    V5,
    /// Havok 7.x.
    V8,
    /// Havok 2010-2012.
    V9,
    /// Havok 2014 (adds the header extension).
    V11,
}

impl PackfileVersion {
    /// On-disk version code.
    pub const fn code(self) -> u32 {
        match self {
            Self::V5 => 0x05,
            Self::V8 => 0x08,
            Self::V9 => 0x09,
            Self::V11 => 0x0B,
        }
    }

    /// Parse an on-disk version code.
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0x05 => Some(Self::V5),
            0x08 => Some(Self::V8),
            0x09 => Some(Self::V9),
            0x0B => Some(Self::V11),
            _ => None,
        }
    }

    /// Whether the header carries the 16-byte extension block.
    pub const fn has_extension(self) -> bool {
        matches!(self, Self::V11)
    }

    /// Default contents-version string written by this engine generation.
    pub const fn default_contents_version(self) -> &'static str {
        match self {
            Self::V5 => "Havok-5.5.0-r1",
            Self::V8 => "Havok-7.1.0-r1",
            Self::V9 => "hk_2010.2.0-r1",
            Self::V11 => "hk_2014.1.0-r1",
        }
    }
}

/// Header extension present in version `0x0B` packfiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeaderExtension {
    pub max_predicate: i16,
    pub predicate_array_size_plus_padding: u16,
    pub reserved: [u32; 3],
}

impl Default for HeaderExtension {
    fn default() -> Self {
        Self {
            max_predicate: -1,
            predicate_array_size_plus_padding: 0,
            reserved: [FIXUP_TERMINATOR; 3],
        }
    }
}

/// Runtime options of a packfile; decoded files report the values they carried.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PackfileOptions {
    pub version: PackfileVersion,
    pub layout: LayoutRules,
    /// 14-character ASCII contents version.
    pub contents_version: String,
    pub user_tag: u32,
    pub flags: u32,
    /// Section index of `__classnames__`.
    pub classnames_section: u32,
    /// Section index of `__data__`.
    pub data_section: u32,
    /// Only written when `version.has_extension()`.
    pub extension: HeaderExtension,
}

impl PackfileOptions {
    /// Options for a given engine generation with default layout rules.
    pub fn for_version(version: PackfileVersion) -> Self {
        Self {
            version,
            layout: LayoutRules::NATIVE,
            contents_version: version.default_contents_version().to_string(),
            user_tag: 0,
            flags: 0,
            classnames_section: 0,
            data_section: 2,
            extension: HeaderExtension::default(),
        }
    }

    /// Builder-style layout override.
    pub fn with_layout(mut self, layout: LayoutRules) -> Self {
        self.layout = layout;
        self
    }

    /// Index of the remaining (`__types__`) section.
    pub fn types_section(&self) -> u32 {
        (0..PACKFILE_SECTION_COUNT)
            .find(|i| *i != self.classnames_section && *i != self.data_section)
            .unwrap_or(1)
    }
}

impl Default for PackfileOptions {
    fn default() -> Self {
        Self::for_version(PackfileVersion::V11)
    }
}

// ============================================================================
// Tagfile constants
// ============================================================================

/// Chunk tags.
pub mod tags {
    pub const TAG0: [u8; 4] = *b"TAG0";
    pub const TCM0: [u8; 4] = *b"TCM0";
    pub const SDKV: [u8; 4] = *b"SDKV";
    pub const DATA: [u8; 4] = *b"DATA";
    pub const TYPE: [u8; 4] = *b"TYPE";
    pub const TCRF: [u8; 4] = *b"TCRF";
    pub const TPTR: [u8; 4] = *b"TPTR";
    pub const TSTR: [u8; 4] = *b"TSTR";
    pub const TNAM: [u8; 4] = *b"TNAM";
    pub const TNA1: [u8; 4] = *b"TNA1";
    pub const FSTR: [u8; 4] = *b"FSTR";
    pub const TBOD: [u8; 4] = *b"TBOD";
    pub const TBDY: [u8; 4] = *b"TBDY";
    pub const THSH: [u8; 4] = *b"THSH";
    pub const TPAD: [u8; 4] = *b"TPAD";
    pub const TCID: [u8; 4] = *b"TCID";
    pub const INDX: [u8; 4] = *b"INDX";
    pub const ITEM: [u8; 4] = *b"ITEM";
    pub const PTCH: [u8; 4] = *b"PTCH";
}

/// Chunk header size (size word + tag).
pub const CHUNK_HEADER_LEN: usize = 8;
/// Mask of the size bits in a chunk header word.
pub const CHUNK_SIZE_MASK: u32 = 0x3FFF_FFFF;
/// Flag bits of a leaf (payload-only) chunk.
pub const CHUNK_LEAF_FLAG: u32 = 0x4000_0000;

/// Length of the SDK version string.
pub const SDK_VERSION_LEN: usize = 8;
/// Default SDK version written to new tagfiles.
pub const DEFAULT_SDK_VERSION: &str = "20160200";

/// Item-table flag: the item is the target of an object pointer.
pub const ITEM_FLAG_POINTER: u8 = 0x10;
/// Width of the item-table type index.
pub const ITEM_TYPE_MASK: u32 = 0x00FF_FFFF;

/// Bytes of `TPTR` payload reserved per type (null type included).
pub const TPTR_ENTRY_LEN: usize = 8;

/// Which names/bodies chunk variant a tagfile uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TypeChunkVariant {
    /// `TNAM` + `TBOD`.
    #[default]
    Classic,
    /// `TNA1` + `TBDY`.
    Revised,
}

impl TypeChunkVariant {
    pub const fn names_tag(self) -> [u8; 4] {
        match self {
            Self::Classic => tags::TNAM,
            Self::Revised => tags::TNA1,
        }
    }

    pub const fn body_tag(self) -> [u8; 4] {
        match self {
            Self::Classic => tags::TBOD,
            Self::Revised => tags::TBDY,
        }
    }
}

/// Runtime options of a tagfile.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TagfileOptions {
    /// 8-character SDK version.
    pub sdk_version: String,
    pub chunk_variant: TypeChunkVariant,
    /// When set, the file references this compendium instead of embedding types.
    pub compendium_id: Option<u64>,
}

impl Default for TagfileOptions {
    fn default() -> Self {
        Self {
            sdk_version: DEFAULT_SDK_VERSION.to_string(),
            chunk_variant: TypeChunkVariant::default(),
            compendium_id: None,
        }
    }
}

/// Decode-time switches for tagfiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TagfileDecodeOptions {
    /// Cross-check the embedded type section against compiled descriptors.
    pub validate: bool,
}

impl Default for TagfileDecodeOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

// ============================================================================
// Shared names
// ============================================================================

/// Root of every type a named variant may point at.
pub const REFERENCED_OBJECT: &str = "hkReferencedObject";
/// Member of a named variant holding the variant's own name.
pub const VARIANT_NAME_MEMBER: &str = "name";
/// Member of a named variant holding the payload's class name.
pub const VARIANT_CLASS_NAME_MEMBER: &str = "className";
/// Element type of tagfile string items.
pub const CHAR_TYPE: &str = "char";
/// Root object of every packfile.
pub const ROOT_CONTAINER: &str = "hkRootLevelContainer";
/// Element of the root container's variant array.
pub const ROOT_NAMED_VARIANT: &str = "hkRootLevelContainerNamedVariant";

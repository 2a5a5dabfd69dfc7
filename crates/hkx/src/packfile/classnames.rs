// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The `__classnames__` section.
//!
//! ```text
//! +-----------+------+----------------------+
//! | hash (4)  | 0x09 | name, NUL            |   repeated, then 0xFF fill
//! +-----------+------+----------------------+
//! ```
//!
//! Virtual fixups point at the first byte of `name`.

use crate::config::{PackfileVersion, CLASSNAME_SEPARATOR, PACKFILE_BLOCK_ALIGN, PACKFILE_BLOCK_FILL};
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{HkxError, Result};
use crate::types::TypeDescriptor;

/// Reflection classes every packfile lists ahead of its own classes.
const PREAMBLE: [&str; 4] = ["hkClass", "hkClassMember", "hkClassEnum", "hkClassEnumItem"];

/// Hashes for names whose hash is not carried by compiled descriptors.
fn override_hash(version: PackfileVersion, name: &str) -> Option<u32> {
    let modern = version.has_extension();
    match name {
        "hkClass" if modern => Some(0x33D4_2383),
        "hkClass" => Some(0x7558_5EF6),
        "hkClassMember" if modern => Some(0xB0EF_A719),
        "hkClassMember" => Some(0x5C7E_A4C2),
        "hkClassEnum" => Some(0x8A36_09CF),
        "hkClassEnumItem" => Some(0xCE6F_8A6C),
        "hkRootLevelContainer" => Some(0x2772_C11E),
        _ => None,
    }
}

/// Signature hash written for a class: override table first, then the
/// descriptor's own hash.
pub(crate) fn class_hash(version: PackfileVersion, desc: &TypeDescriptor) -> Result<u32> {
    override_hash(version, &desc.name)
        .or(desc.hash)
        .ok_or_else(|| HkxError::MissingHash {
            type_name: desc.name.clone(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClassNameEntry {
    pub hash: u32,
    pub name: String,
    /// Section-relative offset of the name's first byte.
    pub offset: u32,
}

/// Parsed or to-be-written class name table.
#[derive(Debug, Clone, Default)]
pub(crate) struct ClassNames {
    entries: Vec<ClassNameEntry>,
}

impl ClassNames {
    /// Preamble followed by `classes` (first occurrence order, deduplicated).
    pub fn build<'a>(
        version: PackfileVersion,
        classes: impl IntoIterator<Item = &'a TypeDescriptor>,
    ) -> Result<Self> {
        let mut table = Self::default();
        let mut offset = 0u32;
        let mut push = |table: &mut Self, name: &str, hash: u32| {
            if table.entries.iter().any(|e| e.name == name) {
                return;
            }
            // hash (4) + separator (1) precede the name
            offset += 5;
            table.entries.push(ClassNameEntry {
                hash,
                name: name.to_string(),
                offset,
            });
            offset += name.len() as u32 + 1;
        };
        for name in PREAMBLE {
            let hash = override_hash(version, name).unwrap_or_default();
            push(&mut table, name, hash);
        }
        for desc in classes {
            let hash = class_hash(version, desc)?;
            push(&mut table, &desc.name, hash);
        }
        Ok(table)
    }

    pub fn entries(&self) -> &[ClassNameEntry] {
        &self.entries
    }

    pub fn offset_of(&self, name: &str) -> Option<u32> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.offset)
    }

    pub fn entry_at(&self, offset: u32) -> Option<&ClassNameEntry> {
        self.entries.iter().find(|e| e.offset == offset)
    }

    /// Section body, padded to the block alignment.
    pub fn write(&self, little_endian: bool) -> Vec<u8> {
        let mut w = ByteWriter::new(little_endian);
        for entry in &self.entries {
            w.write_u32(entry.hash);
            w.write_u8(CLASSNAME_SEPARATOR);
            w.write_cstr(&entry.name);
        }
        w.align(PACKFILE_BLOCK_ALIGN, PACKFILE_BLOCK_FILL);
        w.into_inner()
    }

    /// Parse records until the fill bytes.
    pub fn read(body: &[u8], little_endian: bool) -> Result<Self> {
        let mut r = ByteReader::new(body, little_endian);
        let mut entries = Vec::new();
        while r.remaining() >= 6 && r.u8_at(r.offset() + 4)? == CLASSNAME_SEPARATOR {
            let hash = r.read_u32()?;
            r.skip(1)?;
            let offset = r.offset() as u32;
            let name = r
                .read_cstr()
                .map_err(|e| HkxError::structural(format!("class name at {offset}: {e}")))?;
            entries.push(ClassNameEntry {
                hash,
                name: name.to_string(),
                offset,
            });
        }
        Ok(Self { entries })
    }
}

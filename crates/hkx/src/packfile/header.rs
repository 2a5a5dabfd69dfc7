// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packfile header and section headers.
//!
//! # File Header
//!
//! ```text
//! +--------------------------------------------------------------+
//! | magic0 (4) | magic1 (4) | user_tag (4) | version (4)         |
//! | layout rules (4) | num_sections (4)                          |
//! | contents_section_index (4) | contents_section_offset (4)     |
//! | class_name_section_index (4) | class_name_section_offset (4) |
//! | contents_version (16) | flags (4) | pad 0xFF (4)             |
//! +--------------------------------------------------------------+
//! | version 0x0B only: max_predicate (2) | pred_size (2)         |
//! |                    reserved (3 x 4)                          |
//! +--------------------------------------------------------------+
//! ```
//!
//! # Section Header
//!
//! ```text
//! +--------------------------------------------------------------+
//! | tag (19, NUL padded) | 0xFF                                  |
//! | absolute_data_start | local | global | virtual               |
//! | exports | imports | end       (offsets from data start)      |
//! | version 0x0B only: 16 x 0xFF                                 |
//! +--------------------------------------------------------------+
//! ```
//!
//! Magic words read the same in either byte order, so the layout-rule
//! bytes at offset 16 are decoded first to pick the order.

use crate::config::{
    HeaderExtension, PackfileVersion, CONTENTS_VERSION_FIELD, CONTENTS_VERSION_LEN,
    FIXUP_TERMINATOR, PACKFILE_BLOCK_FILL, PACKFILE_MAGIC0, PACKFILE_MAGIC1,
    PACKFILE_SECTION_COUNT, SECTION_SENTINEL, SECTION_TAG_LEN,
};
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{HkxError, Result};
use crate::layout::LayoutRules;

/// Offset of the layout-rule bytes.
const LAYOUT_OFFSET: usize = 16;

/// Decoded file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileHeader {
    pub user_tag: u32,
    pub version: PackfileVersion,
    pub layout: LayoutRules,
    pub contents_section_index: u32,
    pub contents_section_offset: u32,
    pub class_name_section_index: u32,
    pub class_name_section_offset: u32,
    pub contents_version: String,
    pub flags: u32,
    pub extension: Option<HeaderExtension>,
}

impl FileHeader {
    pub const BASE_SIZE: usize = 64;
    pub const EXTENSION_SIZE: usize = 16;

    /// Encoded size including the extension.
    pub fn size(version: PackfileVersion) -> usize {
        if version.has_extension() {
            Self::BASE_SIZE + Self::EXTENSION_SIZE
        } else {
            Self::BASE_SIZE
        }
    }

    pub fn write(&self, w: &mut ByteWriter) -> Result<()> {
        if self.contents_version.len() > CONTENTS_VERSION_LEN || !self.contents_version.is_ascii() {
            return Err(HkxError::invalid_value(
                "contents_version",
                format!("must be at most {CONTENTS_VERSION_LEN} ASCII characters"),
            ));
        }
        w.write_u32(PACKFILE_MAGIC0);
        w.write_u32(PACKFILE_MAGIC1);
        w.write_u32(self.user_tag);
        w.write_u32(self.version.code());
        w.write_bytes(&self.layout.to_bytes());
        w.write_u32(PACKFILE_SECTION_COUNT);
        w.write_u32(self.contents_section_index);
        w.write_u32(self.contents_section_offset);
        w.write_u32(self.class_name_section_index);
        w.write_u32(self.class_name_section_offset);

        let mut field = [0u8; CONTENTS_VERSION_FIELD];
        field[..self.contents_version.len()].copy_from_slice(self.contents_version.as_bytes());
        field[CONTENTS_VERSION_FIELD - 1] = PACKFILE_BLOCK_FILL;
        w.write_bytes(&field);

        w.write_u32(self.flags);
        w.write_u32(FIXUP_TERMINATOR);

        if let Some(ext) = &self.extension {
            w.write_i16(ext.max_predicate);
            w.write_u16(ext.predicate_array_size_plus_padding);
            for word in ext.reserved {
                w.write_u32(word);
            }
        }
        Ok(())
    }

    /// Parse the header; the returned reader is positioned after it and
    /// uses the file's byte order.
    pub fn read(bytes: &[u8]) -> Result<(Self, ByteReader<'_>)> {
        let probe = ByteReader::new(bytes, true);
        let rule_bytes = probe.bytes_at(LAYOUT_OFFSET, 4)?;
        let layout =
            LayoutRules::from_bytes([rule_bytes[0], rule_bytes[1], rule_bytes[2], rule_bytes[3]])?;

        let mut r = ByteReader::new(bytes, layout.little_endian);
        let magic0 = r.read_u32()?;
        let magic1 = r.read_u32()?;
        if magic0 != PACKFILE_MAGIC0 || magic1 != PACKFILE_MAGIC1 {
            return Err(HkxError::structural(format!(
                "bad packfile magic {magic0:#010x} {magic1:#010x}"
            )));
        }
        let user_tag = r.read_u32()?;
        let code = r.read_u32()?;
        let version = PackfileVersion::from_code(code)
            .ok_or_else(|| HkxError::structural(format!("unsupported packfile version {code:#x}")))?;
        r.skip(4)?;
        let num_sections = r.read_u32()?;
        if num_sections != PACKFILE_SECTION_COUNT {
            return Err(HkxError::structural(format!(
                "expected {PACKFILE_SECTION_COUNT} sections, found {num_sections}"
            )));
        }
        let contents_section_index = r.read_u32()?;
        let contents_section_offset = r.read_u32()?;
        let class_name_section_index = r.read_u32()?;
        let class_name_section_offset = r.read_u32()?;

        let field = r.read_bytes(CONTENTS_VERSION_FIELD)?;
        let end = field
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(CONTENTS_VERSION_LEN)
            .min(CONTENTS_VERSION_LEN);
        let contents_version = std::str::from_utf8(&field[..end])
            .map_err(|e| HkxError::Decode(format!("contents version: {e}")))?
            .to_string();

        let flags = r.read_u32()?;
        r.skip(4)?;

        let extension = if version.has_extension() {
            let max_predicate = r.read_i16()?;
            let predicate_array_size_plus_padding = r.read_u16()?;
            let mut reserved = [0u32; 3];
            for word in &mut reserved {
                *word = r.read_u32()?;
            }
            Some(HeaderExtension {
                max_predicate,
                predicate_array_size_plus_padding,
                reserved,
            })
        } else {
            None
        };

        Ok((
            Self {
                user_tag,
                version,
                layout,
                contents_section_index,
                contents_section_offset,
                class_name_section_index,
                class_name_section_offset,
                contents_version,
                flags,
                extension,
            },
            r,
        ))
    }
}

/// One of the three section headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SectionHeader {
    pub tag: String,
    pub absolute_data_start: u32,
    pub local_fixups_offset: u32,
    pub global_fixups_offset: u32,
    pub virtual_fixups_offset: u32,
    pub exports_offset: u32,
    pub imports_offset: u32,
    pub end_offset: u32,
}

impl SectionHeader {
    pub const BASE_SIZE: usize = 48;
    pub const PADDING_SIZE: usize = 16;

    pub fn size(version: PackfileVersion) -> usize {
        if version.has_extension() {
            Self::BASE_SIZE + Self::PADDING_SIZE
        } else {
            Self::BASE_SIZE
        }
    }

    /// Header for a section body whose offsets are all `len` (no fixups).
    pub fn plain(tag: &str, start: u32, len: u32) -> Self {
        Self {
            tag: tag.to_string(),
            absolute_data_start: start,
            local_fixups_offset: len,
            global_fixups_offset: len,
            virtual_fixups_offset: len,
            exports_offset: len,
            imports_offset: len,
            end_offset: len,
        }
    }

    pub fn write(&self, w: &mut ByteWriter, version: PackfileVersion) {
        let mut tag = [0u8; SECTION_TAG_LEN];
        let n = self.tag.len().min(SECTION_TAG_LEN);
        tag[..n].copy_from_slice(&self.tag.as_bytes()[..n]);
        w.write_bytes(&tag);
        w.write_u8(SECTION_SENTINEL);
        for word in [
            self.absolute_data_start,
            self.local_fixups_offset,
            self.global_fixups_offset,
            self.virtual_fixups_offset,
            self.exports_offset,
            self.imports_offset,
            self.end_offset,
        ] {
            w.write_u32(word);
        }
        if version.has_extension() {
            w.write_bytes(&[PACKFILE_BLOCK_FILL; Self::PADDING_SIZE]);
        }
    }

    pub fn read(r: &mut ByteReader<'_>, version: PackfileVersion) -> Result<Self> {
        let tag_bytes = r.read_bytes(SECTION_TAG_LEN)?;
        let end = tag_bytes.iter().position(|b| *b == 0).unwrap_or(SECTION_TAG_LEN);
        let tag = std::str::from_utf8(&tag_bytes[..end])
            .map_err(|e| HkxError::structural(format!("section tag: {e}")))?
            .to_string();
        let sentinel = r.read_u8()?;
        if sentinel != SECTION_SENTINEL {
            return Err(HkxError::structural(format!(
                "section `{tag}` sentinel is {sentinel:#04x}"
            )));
        }
        let header = Self {
            tag,
            absolute_data_start: r.read_u32()?,
            local_fixups_offset: r.read_u32()?,
            global_fixups_offset: r.read_u32()?,
            virtual_fixups_offset: r.read_u32()?,
            exports_offset: r.read_u32()?,
            imports_offset: r.read_u32()?,
            end_offset: r.read_u32()?,
        };
        if version.has_extension() {
            r.skip(Self::PADDING_SIZE)?;
        }
        let ordered = header.local_fixups_offset <= header.global_fixups_offset
            && header.global_fixups_offset <= header.virtual_fixups_offset
            && header.virtual_fixups_offset <= header.exports_offset
            && header.exports_offset <= header.end_offset
            && header.imports_offset <= header.end_offset;
        if !ordered {
            return Err(HkxError::structural(format!(
                "section `{}` has out-of-order table offsets",
                header.tag
            )));
        }
        Ok(header)
    }

    /// Body bytes of this section.
    pub fn body<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.absolute_data_start as usize;
        let end = start + self.end_offset as usize;
        bytes.get(start..end).ok_or_else(|| {
            HkxError::structural(format!(
                "section `{}` spans {start}..{end} past end of file ({})",
                self.tag,
                bytes.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SECTION_TAG_DATA;

    fn header(version: PackfileVersion, layout: LayoutRules) -> FileHeader {
        FileHeader {
            user_tag: 0,
            version,
            layout,
            contents_section_index: 2,
            contents_section_offset: 0,
            class_name_section_index: 0,
            class_name_section_offset: 75,
            contents_version: version.default_contents_version().to_string(),
            flags: 0,
            extension: version.has_extension().then(HeaderExtension::default),
        }
    }

    #[test]
    fn test_header_sizes() {
        for (version, size) in [(PackfileVersion::V9, 64), (PackfileVersion::V11, 80)] {
            let mut w = ByteWriter::new(true);
            header(version, LayoutRules::NATIVE)
                .write(&mut w)
                .expect("header");
            assert_eq!(w.len(), size);
            assert_eq!(FileHeader::size(version), size);
        }
    }

    #[test]
    fn test_big_endian_header_round_trip() {
        let layout = LayoutRules {
            pointer_size: 4,
            little_endian: false,
            ..LayoutRules::NATIVE
        };
        let original = header(PackfileVersion::V8, layout);
        let mut w = ByteWriter::new(false);
        original.write(&mut w).expect("header");
        let bytes = w.into_inner();
        // Palindromic magic
        assert_eq!(&bytes[..4], &[0x57, 0xE0, 0xE0, 0x57]);

        let (parsed, r) = FileHeader::read(&bytes).expect("parse");
        assert_eq!(parsed, original);
        assert_eq!(r.offset(), 64);
        assert!(!r.little_endian());
    }

    #[test]
    fn test_bad_magic_is_structural() {
        let mut w = ByteWriter::new(true);
        header(PackfileVersion::V9, LayoutRules::NATIVE)
            .write(&mut w)
            .expect("header");
        let mut bytes = w.into_inner();
        bytes[5] ^= 0xFF;
        assert!(matches!(
            FileHeader::read(&bytes),
            Err(HkxError::Structural(_))
        ));
    }

    #[test]
    fn test_section_header_round_trip() {
        let section = SectionHeader {
            tag: SECTION_TAG_DATA.to_string(),
            absolute_data_start: 0x150,
            local_fixups_offset: 0x40,
            global_fixups_offset: 0x50,
            virtual_fixups_offset: 0x60,
            exports_offset: 0x70,
            imports_offset: 0x70,
            end_offset: 0x70,
        };
        let mut w = ByteWriter::new(true);
        section.write(&mut w, PackfileVersion::V11);
        assert_eq!(w.len(), 64);
        assert_eq!(w.as_slice()[19], 0xFF);

        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes, true);
        assert_eq!(
            SectionHeader::read(&mut r, PackfileVersion::V11).expect("parse"),
            section
        );
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagfile chunk framing.
//!
//! ```text
//! +--------------------------+---------+----------------------+
//! | be_u32 flags:2 | size:30 | tag (4) | payload / children   |
//! +--------------------------+---------+----------------------+
//! ```
//!
//! `size` counts the header. Flags `00` mark a container whose payload is a
//! sequence of chunks, `01` a leaf.

use crate::config::{CHUNK_HEADER_LEN, CHUNK_LEAF_FLAG, CHUNK_SIZE_MASK};
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{HkxError, Result};

/// Alignment of every chunk payload.
const PAYLOAD_ALIGN: usize = 4;

/// A borrowed chunk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Chunk<'a> {
    pub tag: [u8; 4],
    pub leaf: bool,
    pub payload: &'a [u8],
}

pub(crate) fn tag_str(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

impl<'a> Chunk<'a> {
    /// Read one chunk at the cursor.
    pub fn read(r: &mut ByteReader<'a>) -> Result<Self> {
        let at = r.offset();
        let word = r.read_u32_be()?;
        let tag: [u8; 4] = r
            .read_bytes(4)?
            .try_into()
            .map_err(|_| HkxError::structural("short chunk tag"))?;
        let leaf = match word & !CHUNK_SIZE_MASK {
            0 => false,
            CHUNK_LEAF_FLAG => true,
            flags => {
                return Err(HkxError::structural(format!(
                    "chunk {} at offset {at} has reserved flags {flags:#010x}",
                    tag_str(&tag)
                )))
            }
        };
        let size = (word & CHUNK_SIZE_MASK) as usize;
        if size < CHUNK_HEADER_LEN {
            return Err(HkxError::structural(format!(
                "chunk {} at offset {at} is {size} bytes",
                tag_str(&tag)
            )));
        }
        let payload = r.read_bytes(size - CHUNK_HEADER_LEN)?;
        Ok(Self { tag, leaf, payload })
    }

    /// Read a chunk that must carry `tag`.
    pub fn expect(r: &mut ByteReader<'a>, tag: [u8; 4]) -> Result<Self> {
        let chunk = Self::read(r)?;
        if chunk.tag != tag {
            return Err(HkxError::structural(format!(
                "expected chunk {}, found {}",
                tag_str(&tag),
                tag_str(&chunk.tag)
            )));
        }
        Ok(chunk)
    }

    /// Chunks nested in a container's payload.
    pub fn children(&self) -> Result<Vec<Chunk<'a>>> {
        if self.leaf {
            return Err(HkxError::structural(format!(
                "chunk {} is a leaf",
                tag_str(&self.tag)
            )));
        }
        let mut r = ByteReader::new(self.payload, false);
        let mut out = Vec::new();
        while !r.is_eof() {
            out.push(Chunk::read(&mut r)?);
        }
        Ok(out)
    }

    /// Cursor over the payload.
    pub fn reader(&self) -> ByteReader<'a> {
        ByteReader::new(self.payload, true)
    }
}

/// Ordered walk over a container's children, one expected tag at a time.
pub(crate) struct Children<'a> {
    parent: [u8; 4],
    chunks: std::vec::IntoIter<Chunk<'a>>,
    peeked: Option<Chunk<'a>>,
}

impl<'a> Children<'a> {
    pub fn of(chunk: &Chunk<'a>) -> Result<Self> {
        Ok(Self {
            parent: chunk.tag,
            chunks: chunk.children()?.into_iter(),
            peeked: None,
        })
    }

    fn next_chunk(&mut self) -> Option<Chunk<'a>> {
        self.peeked.take().or_else(|| self.chunks.next())
    }

    /// Next child, which must carry one of `tags`.
    pub fn expect_any(&mut self, tags: &[[u8; 4]]) -> Result<Chunk<'a>> {
        let parent = tag_str(&self.parent);
        let chunk = self.next_chunk().ok_or_else(|| {
            HkxError::structural(format!(
                "{parent} ends before {}",
                tags.iter().map(tag_str).collect::<Vec<_>>().join("|")
            ))
        })?;
        if !tags.contains(&chunk.tag) {
            return Err(HkxError::structural(format!(
                "unexpected chunk {} in {parent}",
                tag_str(&chunk.tag)
            )));
        }
        Ok(chunk)
    }

    pub fn expect(&mut self, tag: [u8; 4]) -> Result<Chunk<'a>> {
        self.expect_any(&[tag])
    }

    /// Next child if it carries `tag`.
    pub fn optional(&mut self, tag: [u8; 4]) -> Option<Chunk<'a>> {
        match self.next_chunk() {
            Some(chunk) if chunk.tag == tag => Some(chunk),
            other => {
                self.peeked = other;
                None
            }
        }
    }

    /// No children may remain.
    pub fn finish(mut self) -> Result<()> {
        match self.next_chunk() {
            None => Ok(()),
            Some(chunk) => Err(HkxError::structural(format!(
                "unexpected chunk {} in {}",
                tag_str(&chunk.tag),
                tag_str(&self.parent)
            ))),
        }
    }
}

/// Open a chunk; returns the header position for [`end_chunk`].
pub(crate) fn begin_chunk(w: &mut ByteWriter, tag: [u8; 4]) -> usize {
    let start = w.len();
    w.write_u32_be(0);
    w.write_bytes(&tag);
    start
}

/// Pad the payload and backpatch the size word.
pub(crate) fn end_chunk(w: &mut ByteWriter, start: usize, leaf: bool) -> Result<()> {
    let len = w.len() - start;
    let padded = len.div_ceil(PAYLOAD_ALIGN) * PAYLOAD_ALIGN;
    w.pad_to(start + padded, 0);
    let size = u32::try_from(padded)
        .ok()
        .filter(|s| *s <= CHUNK_SIZE_MASK)
        .ok_or_else(|| HkxError::invalid_value("chunk", format!("{padded} bytes exceed the size field")))?;
    w.put_u32_be(start, size | if leaf { CHUNK_LEAF_FLAG } else { 0 });
    Ok(())
}

/// Write a complete leaf chunk.
pub(crate) fn write_leaf(w: &mut ByteWriter, tag: [u8; 4], payload: &[u8]) -> Result<()> {
    let start = begin_chunk(w, tag);
    w.write_bytes(payload);
    end_chunk(w, start, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tags;

    #[test]
    fn test_leaf_is_padded_and_flagged() {
        let mut w = ByteWriter::new(true);
        write_leaf(&mut w, tags::SDKV, b"2016").expect("leaf");
        write_leaf(&mut w, tags::TSTR, b"abcde").expect("leaf");
        let bytes = w.into_inner();
        assert_eq!(&bytes[..8], &[0x40, 0, 0, 12, b'S', b'D', b'K', b'V']);
        assert_eq!(&bytes[12..16], &[0x40, 0, 0, 16]);
        assert_eq!(&bytes[20..28], &[b'a', b'b', b'c', b'd', b'e', 0, 0, 0]);

        let mut r = ByteReader::new(&bytes, true);
        let first = Chunk::expect(&mut r, tags::SDKV).expect("sdkv");
        assert!(first.leaf);
        assert_eq!(first.payload, b"2016");
        let second = Chunk::read(&mut r).expect("tstr");
        assert_eq!(second.payload.len(), 8);
        assert!(r.is_eof());
    }

    #[test]
    fn test_container_children() {
        let mut w = ByteWriter::new(true);
        let start = begin_chunk(&mut w, tags::INDX);
        write_leaf(&mut w, tags::ITEM, &[0; 12]).expect("item");
        write_leaf(&mut w, tags::PTCH, &[]).expect("ptch");
        end_chunk(&mut w, start, false).expect("indx");
        let bytes = w.into_inner();
        assert_eq!(bytes[0] & 0xC0, 0);

        let mut r = ByteReader::new(&bytes, true);
        let indx = Chunk::read(&mut r).expect("indx");
        let mut children = Children::of(&indx).expect("children");
        assert_eq!(children.expect(tags::ITEM).expect("item").payload.len(), 12);
        assert!(children.optional(tags::TPAD).is_none());
        assert!(children.expect(tags::PTCH).expect("ptch").payload.is_empty());
        children.finish().expect("no more children");
    }

    #[test]
    fn test_bad_frames_are_structural() {
        // reserved flag bits
        let mut r = ByteReader::new(&[0x80, 0, 0, 8, b'D', b'A', b'T', b'A'], true);
        assert!(matches!(Chunk::read(&mut r), Err(HkxError::Structural(_))));
        // size smaller than the header
        let mut r = ByteReader::new(&[0x40, 0, 0, 4, b'D', b'A', b'T', b'A'], true);
        assert!(matches!(Chunk::read(&mut r), Err(HkxError::Structural(_))));
        // wrong tag
        let mut w = ByteWriter::new(true);
        write_leaf(&mut w, tags::DATA, &[]).expect("leaf");
        let mut r = ByteReader::new(w.as_slice(), true);
        assert!(matches!(
            Chunk::expect(&mut r, tags::TYPE),
            Err(HkxError::Structural(_))
        ));
        // size past the end
        let mut r = ByteReader::new(&[0x40, 0, 0, 64, b'D', b'A', b'T', b'A'], true);
        assert!(matches!(Chunk::read(&mut r), Err(HkxError::UnexpectedEof { .. })));
    }
}

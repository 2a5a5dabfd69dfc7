// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte cursors with run-time endianness.
//!
//! Packfiles carry their byte order in the header, so the order is a field
//! of the cursor rather than a type parameter. Tagfile chunk headers are
//! always big-endian and use the explicit `_be` readers.

use crate::error::{HkxError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Generate sequential and positional read methods for one primitive.
macro_rules! impl_read {
    ($read:ident, $at:ident, $type:ty, $size:expr, $order_fn:ident) => {
        pub fn $read(&mut self) -> Result<$type> {
            let value = self.$at(self.offset)?;
            self.offset += $size;
            Ok(value)
        }

        pub fn $at(&self, pos: usize) -> Result<$type> {
            let bytes = self.bytes_at(pos, $size)?;
            Ok(if self.little_endian {
                LittleEndian::$order_fn(bytes)
            } else {
                BigEndian::$order_fn(bytes)
            })
        }
    };
}

/// Generate appending and positional write methods for one primitive.
macro_rules! impl_write {
    ($write:ident, $put:ident, $type:ty, $size:expr, $order_fn:ident) => {
        pub fn $write(&mut self, value: $type) {
            let pos = self.buffer.len();
            self.$put(pos, value);
        }

        pub fn $put(&mut self, pos: usize, value: $type) {
            self.ensure_len(pos + $size);
            let dst = &mut self.buffer[pos..pos + $size];
            if self.little_endian {
                LittleEndian::$order_fn(dst, value);
            } else {
                BigEndian::$order_fn(dst, value);
            }
        }
    };
}

/// Bounds-checked reader over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    offset: usize,
    little_endian: bool,
}

impl<'a> ByteReader<'a> {
    pub fn new(buffer: &'a [u8], little_endian: bool) -> Self {
        Self {
            buffer,
            offset: 0,
            little_endian,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    pub fn little_endian(&self) -> bool {
        self.little_endian
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.buffer
    }

    /// Move to an absolute offset (the end of the buffer is allowed).
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buffer.len() {
            return Err(self.eof(pos, 0));
        }
        self.offset = pos;
        Ok(())
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.seek(self.offset.saturating_add(len))
    }

    fn eof(&self, pos: usize, need: usize) -> HkxError {
        HkxError::UnexpectedEof {
            offset: pos,
            need,
            have: self.buffer.len().saturating_sub(pos),
        }
    }

    pub fn bytes_at(&self, pos: usize, len: usize) -> Result<&'a [u8]> {
        match pos.checked_add(len) {
            Some(end) if end <= self.buffer.len() => Ok(&self.buffer[pos..end]),
            _ => Err(self.eof(pos, len)),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.bytes_at(self.offset, len)?;
        self.offset += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.u8_at(self.offset)?;
        self.offset += 1;
        Ok(value)
    }

    pub fn u8_at(&self, pos: usize) -> Result<u8> {
        Ok(self.bytes_at(pos, 1)?[0])
    }

    impl_read!(read_u16, u16_at, u16, 2, read_u16);
    impl_read!(read_i16, i16_at, i16, 2, read_i16);
    impl_read!(read_u32, u32_at, u32, 4, read_u32);
    impl_read!(read_i32, i32_at, i32, 4, read_i32);
    impl_read!(read_u64, u64_at, u64, 8, read_u64);
    impl_read!(read_f32, f32_at, f32, 4, read_f32);

    /// Big-endian `u32` regardless of the cursor's byte order.
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(BigEndian::read_u32(bytes))
    }

    /// Unsigned integer of 1, 2, 4 or 8 bytes.
    pub fn uint_at(&self, pos: usize, width: usize) -> Result<u64> {
        let bytes = self.bytes_at(pos, width)?;
        Ok(if self.little_endian {
            LittleEndian::read_uint(bytes, width)
        } else {
            BigEndian::read_uint(bytes, width)
        })
    }

    /// Sign-extended integer of 1, 2, 4 or 8 bytes.
    pub fn int_at(&self, pos: usize, width: usize) -> Result<i64> {
        let bytes = self.bytes_at(pos, width)?;
        Ok(if self.little_endian {
            LittleEndian::read_int(bytes, width)
        } else {
            BigEndian::read_int(bytes, width)
        })
    }

    /// Fill `dst` with consecutive floats starting at `pos`.
    pub fn f32s_at(&self, pos: usize, dst: &mut [f32]) -> Result<()> {
        let bytes = self.bytes_at(pos, dst.len() * 4)?;
        if self.little_endian {
            LittleEndian::read_f32_into(bytes, dst);
        } else {
            BigEndian::read_f32_into(bytes, dst);
        }
        Ok(())
    }

    /// NUL-terminated UTF-8 string at `pos` (terminator excluded).
    pub fn cstr_at(&self, pos: usize) -> Result<&'a str> {
        let tail = self
            .buffer
            .get(pos..)
            .ok_or_else(|| self.eof(pos, 1))?;
        let end = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| HkxError::Decode(format!("unterminated string at offset {pos}")))?;
        std::str::from_utf8(&tail[..end])
            .map_err(|e| HkxError::Decode(format!("invalid UTF-8 at offset {pos}: {e}")))
    }

    /// Read a NUL-terminated string and step past the terminator.
    pub fn read_cstr(&mut self) -> Result<&'a str> {
        let s = self.cstr_at(self.offset)?;
        self.offset += s.len() + 1;
        Ok(s)
    }
}

/// Growable writer; positional writes extend the buffer with zeros.
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buffer: Vec<u8>,
    little_endian: bool,
}

impl ByteWriter {
    pub fn new(little_endian: bool) -> Self {
        Self {
            buffer: Vec::new(),
            little_endian,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn little_endian(&self) -> bool {
        self.little_endian
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    fn ensure_len(&mut self, len: usize) {
        if self.buffer.len() < len {
            self.buffer.resize(len, 0);
        }
    }

    /// Grow to `len` bytes with `fill` (never shrinks).
    pub fn pad_to(&mut self, len: usize, fill: u8) {
        if self.buffer.len() < len {
            self.buffer.resize(len, fill);
        }
    }

    /// Pad to a multiple of `alignment` with `fill`; returns the new length.
    pub fn align(&mut self, alignment: usize, fill: u8) -> usize {
        if alignment > 1 {
            let len = self.buffer.len().div_ceil(alignment) * alignment;
            self.pad_to(len, fill);
        }
        self.buffer.len()
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn put_bytes(&mut self, pos: usize, data: &[u8]) {
        self.ensure_len(pos + data.len());
        self.buffer[pos..pos + data.len()].copy_from_slice(data);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    impl_write!(write_u16, put_u16, u16, 2, write_u16);
    impl_write!(write_i16, put_i16, i16, 2, write_i16);
    impl_write!(write_u32, put_u32, u32, 4, write_u32);
    impl_write!(write_i32, put_i32, i32, 4, write_i32);
    impl_write!(write_u64, put_u64, u64, 8, write_u64);
    impl_write!(write_f32, put_f32, f32, 4, write_f32);

    /// Big-endian `u32` regardless of the writer's byte order.
    pub fn write_u32_be(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.write_bytes(&bytes);
    }

    pub fn put_u32_be(&mut self, pos: usize, value: u32) {
        let mut bytes = [0u8; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.put_bytes(pos, &bytes);
    }

    /// Low `width` bytes of `value`.
    pub fn put_uint(&mut self, pos: usize, value: u64, width: usize) {
        let value = if width >= 8 {
            value
        } else {
            value & ((1u64 << (width * 8)) - 1)
        };
        self.ensure_len(pos + width);
        let dst = &mut self.buffer[pos..pos + width];
        if self.little_endian {
            LittleEndian::write_uint(dst, value, width);
        } else {
            BigEndian::write_uint(dst, value, width);
        }
    }

    /// Consecutive floats starting at `pos`.
    pub fn put_f32s(&mut self, pos: usize, src: &[f32]) {
        self.ensure_len(pos + src.len() * 4);
        let dst = &mut self.buffer[pos..pos + src.len() * 4];
        if self.little_endian {
            LittleEndian::write_f32_into(src, dst);
        } else {
            BigEndian::write_f32_into(src, dst);
        }
    }

    /// String bytes plus a NUL terminator.
    pub fn write_cstr(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
        self.write_u8(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_U32: u32 = 0x1234_5678;

    #[test]
    fn test_reader_eof_reports_offset() {
        let buffer = [0u8; 3];
        let mut reader = ByteReader::new(&buffer, true);
        assert_eq!(reader.read_u16().expect("u16"), 0);

        match reader.read_u32() {
            Err(HkxError::UnexpectedEof { offset, need, have }) => {
                assert_eq!(offset, 2);
                assert_eq!(need, 4);
                assert_eq!(have, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_endianness_is_runtime() {
        let mut le = ByteWriter::new(true);
        le.write_u32(TEST_U32);
        assert_eq!(le.as_slice(), [0x78, 0x56, 0x34, 0x12]);

        let mut be = ByteWriter::new(false);
        be.write_u32(TEST_U32);
        assert_eq!(be.as_slice(), [0x12, 0x34, 0x56, 0x78]);

        let reader = ByteReader::new(be.as_slice(), false);
        assert_eq!(reader.u32_at(0).expect("u32"), TEST_U32);
    }

    #[test]
    fn test_positional_put_grows_with_zeros() {
        let mut writer = ByteWriter::new(true);
        writer.put_u16(6, 0xBEEF);
        assert_eq!(writer.as_slice(), [0, 0, 0, 0, 0, 0, 0xEF, 0xBE]);
        assert_eq!(writer.align(16, 0xFF), 16);
        assert_eq!(writer.as_slice()[8..], [0xFF; 8]);
    }

    #[test]
    fn test_signed_widths() {
        let mut writer = ByteWriter::new(true);
        writer.put_uint(0, (-2i64) as u64, 2);
        let reader = ByteReader::new(writer.as_slice(), true);
        assert_eq!(reader.int_at(0, 2).expect("i16"), -2);
        assert_eq!(reader.uint_at(0, 2).expect("u16"), 0xFFFE);
    }

    #[test]
    fn test_cstr() {
        let data = b"hkaBone\0hkReal\0";
        let mut reader = ByteReader::new(data, true);
        assert_eq!(reader.read_cstr().expect("first"), "hkaBone");
        assert_eq!(reader.read_cstr().expect("second"), "hkReal");
        assert!(reader.is_eof());
        assert!(matches!(
            ByteReader::new(b"abc", true).cstr_at(0),
            Err(HkxError::Decode(_))
        ));
    }

    #[test]
    fn test_float_runs() {
        let mut writer = ByteWriter::new(false);
        writer.put_f32s(4, &[1.0, -2.5]);
        let reader = ByteReader::new(writer.as_slice(), false);
        let mut out = [0f32; 2];
        reader.f32s_at(4, &mut out).expect("floats");
        assert_eq!(out, [1.0, -2.5]);
    }
}

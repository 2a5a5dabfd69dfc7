// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagfile variable-length integers.
//!
//! The leading bits of the first byte select the total width; the payload
//! that follows is big-endian.
//!
//! ```text
//! 0xxxxxxx                        1 byte   7 bits
//! 10xxxxxx                        2 bytes  14 bits
//! 11000011 + u16                  3 bytes  16 bits (only ever the literal 1)
//! 110xxxxx                        3 bytes  21 bits
//! 11100xxx                        4 bytes  27 bits
//! 11101xxx                        invalid
//! 11110xxx                        5 bytes  35 bits
//! 11111xxx                        8 bytes  59 bits
//! ```
//!
//! # Examples
//!
//! ```
//! use hkx::cursor::{ByteReader, ByteWriter};
//! use hkx::varint;
//!
//! let mut w = ByteWriter::new(true);
//! varint::write(&mut w, 300).unwrap();
//! assert_eq!(w.as_slice(), [0x81, 0x2C]);
//!
//! let mut r = ByteReader::new(w.as_slice(), true);
//! assert_eq!(varint::read(&mut r).unwrap(), 300);
//! ```

use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{HkxError, Result};

/// Largest encodable value.
pub const MAX_VALUE: u64 = (1 << 59) - 1;

/// Prefix of the 3-byte form carrying a 16-bit payload.
const SPECIAL_PREFIX: u8 = 0xC3;

/// Decode one varint at the cursor.
pub fn read(r: &mut ByteReader<'_>) -> Result<u64> {
    let at = r.offset();
    let first = r.read_u8()?;
    let (extra, head) = match first {
        0x00..=0x7F => return Ok(u64::from(first)),
        0x80..=0xBF => (1, first & 0x3F),
        SPECIAL_PREFIX => (2, 0),
        0xC0..=0xDF => (2, first & 0x1F),
        0xE0..=0xE7 => (3, first & 0x07),
        0xF0..=0xF7 => (4, first & 0x07),
        0xF8..=0xFF => (7, first & 0x07),
        _ => {
            return Err(HkxError::Decode(format!(
                "invalid varint prefix {first:#04x} at offset {at}"
            )))
        }
    };
    let mut value = u64::from(head);
    for byte in r.read_bytes(extra)? {
        value = (value << 8) | u64::from(*byte);
    }
    Ok(value)
}

/// Decode a varint that must fit a `u32` (indices, counts, offsets).
pub(crate) fn read_u32(r: &mut ByteReader<'_>) -> Result<u32> {
    let at = r.offset();
    let value = read(r)?;
    u32::try_from(value)
        .map_err(|_| HkxError::Decode(format!("varint {value} at offset {at} exceeds u32")))
}

/// Encode `value` in its canonical (shortest) form.
pub fn write(w: &mut ByteWriter, value: u64) -> Result<()> {
    match value {
        0..=0x7F => w.write_u8(value as u8),
        0x80..=0x3FFF => {
            w.write_u8(0x80 | (value >> 8) as u8);
            w.write_u8(value as u8);
        }
        // 0x03xxxx would collide with the special prefix
        0x4000..=0x1F_FFFF if value >> 16 != 0x03 => {
            w.write_u8(0xC0 | (value >> 16) as u8);
            write_be(w, value, 2);
        }
        0x4000..=0x7FF_FFFF => {
            w.write_u8(0xE0 | (value >> 24) as u8);
            write_be(w, value, 3);
        }
        0x800_0000..=0x7_FFFF_FFFF => {
            w.write_u8(0xF0 | (value >> 32) as u8);
            write_be(w, value, 4);
        }
        0x8_0000_0000..=MAX_VALUE => {
            w.write_u8(0xF8 | (value >> 56) as u8);
            write_be(w, value, 7);
        }
        _ => {
            return Err(HkxError::invalid_value(
                "varint",
                format!("{value} exceeds {MAX_VALUE}"),
            ))
        }
    }
    Ok(())
}

/// Emit the literal 1 in the 16-bit special form (`C3 00 01`).
pub fn write_special_one(w: &mut ByteWriter) {
    w.write_bytes(&[SPECIAL_PREFIX, 0x00, 0x01]);
}

/// Low `len` bytes of `value`, most significant first.
fn write_be(w: &mut ByteWriter, value: u64, len: usize) {
    for shift in (0..len).rev() {
        w.write_u8((value >> (shift * 8)) as u8);
    }
}

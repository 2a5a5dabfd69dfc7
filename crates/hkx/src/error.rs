// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy shared by both container formats.
//!
//! Nothing in the codec recovers silently: a malformed input or an
//! unencodable graph always surfaces as one of these variants.

use thiserror::Error;

/// Errors produced while packing or unpacking HKX data.
#[derive(Debug, Error)]
pub enum HkxError {
    /// Malformed container: bad magic, bad chunk/section tag, bad sentinel,
    /// or a fixup that points outside any item.
    #[error("structural error: {0}")]
    Structural(String),

    /// A referenced type has no compiled descriptor.
    #[error("unknown type `{name}`{}", metadata.as_deref().map(|m| format!(" (file metadata: {m})")).unwrap_or_default())]
    UnknownType {
        /// Name (or synthesized key) of the missing type.
        name: String,
        /// Closest raw metadata recovered from the file, if any.
        metadata: Option<String>,
    },

    /// Compiled descriptor disagrees with file metadata.
    #[error("type `{type_name}` mismatch on {field}: compiled {expected}, file {found}")]
    TypeMismatch {
        /// Type being validated.
        type_name: String,
        /// Which field disagreed.
        field: String,
        /// Compiled value.
        expected: String,
        /// Value recovered from the file.
        found: String,
    },

    /// An item still holds fixups after its decode routine finished.
    #[error("item {item} has {} unconsumed fixup(s) at {offsets:?}", offsets.len())]
    DanglingFixup {
        /// Index of the offending item.
        item: usize,
        /// Item-relative (packfile) or DATA-relative (tagfile) source offsets.
        offsets: Vec<u32>,
    },

    /// A class must be listed in a packfile but has no known hash.
    #[error("no signature hash known for class `{type_name}`")]
    MissingHash {
        /// Class name lacking a hash.
        type_name: String,
    },

    /// A named variant's `className` could not be resolved.
    #[error("named variant class `{class_name}` is not a registered referenced-object type")]
    UnknownVariantType {
        /// The unresolved class name.
        class_name: String,
    },

    /// A scalar could not be decoded (bad varint prefix, bad UTF-8, ...).
    #[error("decode error: {0}")]
    Decode(String),

    /// Input ended before a read completed.
    #[error("unexpected end of data at offset {offset}: need {need} bytes, have {have}")]
    UnexpectedEof {
        /// Offset of the failed read.
        offset: usize,
        /// Bytes requested.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// An object-graph value does not fit its declared type.
    #[error("invalid value for `{path}`: {reason}")]
    InvalidValue {
        /// Type or member path of the value.
        path: String,
        /// What was wrong.
        reason: String,
    },
}

impl HkxError {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }

    pub(crate) fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType {
            name: name.into(),
            metadata: None,
        }
    }

    pub(crate) fn invalid_value(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HkxError>;

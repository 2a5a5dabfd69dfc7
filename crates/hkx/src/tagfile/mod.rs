// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagfile container: nested chunks, a type section, a global item table.
//!
//! # File Layout
//!
//! ```text
//! TAG0
//! +-- SDKV  8-character SDK version
//! +-- DATA  items, each aligned to its type
//! +-- TYPE  embedded type section       (or TCRF: u64 compendium id)
//! +-- INDX
//!     +-- ITEM  (flags:8 | type:24, offset, count) per item, item 0 null
//!     +-- PTCH  (type, count, offsets...) per declared reference type
//! ```
//!
//! Every object, array and string is its own item. Reference slots in
//! `DATA` hold the target's item index.

mod chunk;
mod compendium;
pub(crate) mod reader;
pub(crate) mod types;
pub mod varint;
pub(crate) mod writer;

#[cfg(test)]
mod tests;

pub use compendium::Compendium;
pub use types::{FileMember, FileTemplate, FileTemplateValue, FileType, TypeSection};

use crate::config::{TagfileOptions, SDK_VERSION_LEN};
use crate::error::{HkxError, Result};
use crate::object::ObjectGraph;
use crate::session::Session;
use crate::types::TypeRegistry;

/// A decoded tagfile.
#[derive(Debug)]
pub struct Tagfile {
    /// SDK version, chunk variant and compendium reference observed in the file.
    pub options: TagfileOptions,
    /// The file's own type section, or the referenced compendium's.
    pub types: TypeSection,
    pub graph: ObjectGraph,
}

impl Tagfile {
    /// Re-encode against the section the file was read with.
    pub fn encode(&self, registry: &TypeRegistry) -> Result<Vec<u8>> {
        writer::encode(
            &Session::new(registry),
            &self.graph,
            &self.options,
            writer::TypeSource::Section(&self.types),
        )
    }
}

/// `SDKV` payload of a version string.
pub(crate) fn sdk_bytes(version: &str) -> Result<[u8; SDK_VERSION_LEN]> {
    version
        .as_bytes()
        .try_into()
        .ok()
        .filter(|b: &[u8; SDK_VERSION_LEN]| b.iter().all(u8::is_ascii_graphic))
        .ok_or_else(|| {
            HkxError::invalid_value(
                "sdk_version",
                format!("{version:?} is not {SDK_VERSION_LEN} printable ASCII characters"),
            )
        })
}

pub(crate) fn sdk_from_bytes(payload: &[u8]) -> Result<String> {
    if payload.len() != SDK_VERSION_LEN || !payload.iter().all(u8::is_ascii_graphic) {
        return Err(HkxError::structural(format!(
            "SDKV payload {payload:02x?} is not an {SDK_VERSION_LEN}-character version"
        )));
    }
    Ok(String::from_utf8_lossy(payload).into_owned())
}

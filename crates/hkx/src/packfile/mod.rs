// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packfile container: fixed header, three sections, fixup tables.
//!
//! # File Layout
//!
//! ```text
//! +------------------+
//! | file header      |  64 bytes (80 for version 0x0B)
//! | section header x3|  48 bytes each (64 for version 0x0B)
//! +------------------+
//! | __classnames__   |  hash, 0x09, name records
//! | __types__        |  empty
//! | __data__         |  items | local | global | virtual fixups
//! +------------------+
//! ```
//!
//! Arrays and strings live inside the item that owns them and are linked
//! with local fixups; object pointers cross items through global fixups;
//! virtual fixups name each item's class and delimit the items.

mod classnames;
mod header;
pub(crate) mod reader;
pub(crate) mod writer;


use crate::config::PackfileOptions;
use crate::error::Result;
use crate::object::ObjectGraph;
use crate::session::Session;
use crate::types::TypeRegistry;

/// A decoded packfile.
#[derive(Debug)]
pub struct Packfile {
    /// Header values observed in the file; re-encoding with them reproduces it.
    pub options: PackfileOptions,
    pub graph: ObjectGraph,
}

impl Packfile {
    /// Re-encode with the options the file was read with.
    pub fn encode(&self, registry: &TypeRegistry) -> Result<Vec<u8>> {
        Session::new(registry).encode_packfile(&self.graph, &self.options)
    }
}

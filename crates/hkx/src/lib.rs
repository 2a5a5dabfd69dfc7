// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HKX - packfile and tagfile codec
//!
//! Reads and writes the two binary containers of a physics/animation
//! engine's serialized object graphs, byte for byte: the older fixed-section
//! *packfile* and the chunked, item-indexed *tagfile*.
//!
//! ## Quick Start
//!
//! ```rust
//! use hkx::types::{ClassBuilder, TypeRegistry};
//! use hkx::object::{Instance, ObjectArena, ObjectGraph};
//! use hkx::{PackfileOptions, TagfileDecodeOptions, TagfileOptions};
//!
//! # fn main() -> hkx::Result<()> {
//! let registry = TypeRegistry::with_base_types();
//! let base = registry.require("hkReferencedObject")?;
//! let bone = registry.register(
//!     ClassBuilder::new("hkaBone")
//!         .parent(&base)
//!         .member("name", registry.require("hkStringPtr")?)
//!         .hash(0x3550_9f8d)
//!         .build(),
//! );
//!
//! let mut arena = ObjectArena::new();
//! let root = arena.alloc(Instance::new(&bone).with("name", "pelvis")?);
//! let graph = ObjectGraph::new(arena, root);
//!
//! let bytes = hkx::encode_tagfile(&graph, &registry, &TagfileOptions::default())?;
//! let file = hkx::decode_tagfile(&bytes, &registry, &TagfileDecodeOptions::default())?;
//! assert!(file.graph.structurally_eq(&graph));
//!
//! let bytes = hkx::encode_packfile(&graph, &registry, &PackfileOptions::default())?;
//! assert!(hkx::decode_packfile(&bytes, &registry)?.graph.structurally_eq(&graph));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  ObjectGraph (arena of Instances, handles)                    |
//! +---------------------------------------------------------------+
//! |  dispatch: inline values | reference hooks (sink / source)    |
//! +-------------------------------+-------------------------------+
//! |  packfile                     |  tagfile                      |
//! |  sections, fixup tables,      |  chunks, varints, type        |
//! |  depth-first item order       |  section, queued item order   |
//! +-------------------------------+-------------------------------+
//! |  types: descriptors, wrappers, registry | layout: offsets     |
//! +---------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`types`] - type descriptors and the session-scoped registry
//! - [`object`] - the object graph
//! - [`packfile`] / [`tagfile`] - the two containers
//! - [`validate`] - file type metadata against compiled descriptors
//! - [`config`] - format constants and codec options

/// Format constants and codec options.
pub mod config;
/// Byte cursors over file buffers.
pub mod cursor;
pub(crate) mod dispatch;
/// Error taxonomy.
pub mod error;
/// Member offsets, sizes and alignment under a set of layout rules.
pub mod layout;
/// Object graph: arena, instances and values.
pub mod object;
/// Packfile container.
pub mod packfile;
/// Codec sessions (registry and trace context).
pub mod session;
/// Tagfile container.
pub mod tagfile;
/// Type descriptors, wrappers and the registry.
pub mod types;
/// Type-metadata validator.
pub mod validate;

pub use config::{
    PackfileOptions, PackfileVersion, TagfileDecodeOptions, TagfileOptions, TypeChunkVariant,
};
pub use error::{HkxError, Result};
pub use layout::LayoutRules;
pub use object::{Instance, ObjectArena, ObjectGraph, ObjectHandle, PrimitiveBlock, Value};
pub use packfile::Packfile;
pub use session::{Session, Trace};
pub use tagfile::{varint, Compendium, FileType, Tagfile, TypeSection};
pub use types::{ClassBuilder, TypeDescriptor, TypeRegistry};
pub use validate::{validate_type, validate_types, ValidationWarning};

/// Encode a graph as a packfile.
pub fn encode_packfile(
    graph: &ObjectGraph,
    registry: &TypeRegistry,
    options: &PackfileOptions,
) -> Result<Vec<u8>> {
    Session::new(registry).encode_packfile(graph, options)
}

/// Decode a packfile, returning the header options it was written with.
pub fn decode_packfile(bytes: &[u8], registry: &TypeRegistry) -> Result<Packfile> {
    Session::new(registry).decode_packfile(bytes)
}

/// Encode a graph as a tagfile with an embedded type section (or a `TCRF`
/// reference when encoding through [`Session::encode_tagfile_with_compendium`]).
pub fn encode_tagfile(
    graph: &ObjectGraph,
    registry: &TypeRegistry,
    options: &TagfileOptions,
) -> Result<Vec<u8>> {
    Session::new(registry).encode_tagfile(graph, options)
}

/// Decode a tagfile that embeds its own type section.
pub fn decode_tagfile(
    bytes: &[u8],
    registry: &TypeRegistry,
    options: &TagfileDecodeOptions,
) -> Result<Tagfile> {
    Session::new(registry).decode_tagfile(bytes, options)
}

pub fn encode_compendium(compendium: &Compendium) -> Result<Vec<u8>> {
    compendium.encode()
}

pub fn decode_compendium(bytes: &[u8]) -> Result<Compendium> {
    Compendium::decode(bytes)
}

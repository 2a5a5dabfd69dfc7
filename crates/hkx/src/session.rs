// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Codec sessions.
//!
//! A [`Session`] bundles everything one encode/decode call may consult: the
//! caller's [`TypeRegistry`] and an explicit [`Trace`] switch. Nothing is
//! stored in process-wide state, so a finished or failed call leaves nothing
//! behind for the next one.

use crate::config::{PackfileOptions, TagfileDecodeOptions, TagfileOptions};
use crate::error::Result;
use crate::object::ObjectGraph;
use crate::packfile::{self, Packfile};
use crate::tagfile::{self, Compendium, Tagfile};
use crate::types::TypeRegistry;
use std::fmt;

/// Verbose per-item tracing, routed to `log::trace!`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trace {
    enabled: bool,
}

impl Trace {
    pub const OFF: Self = Self { enabled: false };
    pub const ON: Self = Self { enabled: true };

    pub const fn is_enabled(self) -> bool {
        self.enabled
    }

    pub(crate) fn event(self, component: &str, args: fmt::Arguments<'_>) {
        if self.enabled {
            log::trace!("[{component}] {args}");
        }
    }
}

/// Registry and trace context for one or more codec calls.
#[derive(Debug, Clone, Copy)]
pub struct Session<'r> {
    registry: &'r TypeRegistry,
    trace: Trace,
}

impl<'r> Session<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            trace: Trace::OFF,
        }
    }

    #[must_use]
    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    pub fn trace(&self) -> Trace {
        self.trace
    }

    pub fn encode_packfile(&self, graph: &ObjectGraph, options: &PackfileOptions) -> Result<Vec<u8>> {
        packfile::writer::encode(self, graph, options)
    }

    pub fn decode_packfile(&self, bytes: &[u8]) -> Result<Packfile> {
        packfile::reader::decode(self, bytes)
    }

    pub fn encode_tagfile(&self, graph: &ObjectGraph, options: &TagfileOptions) -> Result<Vec<u8>> {
        tagfile::writer::encode(self, graph, options, tagfile::writer::TypeSource::Fresh)
    }

    /// Encode against a shared compendium; the file carries a `TCRF` id
    /// instead of its own type section.
    pub fn encode_tagfile_with_compendium(
        &self,
        graph: &ObjectGraph,
        options: &TagfileOptions,
        compendium: &Compendium,
    ) -> Result<Vec<u8>> {
        tagfile::writer::encode(
            self,
            graph,
            options,
            tagfile::writer::TypeSource::Compendium(compendium),
        )
    }

    pub fn decode_tagfile(&self, bytes: &[u8], options: &TagfileDecodeOptions) -> Result<Tagfile> {
        tagfile::reader::decode(self, bytes, options, None)
    }

    pub fn decode_tagfile_with_compendium(
        &self,
        bytes: &[u8],
        options: &TagfileDecodeOptions,
        compendium: &Compendium,
    ) -> Result<Tagfile> {
        tagfile::reader::decode(self, bytes, options, Some(compendium))
    }
}

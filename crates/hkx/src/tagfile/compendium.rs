// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type compendia (`TCM0`).
//!
//! A compendium carries one shared type section under one or more ids.
//! Object files reference it with a `TCRF` chunk instead of embedding
//! their own `TYPE` chunk.

use crate::config::{tags, TypeChunkVariant, DEFAULT_SDK_VERSION};
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{HkxError, Result};
use crate::layout::{LayoutCache, LayoutRules};
use crate::tagfile::chunk::{begin_chunk, end_chunk, tag_str, write_leaf, Children, Chunk};
use crate::tagfile::types::{SectionBuilder, TypeSection};
use crate::tagfile::{sdk_bytes, sdk_from_bytes};
use crate::types::TypeDescriptor;
use std::sync::Arc;

const ID_LEN: usize = 8;

/// A shared type section and the ids object files may reference it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compendium {
    pub sdk_version: String,
    pub ids: Vec<u64>,
    pub types: TypeSection,
}

impl Compendium {
    /// Build a compendium holding `types` and everything they depend on.
    pub fn from_types(ids: Vec<u64>, types: &[Arc<TypeDescriptor>]) -> Result<Self> {
        let mut layout = LayoutCache::new(LayoutRules::NATIVE);
        let mut builder = SectionBuilder::new(&mut layout);
        for ty in types {
            builder.add(ty)?;
        }
        let (types, _) = builder.finish(TypeChunkVariant::Classic);
        Ok(Self {
            sdk_version: DEFAULT_SDK_VERSION.to_string(),
            ids,
            types,
        })
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let sdk = sdk_bytes(&self.sdk_version)?;
        let mut ids = ByteWriter::new(true);
        for id in &self.ids {
            ids.write_u64(*id);
        }

        let mut w = ByteWriter::new(true);
        let root = begin_chunk(&mut w, tags::TCM0);
        write_leaf(&mut w, tags::SDKV, &sdk)?;
        write_leaf(&mut w, tags::TCID, ids.as_slice())?;
        self.types.write(&mut w)?;
        end_chunk(&mut w, root, false)?;
        log::debug!(
            "[tagfile] encoded compendium with {} ids, {} types",
            self.ids.len(),
            self.types.len()
        );
        Ok(w.into_inner())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes, true);
        let root = Chunk::read(&mut r)?;
        if root.tag != tags::TCM0 {
            return Err(HkxError::structural(format!(
                "expected a TCM0 compendium, found {}",
                tag_str(&root.tag)
            )));
        }
        if !r.is_eof() {
            return Err(HkxError::structural(format!(
                "{} trailing bytes after TCM0",
                r.remaining()
            )));
        }

        let mut children = Children::of(&root)?;
        let sdk_version = sdk_from_bytes(children.expect(tags::SDKV)?.payload)?;
        let tcid = children.expect(tags::TCID)?;
        if tcid.payload.len() % ID_LEN != 0 {
            return Err(HkxError::structural(format!(
                "TCID payload of {} bytes is not a list of ids",
                tcid.payload.len()
            )));
        }
        let mut ids_reader = tcid.reader();
        let mut ids = Vec::with_capacity(tcid.payload.len() / ID_LEN);
        while !ids_reader.is_eof() {
            ids.push(ids_reader.read_u64()?);
        }
        let types = TypeSection::parse(&children.expect(tags::TYPE)?)?;
        children.finish()?;

        log::debug!(
            "[tagfile] decoded compendium with {} ids, {} types",
            ids.len(),
            types.len()
        );
        Ok(Self {
            sdk_version,
            ids,
            types,
        })
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagfile encoder.
//!
//! Every object, array and string becomes its own item. References found
//! while writing an item are parked in four queues. Each pass drains every
//! queue to exhaustion in a fixed order, and passes repeat until all four
//! are empty:
//!
//! ```text
//! pointers -> arrays -> variant names -> strings
//! ```
//!
//! An item index is assigned when its job is popped, then written into the
//! referencing slot. Pointers to an object that already has an item reuse
//! its index. Back-references never create items; they are patched once the
//! queues are empty.

use crate::config::{tags, TagfileOptions, CHAR_TYPE, ITEM_FLAG_POINTER, ITEM_TYPE_MASK};
use crate::cursor::ByteWriter;
use crate::dispatch::{
    check_target, element_of, write_elements, write_record, StringRole, ValueSink,
};
use crate::error::{HkxError, Result};
use crate::layout::{LayoutCache, LayoutRules};
use crate::object::{ObjectArena, ObjectGraph, ObjectHandle, Value};
use crate::session::Session;
use crate::tagfile::chunk::{begin_chunk, end_chunk, write_leaf};
use crate::tagfile::compendium::Compendium;
use crate::tagfile::sdk_bytes;
use crate::tagfile::types::{SectionBuilder, TypeResolver, TypeSection};
use crate::types::{TypeDescriptor, TypeRegistry, WrapperKind};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// Where the encoder takes type indices from.
pub(crate) enum TypeSource<'a> {
    /// Build a section from the descriptors the graph uses.
    Fresh,
    /// Reuse an existing section (a decoded file's own).
    Section(&'a TypeSection),
    /// Reference a compendium by id instead of embedding types.
    Compendium(&'a Compendium),
}

struct Item {
    ty: Arc<TypeDescriptor>,
    pointer_target: bool,
    offset: u32,
    count: u32,
}

struct PointerJob {
    slot: usize,
    declared: Arc<TypeDescriptor>,
    handle: ObjectHandle,
}

struct ArrayJob<'g> {
    slot: usize,
    declared: Arc<TypeDescriptor>,
    value: &'g Value,
}

struct StringJob<'g> {
    slot: usize,
    declared: Arc<TypeDescriptor>,
    value: &'g str,
}

struct Encoder<'s, 'g> {
    session: &'s Session<'s>,
    arena: &'g ObjectArena,
    layout: LayoutCache,
    data: ByteWriter,
    /// Item 0 is the null item.
    items: Vec<Item>,
    index: HashMap<ObjectHandle, u32>,
    /// Declared slot type and DATA offset of every non-null reference.
    patches: Vec<(Arc<TypeDescriptor>, u32)>,
    pointers: VecDeque<PointerJob>,
    arrays: VecDeque<ArrayJob<'g>>,
    variant_names: VecDeque<StringJob<'g>>,
    strings: VecDeque<StringJob<'g>>,
    back_refs: Vec<PointerJob>,
    char_type: Arc<TypeDescriptor>,
}

impl<'g> ValueSink<'g> for Encoder<'_, 'g> {
    fn layout(&mut self) -> &mut LayoutCache {
        &mut self.layout
    }

    fn registry(&self) -> &TypeRegistry {
        self.session.registry()
    }

    fn arena(&self) -> &'g ObjectArena {
        self.arena
    }

    fn out(&mut self) -> &mut ByteWriter {
        &mut self.data
    }

    fn object_ref(
        &mut self,
        pos: usize,
        declared: &Arc<TypeDescriptor>,
        target: Option<ObjectHandle>,
    ) -> Result<()> {
        let Some(handle) = target else {
            return Ok(());
        };
        check_target(self.arena, declared, handle)?;
        let job = PointerJob {
            slot: pos,
            declared: declared.clone(),
            handle,
        };
        if matches!(declared.wrapper_kind(), Some(WrapperKind::BackReference)) {
            self.back_refs.push(job);
        } else {
            self.pointers.push_back(job);
        }
        Ok(())
    }

    fn array(&mut self, pos: usize, declared: &Arc<TypeDescriptor>, value: &'g Value) -> Result<()> {
        if value.len() > 0 {
            self.arrays.push_back(ArrayJob {
                slot: pos,
                declared: declared.clone(),
                value,
            });
        }
        Ok(())
    }

    fn string(
        &mut self,
        pos: usize,
        declared: &Arc<TypeDescriptor>,
        value: Option<&'g str>,
        role: StringRole,
    ) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        if value.contains('\0') {
            return Err(HkxError::invalid_value(
                declared.name.clone(),
                "string contains a NUL byte",
            ));
        }
        let job = StringJob {
            slot: pos,
            declared: declared.clone(),
            value,
        };
        match role {
            StringRole::VariantName => self.variant_names.push_back(job),
            StringRole::Plain => self.strings.push_back(job),
        }
        Ok(())
    }
}

impl<'g> Encoder<'_, 'g> {
    fn push_item(&mut self, ty: Arc<TypeDescriptor>, pointer_target: bool, offset: usize, count: usize) -> Result<u32> {
        let index = self.items.len() as u32;
        let offset = u32::try_from(offset)
            .map_err(|_| HkxError::invalid_value("DATA", "item offset exceeds u32"))?;
        let count = u32::try_from(count)
            .map_err(|_| HkxError::invalid_value(ty.name.clone(), "item count exceeds u32"))?;
        self.session.trace().event(
            "tagfile",
            format_args!("item {index} {} x{count} @ {offset}", ty.name),
        );
        self.items.push(Item {
            ty,
            pointer_target,
            offset,
            count,
        });
        Ok(index)
    }

    /// Create the item of an object and write its members.
    fn object_item(&mut self, handle: ObjectHandle) -> Result<u32> {
        let arena = self.arena;
        let inst = arena.require(handle)?;
        let class = inst.descriptor().clone();
        let align = self.layout.align_of(&class) as usize;
        let size = self.layout.size_of(&class) as usize;
        let offset = self.data.align(align, 0);
        self.data.pad_to(offset + size, 0);
        let index = self.push_item(class.clone(), true, offset, 1)?;
        self.index.insert(handle, index);
        write_record(self, offset, &class, inst)?;
        Ok(index)
    }

    fn patch(&mut self, slot: usize, declared: Arc<TypeDescriptor>, index: u32) {
        self.data.put_u32(slot, index);
        self.patches.push((declared, slot as u32));
    }

    fn pointer_job(&mut self, job: PointerJob) -> Result<()> {
        let index = match self.index.get(&job.handle) {
            Some(index) => *index,
            None => self.object_item(job.handle)?,
        };
        self.patch(job.slot, job.declared, index);
        Ok(())
    }

    fn array_job(&mut self, job: ArrayJob<'g>) -> Result<()> {
        let element = element_of(&job.declared)?;
        let align = self.layout.align_of(&element) as usize;
        let stride = self.layout.size_of(&element) as usize;
        let count = job.value.len();
        let offset = self.data.align(align, 0);
        self.data.pad_to(offset + count * stride, 0);
        let index = self.push_item(element.clone(), false, offset, count)?;
        write_elements(self, offset, &element, job.value)?;
        self.patch(job.slot, job.declared, index);
        Ok(())
    }

    fn string_job(&mut self, job: StringJob<'g>) -> Result<()> {
        let offset = self.data.len();
        self.data.write_cstr(job.value);
        let index = self.push_item(self.char_type.clone(), false, offset, job.value.len() + 1)?;
        self.patch(job.slot, job.declared, index);
        Ok(())
    }

    fn run(&mut self, root: ObjectHandle) -> Result<()> {
        self.items.push(Item {
            ty: self.char_type.clone(),
            pointer_target: false,
            offset: 0,
            count: 0,
        });
        self.object_item(root)?;
        // Each queue runs dry before the next one starts
        while !self.queues_empty() {
            while let Some(job) = self.pointers.pop_front() {
                self.pointer_job(job)?;
            }
            while let Some(job) = self.arrays.pop_front() {
                self.array_job(job)?;
            }
            while let Some(job) = self.variant_names.pop_front() {
                self.string_job(job)?;
            }
            while let Some(job) = self.strings.pop_front() {
                self.string_job(job)?;
            }
        }
        for job in std::mem::take(&mut self.back_refs) {
            let index = *self.index.get(&job.handle).ok_or_else(|| {
                HkxError::structural(format!(
                    "back-reference target {} was never written as an item",
                    job.handle
                ))
            })?;
            self.patch(job.slot, job.declared, index);
        }
        Ok(())
    }

    fn queues_empty(&self) -> bool {
        self.pointers.is_empty()
            && self.arrays.is_empty()
            && self.variant_names.is_empty()
            && self.strings.is_empty()
    }

    fn item_table(&self, names: &HashMap<String, u32>) -> Result<Vec<u8>> {
        let mut w = ByteWriter::new(true);
        w.write_bytes(&[0; 12]);
        for item in &self.items[1..] {
            let ty = type_index(names, &item.ty)?;
            if ty > ITEM_TYPE_MASK {
                return Err(HkxError::invalid_value(
                    item.ty.name.clone(),
                    format!("type index {ty} exceeds the item table width"),
                ));
            }
            let flags = if item.pointer_target {
                ITEM_FLAG_POINTER
            } else {
                0
            };
            w.write_u32((u32::from(flags) << 24) | ty);
            w.write_u32(item.offset);
            w.write_u32(item.count);
        }
        Ok(w.into_inner())
    }

    fn patch_table(&self, names: &HashMap<String, u32>) -> Result<Vec<u8>> {
        let mut groups: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for (declared, offset) in &self.patches {
            groups
                .entry(type_index(names, declared)?)
                .or_default()
                .push(*offset);
        }
        let mut w = ByteWriter::new(true);
        for (ty, mut offsets) in groups {
            offsets.sort_unstable();
            w.write_u32(ty);
            w.write_u32(offsets.len() as u32);
            for offset in offsets {
                w.write_u32(offset);
            }
        }
        Ok(w.into_inner())
    }
}

fn type_index(names: &HashMap<String, u32>, ty: &TypeDescriptor) -> Result<u32> {
    names
        .get(&ty.name)
        .copied()
        .ok_or_else(|| HkxError::unknown_type(ty.name.clone()))
}

/// Encode a graph as a tagfile.
pub(crate) fn encode(
    session: &Session<'_>,
    graph: &ObjectGraph,
    options: &TagfileOptions,
    source: TypeSource<'_>,
) -> Result<Vec<u8>> {
    let sdk = sdk_bytes(&options.sdk_version)?;
    let registry = session.registry();
    let mut encoder = Encoder {
        session,
        arena: &graph.arena,
        layout: LayoutCache::new(LayoutRules::NATIVE),
        data: ByteWriter::new(true),
        items: Vec::new(),
        index: HashMap::new(),
        patches: Vec::new(),
        pointers: VecDeque::new(),
        arrays: VecDeque::new(),
        variant_names: VecDeque::new(),
        strings: VecDeque::new(),
        back_refs: Vec::new(),
        char_type: registry.require(CHAR_TYPE)?,
    };
    encoder.run(graph.root)?;

    let (section, names, reference): (Cow<'_, TypeSection>, HashMap<String, u32>, Option<u64>) =
        match source {
            TypeSource::Fresh => {
                if options.compendium_id.is_some() {
                    return Err(HkxError::invalid_value(
                        "compendium_id",
                        "a compendium id needs a compendium to take types from",
                    ));
                }
                let used: Vec<Arc<TypeDescriptor>> = encoder.items[1..]
                    .iter()
                    .map(|i| i.ty.clone())
                    .chain(encoder.patches.iter().map(|(d, _)| d.clone()))
                    .collect();
                let mut builder = SectionBuilder::new(&mut encoder.layout);
                for ty in &used {
                    builder.add(ty)?;
                }
                let (section, names) = builder.finish(options.chunk_variant);
                (Cow::Owned(section), names, None)
            }
            TypeSource::Section(section) => {
                let names = TypeResolver::new(&section.types, registry).index_by_name();
                (Cow::Borrowed(section), names, options.compendium_id)
            }
            TypeSource::Compendium(compendium) => {
                let id = options
                    .compendium_id
                    .or_else(|| compendium.ids.first().copied())
                    .filter(|id| compendium.ids.contains(id))
                    .ok_or_else(|| {
                        HkxError::unknown_type(format!(
                            "compendium {:#018x}",
                            options.compendium_id.unwrap_or_default()
                        ))
                    })?;
                let names = TypeResolver::new(&compendium.types.types, registry).index_by_name();
                (Cow::Borrowed(&compendium.types), names, Some(id))
            }
        };

    let items = encoder.item_table(&names)?;
    let patches = encoder.patch_table(&names)?;

    let mut w = ByteWriter::new(true);
    let root = begin_chunk(&mut w, tags::TAG0);
    write_leaf(&mut w, tags::SDKV, &sdk)?;
    write_leaf(&mut w, tags::DATA, encoder.data.as_slice())?;
    match reference {
        Some(id) => write_leaf(&mut w, tags::TCRF, &id.to_le_bytes())?,
        None => section.write(&mut w)?,
    }
    let indx = begin_chunk(&mut w, tags::INDX);
    write_leaf(&mut w, tags::ITEM, &items)?;
    write_leaf(&mut w, tags::PTCH, &patches)?;
    end_chunk(&mut w, indx, false)?;
    end_chunk(&mut w, root, false)?;

    log::debug!(
        "[tagfile] encoded {} items, {} types, {} bytes",
        encoder.items.len() - 1,
        section.len(),
        w.len()
    );
    Ok(w.into_inner())
}

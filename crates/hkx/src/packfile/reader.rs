// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packfile decoder.
//!
//! Fixups are bucketed per item. Each reference read removes its entry, so
//! whatever is left once an item's routine returns is a fixup the decoder
//! never visited and is reported as [`HkxError::DanglingFixup`].

use crate::config::{
    PackfileOptions, FIXUP_TERMINATOR, SECTION_TAG_CLASSNAMES, SECTION_TAG_DATA,
    SECTION_TAG_TYPES,
};
use crate::cursor::ByteReader;
use crate::dispatch::{read_elements, read_record, ValueSource};
use crate::error::{HkxError, Result};
use crate::layout::LayoutCache;
use crate::object::{ObjectArena, ObjectGraph, ObjectHandle, Value};
use crate::packfile::classnames::{class_hash, ClassNames};
use crate::packfile::header::{FileHeader, SectionHeader};
use crate::packfile::Packfile;
use crate::session::Session;
use crate::types::{TypeDescriptor, TypeRegistry, WrapperKind};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Byte range and class of one item.
struct ItemSpec {
    start: u32,
    end: u32,
    class: Arc<TypeDescriptor>,
}

/// Read fixed-size records until the terminator or the end of the table.
fn read_table<const N: usize>(
    r: &ByteReader<'_>,
    start: u32,
    end: u32,
) -> Result<Vec<[u32; N]>> {
    let mut out = Vec::new();
    let mut pos = start as usize;
    while pos + 4 * N <= end as usize {
        let first = r.u32_at(pos)?;
        if first == FIXUP_TERMINATOR {
            break;
        }
        let mut record = [0u32; N];
        record[0] = first;
        for (i, word) in record.iter_mut().enumerate().skip(1) {
            *word = r.u32_at(pos + 4 * i)?;
        }
        out.push(record);
        pos += 4 * N;
    }
    Ok(out)
}

/// [`ValueSource`] over the item region of the data section.
struct ItemReader<'a, 'r> {
    layout: LayoutCache,
    registry: &'r TypeRegistry,
    data: ByteReader<'a>,
    items: Vec<ItemSpec>,
    /// Per item: absolute source -> absolute destination.
    locals: Vec<HashMap<u32, u32>>,
    /// Per item: absolute source -> target item.
    globals: Vec<HashMap<u32, usize>>,
    handles: Vec<Option<ObjectHandle>>,
    arena: ObjectArena,
    queue: VecDeque<usize>,
    current: usize,
}

impl ItemReader<'_, '_> {
    /// Item containing `offset`.
    fn item_at(&self, offset: u32) -> Option<usize> {
        let idx = self.items.partition_point(|i| i.start <= offset);
        let item = idx.checked_sub(1)?;
        (offset < self.items[item].end).then_some(item)
    }

    fn item_starting_at(&self, offset: u32) -> Option<usize> {
        self.items.binary_search_by_key(&offset, |i| i.start).ok()
    }

    /// Handle of an item's object, reserving it on first sight.
    fn handle_for(&mut self, item: usize) -> ObjectHandle {
        if let Some(handle) = self.handles[item] {
            return handle;
        }
        let handle = self.arena.reserve(&self.items[item].class);
        self.handles[item] = Some(handle);
        self.queue.push_back(item);
        handle
    }

    fn take_local(&mut self, pos: usize) -> Option<u32> {
        self.locals[self.current].remove(&(pos as u32))
    }

    fn decode_item(&mut self, item: usize) -> Result<()> {
        self.current = item;
        let span = &self.items[item];
        let (start, end, class) = (span.start, span.end, span.class.clone());
        let size = self.layout.size_of(&class);
        if size > end - start {
            return Err(HkxError::structural(format!(
                "item {item} ({}) is {} bytes, class needs {size}",
                class.name,
                end - start
            )));
        }
        let inst = read_record(self, start as usize, &class)?;
        let handle = self.handles[item]
            .ok_or_else(|| HkxError::structural(format!("item {item} decoded without a handle")))?;
        self.arena.fill(handle, inst)?;

        let mut left: Vec<u32> = self.locals[item]
            .keys()
            .chain(self.globals[item].keys())
            .map(|src| src - start)
            .collect();
        if !left.is_empty() {
            left.sort_unstable();
            return Err(HkxError::DanglingFixup {
                item,
                offsets: left,
            });
        }
        Ok(())
    }
}

impl ValueSource for ItemReader<'_, '_> {
    fn layout(&mut self) -> &mut LayoutCache {
        &mut self.layout
    }

    fn registry(&self) -> &TypeRegistry {
        self.registry
    }

    fn data(&self) -> &ByteReader<'_> {
        &self.data
    }

    fn object_ref(
        &mut self,
        pos: usize,
        _declared: &Arc<TypeDescriptor>,
        expected: &Arc<TypeDescriptor>,
    ) -> Result<Option<ObjectHandle>> {
        let Some(target) = self.globals[self.current].remove(&(pos as u32)) else {
            return Ok(None);
        };
        let class = &self.items[target].class;
        if !class.is_subclass_of(&expected.name) {
            return Err(HkxError::TypeMismatch {
                type_name: class.name.clone(),
                field: format!("pointer at {pos:#x}"),
                expected: expected.name.clone(),
                found: class.name.clone(),
            });
        }
        Ok(Some(self.handle_for(target)))
    }

    fn array(&mut self, pos: usize, declared: &Arc<TypeDescriptor>) -> Result<Value> {
        let element = declared
            .pointer_target()
            .cloned()
            .ok_or_else(|| HkxError::structural(format!("{} has no element type", declared.name)))?;

        if matches!(declared.wrapper_kind(), Some(WrapperKind::RelativeArray)) {
            let len = self.data.u16_at(pos)? as usize;
            if len == 0 {
                return Ok(Value::Array(Vec::new()));
            }
            let offset = self.data.i16_at(pos + 2)?;
            let at = pos
                .checked_add_signed(isize::from(offset))
                .ok_or_else(|| HkxError::structural(format!("relative array at {pos:#x} points before the data")))?;
            return read_elements(self, at, &element, len);
        }

        let ptr = self.layout.rules().pointer_size() as usize;
        let size = self.data.i32_at(pos + ptr)?;
        if size < 0 {
            return Err(HkxError::structural(format!(
                "array at {pos:#x} has negative size {size}"
            )));
        }
        if size == 0 {
            return Ok(Value::Array(Vec::new()));
        }
        let dst = self.take_local(pos).ok_or_else(|| {
            HkxError::structural(format!("array at {pos:#x} has {size} elements but no fixup"))
        })?;
        read_elements(self, dst as usize, &element, size as usize)
    }

    fn string(&mut self, pos: usize, _declared: &Arc<TypeDescriptor>) -> Result<Option<String>> {
        match self.take_local(pos) {
            Some(dst) => Ok(Some(self.data.cstr_at(dst as usize)?.to_string())),
            None => Ok(None),
        }
    }
}

/// Resolve a class-name entry to a compiled descriptor.
fn resolve_class(
    registry: &TypeRegistry,
    header: &FileHeader,
    classnames: &ClassNames,
    name_offset: u32,
) -> Result<Arc<TypeDescriptor>> {
    let entry = classnames.entry_at(name_offset).ok_or_else(|| {
        HkxError::structural(format!("no class name at offset {name_offset:#x}"))
    })?;
    let desc = registry.get(&entry.name).ok_or_else(|| HkxError::UnknownType {
        name: entry.name.clone(),
        metadata: Some(format!("class hash {:#010x}", entry.hash)),
    })?;
    if let Ok(compiled) = class_hash(header.version, &desc) {
        if compiled != entry.hash {
            log::warn!(
                "[packfile] class {} hash mismatch: compiled {compiled:#010x}, file {:#010x}",
                entry.name,
                entry.hash
            );
        }
    }
    Ok(desc)
}

/// Locate a section by tag.
fn section_index(sections: &[SectionHeader], tag: &str) -> Result<u32> {
    sections
        .iter()
        .position(|s| s.tag == tag)
        .map(|i| i as u32)
        .ok_or_else(|| HkxError::structural(format!("missing `{tag}` section")))
}

/// Decode a packfile into its options and object graph.
pub(crate) fn decode(session: &Session<'_>, bytes: &[u8]) -> Result<Packfile> {
    let (header, mut r) = FileHeader::read(bytes)?;
    let sections = (0..3)
        .map(|_| SectionHeader::read(&mut r, header.version))
        .collect::<Result<Vec<_>>>()?;
    let classnames_section = section_index(&sections, SECTION_TAG_CLASSNAMES)?;
    let data_section = section_index(&sections, SECTION_TAG_DATA)?;
    section_index(&sections, SECTION_TAG_TYPES)?;
    if header.class_name_section_index != classnames_section
        || header.contents_section_index != data_section
    {
        return Err(HkxError::structural(
            "header section indices disagree with section tags",
        ));
    }

    let le = header.layout.little_endian;
    let classnames_header = &sections[classnames_section as usize];
    let classnames_body = classnames_header.body(bytes)?;
    let classnames = ClassNames::read(
        &classnames_body[..classnames_header.local_fixups_offset as usize],
        le,
    )?;

    let data_header = &sections[data_section as usize];
    let body = data_header.body(bytes)?;
    let table = ByteReader::new(body, le);
    let item_end = data_header.local_fixups_offset;
    let locals = read_table::<2>(&table, item_end, data_header.global_fixups_offset)?;
    let globals = read_table::<3>(
        &table,
        data_header.global_fixups_offset,
        data_header.virtual_fixups_offset,
    )?;
    let virtuals = read_table::<3>(
        &table,
        data_header.virtual_fixups_offset,
        data_header.exports_offset,
    )?;

    let mut items: Vec<ItemSpec> = Vec::with_capacity(virtuals.len());
    for (i, [offset, section, name_offset]) in virtuals.iter().copied().enumerate() {
        if section != classnames_section {
            return Err(HkxError::structural(format!(
                "item {i} names its class in section {section}"
            )));
        }
        if offset >= item_end || items.last().is_some_and(|prev| prev.start >= offset) {
            return Err(HkxError::structural(format!(
                "item {i} offset {offset:#x} is out of order or past the item region"
            )));
        }
        let class = resolve_class(session.registry(), &header, &classnames, name_offset)?;
        if let Some(prev) = items.last_mut() {
            prev.end = offset;
        }
        items.push(ItemSpec {
            start: offset,
            end: item_end,
            class,
        });
    }

    let mut reader = ItemReader {
        layout: LayoutCache::new(header.layout),
        registry: session.registry(),
        data: ByteReader::new(&body[..item_end as usize], le),
        locals: vec![HashMap::new(); items.len()],
        globals: vec![HashMap::new(); items.len()],
        handles: vec![None; items.len()],
        items,
        arena: ObjectArena::new(),
        queue: VecDeque::new(),
        current: 0,
    };

    for [src, dst] in locals {
        let owner = reader.item_at(src);
        if owner.is_none() || owner != reader.item_at(dst) {
            return Err(HkxError::structural(format!(
                "local fixup {src:#x} -> {dst:#x} crosses or leaves items"
            )));
        }
        if let Some(item) = owner {
            reader.locals[item].insert(src, dst);
        }
    }
    for [src, section, dst] in globals {
        let owner = reader
            .item_at(src)
            .ok_or_else(|| HkxError::structural(format!("global fixup source {src:#x} is outside any item")))?;
        if section != data_section {
            return Err(HkxError::structural(format!(
                "global fixup {src:#x} targets section {section}"
            )));
        }
        let target = reader
            .item_starting_at(dst)
            .ok_or_else(|| HkxError::structural(format!("global fixup {src:#x} -> {dst:#x} does not start an item")))?;
        reader.globals[owner].insert(src, target);
    }

    let root_item = reader
        .item_starting_at(header.contents_section_offset)
        .ok_or_else(|| HkxError::structural("contents offset does not start an item"))?;
    let root = reader.handle_for(root_item);
    while let Some(item) = reader.queue.pop_front() {
        session.trace().event(
            "packfile",
            format_args!("decode item {item} {}", reader.items[item].class.name),
        );
        reader.decode_item(item)?;
    }
    if let Some(unreached) = reader.handles.iter().position(Option::is_none) {
        return Err(HkxError::structural(format!(
            "item {unreached} ({}) is not reachable from the root",
            reader.items[unreached].class.name
        )));
    }

    log::debug!(
        "[packfile] decoded {} items from {} bytes",
        reader.items.len(),
        bytes.len()
    );
    let options = PackfileOptions {
        version: header.version,
        layout: header.layout,
        contents_version: header.contents_version,
        user_tag: header.user_tag,
        flags: header.flags,
        classnames_section,
        data_section,
        extension: header.extension.unwrap_or_default(),
    };
    Ok(Packfile {
        options,
        graph: ObjectGraph::new(reader.arena, root),
    })
}

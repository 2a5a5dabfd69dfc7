// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagfile decoder.
//!
//! Items are decoded breadth-first from item 1. Every non-null reference
//! slot must have a `PTCH` entry naming its declared type; reading the slot
//! consumes the entry, and any entry left once the queue drains is reported
//! as [`HkxError::DanglingFixup`].

use crate::config::{
    tags, TagfileDecodeOptions, TagfileOptions, CHAR_TYPE, ITEM_FLAG_POINTER, ITEM_TYPE_MASK,
};
use crate::cursor::ByteReader;
use crate::dispatch::{element_of, read_elements, read_record, ValueSource};
use crate::error::{HkxError, Result};
use crate::layout::{LayoutCache, LayoutRules};
use crate::object::{ObjectArena, ObjectGraph, ObjectHandle, Value};
use crate::session::Session;
use crate::tagfile::chunk::{tag_str, Children, Chunk};
use crate::tagfile::compendium::Compendium;
use crate::tagfile::types::{TypeResolver, TypeSection};
use crate::tagfile::{sdk_from_bytes, Tagfile};
use crate::types::{TypeDescriptor, TypeRegistry};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const ITEM_RECORD_LEN: usize = 12;

/// One non-null `ITEM` entry.
struct ItemEntry {
    ty: Arc<TypeDescriptor>,
    pointer_target: bool,
    offset: u32,
    count: u32,
}

/// Raw `ITEM` record before its type is resolved.
struct RawItem {
    ty: u32,
    flags: u8,
    offset: u32,
    count: u32,
}

fn parse_items(chunk: &Chunk<'_>) -> Result<Vec<RawItem>> {
    if chunk.payload.len() % ITEM_RECORD_LEN != 0 || chunk.payload.is_empty() {
        return Err(HkxError::structural(format!(
            "ITEM payload of {} bytes is not a whole number of records",
            chunk.payload.len()
        )));
    }
    let mut r = chunk.reader();
    if r.read_bytes(ITEM_RECORD_LEN)?.iter().any(|b| *b != 0) {
        return Err(HkxError::structural("item 0 is not the null item"));
    }
    let mut out = Vec::with_capacity(chunk.payload.len() / ITEM_RECORD_LEN);
    while !r.is_eof() {
        let info = r.read_u32()?;
        let flags = (info >> 24) as u8;
        if flags & !ITEM_FLAG_POINTER != 0 {
            return Err(HkxError::structural(format!(
                "item {} has unknown flags {flags:#04x}",
                out.len() + 1
            )));
        }
        out.push(RawItem {
            ty: info & ITEM_TYPE_MASK,
            flags,
            offset: r.read_u32()?,
            count: r.read_u32()?,
        });
    }
    Ok(out)
}

/// `PTCH` entries keyed by DATA offset.
fn parse_patches(chunk: &Chunk<'_>) -> Result<HashMap<u32, u32>> {
    let mut r = chunk.reader();
    let mut out = HashMap::new();
    while !r.is_eof() {
        let ty = r.read_u32()?;
        let count = r.read_u32()? as usize;
        if count > r.remaining() / 4 {
            return Err(HkxError::structural(format!(
                "PTCH group for type {ty} claims {count} offsets"
            )));
        }
        for _ in 0..count {
            let offset = r.read_u32()?;
            if out.insert(offset, ty).is_some() {
                return Err(HkxError::structural(format!(
                    "DATA offset {offset:#x} is patched twice"
                )));
            }
        }
    }
    Ok(out)
}

/// [`ValueSource`] over the `DATA` chunk.
struct ItemReader<'a> {
    layout: LayoutCache,
    registry: &'a TypeRegistry,
    resolver: TypeResolver<'a>,
    data: ByteReader<'a>,
    /// Index 0 of the file table is not stored.
    items: Vec<ItemEntry>,
    patches: HashMap<u32, u32>,
    handles: Vec<Option<ObjectHandle>>,
    claimed: Vec<bool>,
    arena: ObjectArena,
    queue: VecDeque<u32>,
}

impl ItemReader<'_> {
    fn item(&self, index: u32) -> Result<&ItemEntry> {
        index
            .checked_sub(1)
            .and_then(|i| self.items.get(i as usize))
            .ok_or_else(|| {
                HkxError::structural(format!(
                    "item index {index} outside 1..={}",
                    self.items.len()
                ))
            })
    }

    /// Handle of an object item, reserving and queueing it on first sight.
    fn handle_for(&mut self, index: u32) -> Result<ObjectHandle> {
        let slot = index as usize - 1;
        if let Some(handle) = self.handles[slot] {
            return Ok(handle);
        }
        let ty = self.item(index)?.ty.clone();
        let handle = self.arena.reserve(&ty);
        self.handles[slot] = Some(handle);
        self.queue.push_back(index);
        Ok(handle)
    }

    /// Item index stored in a reference slot, consuming its patch entry.
    fn slot(&mut self, pos: usize, declared: &Arc<TypeDescriptor>) -> Result<Option<u32>> {
        let index = self.data.u32_at(pos)?;
        if index == 0 {
            return Ok(None);
        }
        let patched = self.patches.remove(&(pos as u32)).ok_or_else(|| {
            HkxError::structural(format!(
                "reference at {pos:#x} to item {index} has no patch entry"
            ))
        })?;
        let patched = self.resolver.resolve(patched)?;
        if patched.name != declared.name {
            return Err(HkxError::TypeMismatch {
                type_name: declared.name.clone(),
                field: format!("reference at {pos:#x}"),
                expected: declared.name.clone(),
                found: patched.name.clone(),
            });
        }
        self.item(index)?;
        Ok(Some(index))
    }

    /// Take exclusive ownership of an array or string item.
    fn claim(&mut self, index: u32, pos: usize) -> Result<&ItemEntry> {
        let slot = index as usize - 1;
        if self.claimed[slot] || self.handles[slot].is_some() || self.items[slot].pointer_target {
            return Err(HkxError::structural(format!(
                "item {index} referenced from {pos:#x} is already owned"
            )));
        }
        self.claimed[slot] = true;
        self.item(index)
    }

    fn decode_item(&mut self, index: u32) -> Result<()> {
        let entry = self.item(index)?;
        let (class, offset, count) = (entry.ty.clone(), entry.offset, entry.count);
        if count != 1 {
            return Err(HkxError::structural(format!(
                "object item {index} ({}) has count {count}",
                class.name
            )));
        }
        let inst = read_record(self, offset as usize, &class)?;
        let handle = self.handles[index as usize - 1]
            .ok_or_else(|| HkxError::structural(format!("item {index} decoded without a handle")))?;
        self.arena.fill(handle, inst)
    }

    /// Item whose byte range contains `offset`.
    fn owner_of(&mut self, offset: u32) -> Option<usize> {
        let mut owner = None;
        for (i, entry) in self.items.iter().enumerate() {
            let stride = self.layout.size_of(&entry.ty);
            let end = u64::from(entry.offset) + u64::from(stride) * u64::from(entry.count);
            if entry.offset <= offset && u64::from(offset) < end {
                owner = Some(i + 1);
                break;
            }
        }
        owner
    }

    fn check_dangling(&mut self) -> Result<()> {
        if self.patches.is_empty() {
            return Ok(());
        }
        let mut left: Vec<u32> = self.patches.keys().copied().collect();
        left.sort_unstable();
        let mut grouped: HashMap<usize, Vec<u32>> = HashMap::new();
        for offset in left {
            let item = self.owner_of(offset).ok_or_else(|| {
                HkxError::structural(format!("patch at {offset:#x} is outside every item"))
            })?;
            grouped.entry(item).or_default().push(offset);
        }
        let (item, offsets) = grouped
            .into_iter()
            .min_by_key(|(item, _)| *item)
            .unwrap_or_default();
        Err(HkxError::DanglingFixup { item, offsets })
    }
}

impl ValueSource for ItemReader<'_> {
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
        declared: &Arc<TypeDescriptor>,
        expected: &Arc<TypeDescriptor>,
    ) -> Result<Option<ObjectHandle>> {
        let Some(index) = self.slot(pos, declared)? else {
            return Ok(None);
        };
        let entry = self.item(index)?;
        if !entry.pointer_target {
            return Err(HkxError::structural(format!(
                "pointer at {pos:#x} targets item {index}, which is not an object item"
            )));
        }
        if !entry.ty.is_subclass_of(&expected.name) {
            return Err(HkxError::TypeMismatch {
                type_name: entry.ty.name.clone(),
                field: format!("pointer at {pos:#x}"),
                expected: expected.name.clone(),
                found: entry.ty.name.clone(),
            });
        }
        self.handle_for(index).map(Some)
    }

    fn array(&mut self, pos: usize, declared: &Arc<TypeDescriptor>) -> Result<Value> {
        let element = element_of(declared)?;
        let Some(index) = self.slot(pos, declared)? else {
            return Ok(Value::Array(Vec::new()));
        };
        let entry = self.claim(index, pos)?;
        if entry.ty.name != element.name {
            return Err(HkxError::TypeMismatch {
                type_name: declared.name.clone(),
                field: format!("array at {pos:#x}"),
                expected: element.name.clone(),
                found: entry.ty.name.clone(),
            });
        }
        let (offset, count) = (entry.offset as usize, entry.count as usize);
        read_elements(self, offset, &element, count)
    }

    fn string(&mut self, pos: usize, declared: &Arc<TypeDescriptor>) -> Result<Option<String>> {
        let Some(index) = self.slot(pos, declared)? else {
            return Ok(None);
        };
        let entry = self.claim(index, pos)?;
        if entry.ty.name != CHAR_TYPE {
            return Err(HkxError::TypeMismatch {
                type_name: declared.name.clone(),
                field: format!("string at {pos:#x}"),
                expected: CHAR_TYPE.to_string(),
                found: entry.ty.name.clone(),
            });
        }
        let (offset, count) = (entry.offset as usize, entry.count as usize);
        let s = self.data.cstr_at(offset)?;
        if s.len() + 1 != count {
            return Err(HkxError::structural(format!(
                "string item {index} holds {count} chars but its text is {} long",
                s.len()
            )));
        }
        Ok(Some(s.to_string()))
    }
}

/// Decode the object graph held in `DATA` against a resolved type section.
fn decode_graph(
    session: &Session<'_>,
    data: &[u8],
    types: &TypeSection,
    items: Vec<RawItem>,
    patches: HashMap<u32, u32>,
) -> Result<ObjectGraph> {
    let registry = session.registry();
    let mut resolver = TypeResolver::new(&types.types, registry);
    let mut entries = Vec::with_capacity(items.len());
    for raw in items {
        entries.push(ItemEntry {
            ty: resolver.resolve(raw.ty)?,
            pointer_target: raw.flags & ITEM_FLAG_POINTER != 0,
            offset: raw.offset,
            count: raw.count,
        });
    }
    match entries.first() {
        Some(root) if root.pointer_target => {}
        _ => return Err(HkxError::structural("item 1 is not an object item")),
    }

    let mut reader = ItemReader {
        layout: LayoutCache::new(LayoutRules::NATIVE),
        registry,
        resolver,
        data: ByteReader::new(data, true),
        handles: vec![None; entries.len()],
        claimed: vec![false; entries.len()],
        items: entries,
        patches,
        arena: ObjectArena::new(),
        queue: VecDeque::new(),
    };
    let root = reader.handle_for(1)?;
    while let Some(index) = reader.queue.pop_front() {
        session.trace().event(
            "tagfile",
            format_args!("decode item {index} {}", reader.items[index as usize - 1].ty.name),
        );
        reader.decode_item(index)?;
    }
    reader.check_dangling()?;

    let unreached = (0..reader.items.len())
        .find(|i| reader.handles[*i].is_none() && !reader.claimed[*i]);
    if let Some(i) = unreached {
        return Err(HkxError::structural(format!(
            "item {} ({}) is not reachable from the root",
            i + 1,
            reader.items[i].ty.name
        )));
    }
    Ok(ObjectGraph::new(reader.arena, root))
}

/// Decode a `TAG0` file.
pub(crate) fn decode(
    session: &Session<'_>,
    bytes: &[u8],
    options: &TagfileDecodeOptions,
    compendium: Option<&Compendium>,
) -> Result<Tagfile> {
    let mut r = ByteReader::new(bytes, true);
    let root = Chunk::read(&mut r)?;
    match root.tag {
        tags::TAG0 => {}
        tags::TCM0 => {
            return Err(HkxError::structural(
                "file is a type compendium, not an object file",
            ))
        }
        other => {
            return Err(HkxError::structural(format!(
                "unknown root chunk {}",
                tag_str(&other)
            )))
        }
    }
    if !r.is_eof() {
        return Err(HkxError::structural(format!(
            "{} trailing bytes after TAG0",
            r.remaining()
        )));
    }

    let mut children = Children::of(&root)?;
    let sdk_version = sdk_from_bytes(children.expect(tags::SDKV)?.payload)?;
    let data = children.expect(tags::DATA)?;
    let type_chunk = children.expect_any(&[tags::TYPE, tags::TCRF])?;
    let (types, compendium_id) = if type_chunk.tag == tags::TCRF {
        let id = type_chunk.reader().read_u64()?;
        let compendium = compendium
            .filter(|c| c.ids.contains(&id))
            .ok_or_else(|| HkxError::unknown_type(format!("compendium {id:#018x}")))?;
        (compendium.types.clone(), Some(id))
    } else {
        (TypeSection::parse(&type_chunk)?, None)
    };
    let indx = children.expect(tags::INDX)?;
    children.finish()?;

    let mut index = Children::of(&indx)?;
    let items = parse_items(&index.expect(tags::ITEM)?)?;
    let patches = parse_patches(&index.expect(tags::PTCH)?)?;
    index.finish()?;

    if options.validate {
        crate::validate::validate_types(&types.types, session.registry())?;
    }
    let item_count = items.len();
    let graph = decode_graph(session, data.payload, &types, items, patches)?;

    log::debug!(
        "[tagfile] decoded {item_count} items, {} types, {} bytes",
        types.len(),
        bytes.len()
    );
    Ok(Tagfile {
        options: TagfileOptions {
            sdk_version,
            chunk_variant: types.variant,
            compendium_id,
        },
        types,
        graph,
    })
}

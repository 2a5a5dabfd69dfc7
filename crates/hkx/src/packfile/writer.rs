// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packfile encoder.
//!
//! Items are produced by a fixed traversal:
//!
//! 1. write the object's members into a fresh item buffer, deferring
//!    arrays/strings as child jobs and pointees as object jobs;
//! 2. drain child jobs in discovery order, appending their bytes to the
//!    item; children found while writing a child are drained first;
//! 3. finalize the item;
//! 4. visit the object jobs, each becoming an item the same way.
//!
//! If A points at B and C, and B at D, items come out as A, B, D, C.

use crate::config::{
    PackfileOptions, ARRAY_DONT_DEALLOCATE, PACKFILE_BLOCK_ALIGN,
    PACKFILE_BLOCK_FILL, PACKFILE_DATA_FILL, SECTION_TAG_CLASSNAMES, SECTION_TAG_DATA,
    SECTION_TAG_TYPES,
};
use crate::cursor::ByteWriter;
use crate::dispatch::{
    check_target, element_of, write_elements, write_record, StringRole, ValueSink,
};
use crate::error::{HkxError, Result};
use crate::layout::LayoutCache;
use crate::object::{ObjectArena, ObjectGraph, ObjectHandle, Value};
use crate::packfile::classnames::ClassNames;
use crate::packfile::header::{FileHeader, SectionHeader};
use crate::session::Session;
use crate::types::{TypeDescriptor, TypeRegistry, WrapperKind};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Deferred out-of-line content of the current item.
enum ChildJob<'g> {
    Array {
        slot: usize,
        element: Arc<TypeDescriptor>,
        value: &'g Value,
        relative: bool,
    },
    String {
        slot: usize,
        value: &'g str,
    },
}

/// A finalized item.
struct PackedItem {
    class: Arc<TypeDescriptor>,
    bytes: Vec<u8>,
    /// Item-relative (source, destination) pairs.
    locals: Vec<(u32, u32)>,
    /// Item-relative source and target object.
    globals: Vec<(u32, ObjectHandle)>,
}

/// [`ValueSink`] for one item.
struct ItemWriter<'s, 'g> {
    layout: &'s mut LayoutCache,
    registry: &'s TypeRegistry,
    arena: &'g ObjectArena,
    out: ByteWriter,
    locals: Vec<(u32, u32)>,
    globals: Vec<(u32, ObjectHandle)>,
    children: VecDeque<ChildJob<'g>>,
    objects: VecDeque<ObjectHandle>,
}

impl<'g> ValueSink<'g> for ItemWriter<'_, 'g> {
    fn layout(&mut self) -> &mut LayoutCache {
        self.layout
    }

    fn registry(&self) -> &TypeRegistry {
        self.registry
    }

    fn arena(&self) -> &'g ObjectArena {
        self.arena
    }

    fn out(&mut self) -> &mut ByteWriter {
        &mut self.out
    }

    fn object_ref(
        &mut self,
        pos: usize,
        declared: &Arc<TypeDescriptor>,
        target: Option<ObjectHandle>,
    ) -> Result<()> {
        let ptr = self.layout.rules().pointer_size() as usize;
        self.out.pad_to(pos + ptr, PACKFILE_DATA_FILL);
        let Some(handle) = target else {
            return Ok(());
        };
        check_target(self.arena, declared, handle)?;
        self.globals.push((pos as u32, handle));
        if !matches!(declared.wrapper_kind(), Some(WrapperKind::BackReference)) {
            self.objects.push_back(handle);
        }
        Ok(())
    }

    fn array(&mut self, pos: usize, declared: &Arc<TypeDescriptor>, value: &'g Value) -> Result<()> {
        let element = element_of(declared)?;
        let len = value.len();
        let relative = matches!(declared.wrapper_kind(), Some(WrapperKind::RelativeArray));
        if relative {
            let len16 = u16::try_from(len).map_err(|_| {
                HkxError::invalid_value(declared.name.clone(), "relative array longer than u16")
            })?;
            self.out.put_u16(pos, len16);
            self.out.put_i16(pos + 2, 0);
        } else {
            let len32 = i32::try_from(len).map_err(|_| {
                HkxError::invalid_value(declared.name.clone(), "array longer than i32")
            })?;
            let ptr = self.layout.rules().pointer_size() as usize;
            self.out.pad_to(pos + ptr, PACKFILE_DATA_FILL);
            self.out.put_i32(pos + ptr, len32);
            self.out
                .put_u32(pos + ptr + 4, len32 as u32 | ARRAY_DONT_DEALLOCATE);
        }
        if len > 0 {
            self.children.push_back(ChildJob::Array {
                slot: pos,
                element,
                value,
                relative,
            });
        }
        Ok(())
    }

    fn string(
        &mut self,
        pos: usize,
        declared: &Arc<TypeDescriptor>,
        value: Option<&'g str>,
        _role: StringRole,
    ) -> Result<()> {
        let ptr = self.layout.rules().pointer_size() as usize;
        self.out.pad_to(pos + ptr, PACKFILE_DATA_FILL);
        if let Some(s) = value {
            if s.contains('\0') {
                return Err(HkxError::invalid_value(
                    declared.name.clone(),
                    "string contains a NUL byte",
                ));
            }
            self.children
                .push_back(ChildJob::String { slot: pos, value: s });
        }
        Ok(())
    }
}

impl<'g> ItemWriter<'_, 'g> {
    /// Drain child jobs depth-first in discovery order.
    fn drain(&mut self, jobs: VecDeque<ChildJob<'g>>) -> Result<()> {
        for job in jobs {
            self.write_child(job)?;
            let nested = std::mem::take(&mut self.children);
            self.drain(nested)?;
        }
        Ok(())
    }

    fn write_child(&mut self, job: ChildJob<'g>) -> Result<()> {
        match job {
            ChildJob::String { slot, value } => {
                let start = self.out.align(PACKFILE_BLOCK_ALIGN, PACKFILE_DATA_FILL);
                self.out.write_cstr(value);
                self.locals.push((slot as u32, start as u32));
            }
            ChildJob::Array {
                slot,
                element,
                value,
                relative: false,
            } => {
                let start = self.out.align(PACKFILE_BLOCK_ALIGN, PACKFILE_DATA_FILL);
                self.write_run(start, &element, value)?;
                self.locals.push((slot as u32, start as u32));
            }
            ChildJob::Array {
                slot,
                element,
                value,
                relative: true,
            } => {
                let align = self.layout.align_of(&element) as usize;
                let start = self.out.align(align, PACKFILE_DATA_FILL);
                self.write_run(start, &element, value)?;
                let offset = i16::try_from(start - slot).map_err(|_| {
                    HkxError::invalid_value(element.name.clone(), "relative array out of i16 reach")
                })?;
                self.out.put_i16(slot + 2, offset);
            }
        }
        Ok(())
    }

    fn write_run(&mut self, start: usize, element: &Arc<TypeDescriptor>, value: &'g Value) -> Result<()> {
        let stride = self.layout.size_of(element) as usize;
        self.out.pad_to(start + value.len() * stride, PACKFILE_DATA_FILL);
        write_elements(self, start, element, value)
    }
}

/// Pad a fixup table with fill bytes to the block alignment.
fn finish_table(w: &mut ByteWriter) {
    w.align(PACKFILE_BLOCK_ALIGN, PACKFILE_BLOCK_FILL);
}

struct Encoder<'s, 'g> {
    session: &'s Session<'s>,
    options: &'s PackfileOptions,
    arena: &'g ObjectArena,
    layout: LayoutCache,
    items: Vec<PackedItem>,
    index: HashMap<ObjectHandle, usize>,
}

impl<'g> Encoder<'_, 'g> {
    /// Steps 1-3 for one object; returns its object jobs.
    fn pack_item(&mut self, handle: ObjectHandle) -> Result<VecDeque<ObjectHandle>> {
        let inst = self.arena.require(handle)?;
        let class = inst.descriptor().clone();
        let size = self.layout.size_of(&class) as usize;

        let mut writer = ItemWriter {
            layout: &mut self.layout,
            registry: self.session.registry(),
            arena: self.arena,
            out: ByteWriter::new(self.options.layout.little_endian),
            locals: Vec::new(),
            globals: Vec::new(),
            children: VecDeque::new(),
            objects: VecDeque::new(),
        };
        writer.out.pad_to(size, PACKFILE_DATA_FILL);
        write_record(&mut writer, 0, &class, inst)?;
        let jobs = std::mem::take(&mut writer.children);
        writer.drain(jobs)?;
        writer.out.align(PACKFILE_BLOCK_ALIGN, PACKFILE_DATA_FILL);

        self.session.trace().event(
            "packfile",
            format_args!(
                "item {} {} <- {} ({} bytes)",
                self.items.len(),
                class.name,
                handle,
                writer.out.len()
            ),
        );
        let objects = writer.objects;
        self.items.push(PackedItem {
            class,
            bytes: writer.out.into_inner(),
            locals: writer.locals,
            globals: writer.globals,
        });
        Ok(objects)
    }

    /// Step 4, with an explicit stack standing in for recursion.
    fn pack_all(&mut self, root: ObjectHandle) -> Result<()> {
        let mut stack: Vec<VecDeque<ObjectHandle>> = vec![VecDeque::from([root])];
        while let Some(top) = stack.last_mut() {
            let Some(handle) = top.pop_front() else {
                stack.pop();
                continue;
            };
            if self.index.contains_key(&handle) {
                continue;
            }
            self.index.insert(handle, self.items.len());
            let jobs = self.pack_item(handle)?;
            stack.push(jobs);
        }
        Ok(())
    }

    /// Items, then local, global and virtual fixup tables.
    fn data_section(&self, classnames: &ClassNames) -> Result<(Vec<u8>, SectionHeader)> {
        let le = self.options.layout.little_endian;
        let mut w = ByteWriter::new(le);
        let mut offsets = Vec::with_capacity(self.items.len());
        for item in &self.items {
            offsets.push(w.len() as u32);
            w.write_bytes(&item.bytes);
        }
        w.align(PACKFILE_BLOCK_ALIGN, PACKFILE_DATA_FILL);

        let mut locals: Vec<(u32, u32)> = Vec::new();
        let mut globals: Vec<(u32, u32)> = Vec::new();
        for (item, base) in self.items.iter().zip(&offsets) {
            locals.extend(item.locals.iter().map(|(s, d)| (base + s, base + d)));
            for (src, target) in &item.globals {
                let target_item = self.index.get(target).ok_or_else(|| {
                    HkxError::structural(format!(
                        "back-reference target {target} was never written as an item"
                    ))
                })?;
                globals.push((base + src, offsets[*target_item]));
            }
        }
        locals.sort_by_key(|(src, _)| *src);
        globals.sort_by_key(|(src, _)| *src);

        let local_off = w.len() as u32;
        for (src, dst) in &locals {
            w.write_u32(*src);
            w.write_u32(*dst);
        }
        finish_table(&mut w);

        let global_off = w.len() as u32;
        for (src, dst) in &globals {
            w.write_u32(*src);
            w.write_u32(self.options.data_section);
            w.write_u32(*dst);
        }
        finish_table(&mut w);

        let virtual_off = w.len() as u32;
        for (item, base) in self.items.iter().zip(&offsets) {
            let name_offset = classnames.offset_of(&item.class.name).ok_or_else(|| {
                HkxError::structural(format!("class {} missing from class names", item.class.name))
            })?;
            w.write_u32(*base);
            w.write_u32(self.options.classnames_section);
            w.write_u32(name_offset);
        }
        finish_table(&mut w);
        let end = w.len() as u32;

        let header = SectionHeader {
            tag: SECTION_TAG_DATA.to_string(),
            absolute_data_start: 0,
            local_fixups_offset: local_off,
            global_fixups_offset: global_off,
            virtual_fixups_offset: virtual_off,
            exports_offset: end,
            imports_offset: end,
            end_offset: end,
        };
        Ok((w.into_inner(), header))
    }
}

/// Encode a graph as a packfile.
pub(crate) fn encode(session: &Session<'_>, graph: &ObjectGraph, options: &PackfileOptions) -> Result<Vec<u8>> {
    let types_section = options.types_section();
    if options.classnames_section == options.data_section
        || options.classnames_section >= 3
        || options.data_section >= 3
    {
        return Err(HkxError::invalid_value(
            "section indices",
            "class-name and data sections must be distinct indices below 3",
        ));
    }

    let mut encoder = Encoder {
        session,
        options,
        arena: &graph.arena,
        layout: LayoutCache::new(options.layout),
        items: Vec::new(),
        index: HashMap::new(),
    };
    encoder.pack_all(graph.root)?;

    let classnames = ClassNames::build(
        options.version,
        encoder.items.iter().map(|i| i.class.as_ref()),
    )?;
    let classnames_body = classnames.write(options.layout.little_endian);
    let (data_body, mut data_header) = encoder.data_section(&classnames)?;

    let root_class = encoder
        .items
        .first()
        .map(|i| i.class.name.clone())
        .ok_or_else(|| HkxError::structural("graph produced no items"))?;
    let root_name_offset = classnames
        .offset_of(&root_class)
        .ok_or_else(|| HkxError::structural("root class missing from class names"))?;

    let header = FileHeader {
        user_tag: options.user_tag,
        version: options.version,
        layout: options.layout,
        contents_section_index: options.data_section,
        contents_section_offset: 0,
        class_name_section_index: options.classnames_section,
        class_name_section_offset: root_name_offset,
        contents_version: options.contents_version.clone(),
        flags: options.flags,
        extension: options.version.has_extension().then_some(options.extension),
    };

    // Bodies follow the header block in section index order
    let mut start = (FileHeader::size(options.version)
        + 3 * SectionHeader::size(options.version)) as u32;
    let mut sections: Vec<(SectionHeader, Vec<u8>)> = Vec::with_capacity(3);
    for index in 0..3u32 {
        let (mut section, body) = if index == options.classnames_section {
            let len = classnames_body.len() as u32;
            (
                SectionHeader::plain(SECTION_TAG_CLASSNAMES, 0, len),
                classnames_body.clone(),
            )
        } else if index == options.data_section {
            (std::mem::take(&mut data_header), data_body.clone())
        } else {
            debug_assert_eq!(index, types_section);
            (SectionHeader::plain(SECTION_TAG_TYPES, 0, 0), Vec::new())
        };
        section.absolute_data_start = start;
        start += body.len() as u32;
        sections.push((section, body));
    }

    let mut w = ByteWriter::new(options.layout.little_endian);
    header.write(&mut w)?;
    for (section, _) in &sections {
        section.write(&mut w, options.version);
    }
    for (_, body) in &sections {
        w.write_bytes(body);
    }

    log::debug!(
        "[packfile] encoded {} items, {} classes, {} bytes",
        encoder.items.len(),
        classnames.entries().len(),
        w.len()
    );
    Ok(w.into_inner())
}

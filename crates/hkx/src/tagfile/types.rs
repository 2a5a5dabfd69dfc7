// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagfile type section.
//!
//! ```text
//! TYPE
//! +-- TPTR  8 zero bytes per type (null type included)
//! +-- TSTR  type and template names, NUL-terminated
//! +-- TNAM  count, then per type: name, templates
//! +-- FSTR  member names, NUL-terminated
//! +-- TBOD  per type: index, parent, flags, optional fields
//! +-- THSH  count, then (index, u32 hash)
//! +-- TPAD  optional, kept verbatim
//! ```
//!
//! Type indices are 1-based; index 0 is the null type. A decoded section is
//! kept whole so re-encoding a file reproduces its type chunks.

use crate::config::{tags, TypeChunkVariant, TPTR_ENTRY_LEN};
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{HkxError, Result};
use crate::layout::LayoutCache;
use crate::tagfile::chunk::{begin_chunk, end_chunk, write_leaf, Children, Chunk};
use crate::tagfile::varint;
use crate::types::{FormatFlags, TagDataKind, TemplateValue, TypeDescriptor, TypeRegistry};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Nesting limit when resolving template chains.
const MAX_RESOLVE_DEPTH: usize = 64;

/// Lowest subtype kind nibble (`Pointer`) whose bodies may name a pointer target.
const POINTER_CLASS_KIND: u32 = 6;

/// Template argument: a type index (`t` prefix) or an integer (`v` prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileTemplateValue {
    Type(u32),
    Int(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileTemplate {
    pub name: String,
    pub value: FileTemplateValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileMember {
    pub name: String,
    pub flags: u32,
    pub offset: u32,
    /// Type index.
    pub ty: u32,
}

/// One type as recorded in a file. Type references are section indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileType {
    pub name: String,
    pub templates: Vec<FileTemplate>,
    /// Parent type index, 0 when none.
    pub parent: u32,
    /// Which of the fields below were present in the body.
    pub format_flags: u32,
    pub subtype: u32,
    pub pointer: u32,
    pub version: u32,
    pub byte_size: u32,
    pub alignment: u32,
    pub abstract_value: u32,
    pub members: Vec<FileMember>,
    /// `(type index, value)` pairs.
    pub interfaces: Vec<(u32, u32)>,
    pub hash: Option<u32>,
}

impl FileType {
    pub fn flags(&self) -> FormatFlags {
        FormatFlags(self.format_flags)
    }

    pub fn has(&self, flag: FormatFlags) -> bool {
        self.flags().contains(flag)
    }

    /// Whether the body stores a pointer-target index: the `POINTER` flag
    /// is set and the type's own subtype is a pointer-class kind
    /// (pointer, class, array or tuple).
    pub fn has_pointer_target(&self) -> bool {
        self.has(FormatFlags::POINTER) && self.subtype & 0xF >= POINTER_CLASS_KIND
    }

    /// Type index bound to template `name`.
    pub fn template_type(&self, name: &str) -> Option<u32> {
        self.templates.iter().find_map(|t| match t.value {
            FileTemplateValue::Type(index) if t.name == name => Some(index),
            _ => None,
        })
    }

    pub fn template_int(&self, name: &str) -> Option<u64> {
        self.templates.iter().find_map(|t| match t.value {
            FileTemplateValue::Int(v) if t.name == name => Some(v),
            _ => None,
        })
    }

    /// Raw metadata for error reports.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "parent={}, flags={:#x}, subtype={:#x}, size={}, align={}, version={}",
            self.parent,
            self.format_flags,
            self.subtype,
            self.byte_size,
            self.alignment,
            self.version
        );
        if !self.members.is_empty() {
            let names: Vec<&str> = self.members.iter().map(|m| m.name.as_str()).collect();
            let _ = write!(out, ", members=[{}]", names.join(", "));
        }
        if let Some(hash) = self.hash {
            let _ = write!(out, ", hash={hash:#010x}");
        }
        out
    }
}

/// The decoded `TYPE` chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSection {
    pub variant: TypeChunkVariant,
    /// `types[i]` has index `i + 1`.
    pub types: Vec<FileType>,
    type_strings: Vec<String>,
    field_strings: Vec<String>,
    /// Indices in `TBOD` order.
    body_order: Vec<u32>,
    /// Indices in `THSH` order.
    hash_order: Vec<u32>,
    padding: Option<Vec<u8>>,
}

impl TypeSection {
    /// Section over `types` with canonical chunk layout.
    pub fn new(variant: TypeChunkVariant, types: Vec<FileType>) -> Self {
        let body_order = (1..=types.len() as u32).collect();
        let hash_order = types
            .iter()
            .zip(1u32..)
            .filter_map(|(t, i)| t.hash.map(|_| i))
            .collect();
        Self {
            variant,
            types,
            type_strings: Vec::new(),
            field_strings: Vec::new(),
            body_order,
            hash_order,
            padding: None,
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Type at a 1-based index.
    pub fn get(&self, index: u32) -> Option<&FileType> {
        index
            .checked_sub(1)
            .and_then(|i| self.types.get(i as usize))
    }

    /// Index of the first type named `name`.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.types
            .iter()
            .position(|t| t.name == name)
            .map(|i| i as u32 + 1)
    }

    /// Parse a `TYPE` container.
    pub(crate) fn parse(chunk: &Chunk<'_>) -> Result<Self> {
        let mut children = Children::of(chunk)?;
        let _tptr = children.expect(tags::TPTR)?;
        let type_strings = split_strings(children.expect(tags::TSTR)?.payload, "TSTR")?;
        let names = children.expect_any(&[tags::TNAM, tags::TNA1])?;
        let variant = if names.tag == tags::TNAM {
            TypeChunkVariant::Classic
        } else {
            TypeChunkVariant::Revised
        };
        let field_strings = split_strings(children.expect(tags::FSTR)?.payload, "FSTR")?;
        let body = children.expect(variant.body_tag())?;
        let hashes = children.expect(tags::THSH)?;
        let padding = children.optional(tags::TPAD).map(|c| c.payload.to_vec());
        children.finish()?;

        let mut section = Self {
            variant,
            types: parse_names(&mut names.reader(), &type_strings)?,
            type_strings,
            field_strings,
            body_order: Vec::new(),
            hash_order: Vec::new(),
            padding,
        };
        section.parse_bodies(&mut body.reader())?;
        section.parse_hashes(&mut hashes.reader())?;
        Ok(section)
    }

    fn type_mut(&mut self, index: u32) -> Result<&mut FileType> {
        let count = self.types.len();
        index
            .checked_sub(1)
            .and_then(|i| self.types.get_mut(i as usize))
            .ok_or_else(|| {
                HkxError::structural(format!("type index {index} outside 1..={count}"))
            })
    }

    fn check_index(&self, index: u32, what: &str) -> Result<u32> {
        if index as usize > self.types.len() {
            return Err(HkxError::structural(format!(
                "{what} references type {index} of {}",
                self.types.len()
            )));
        }
        Ok(index)
    }

    fn parse_bodies(&mut self, r: &mut ByteReader<'_>) -> Result<()> {
        while !r.is_eof() {
            let index = varint::read_u32(r)?;
            if index == 0 {
                break;
            }
            self.type_mut(index)?;
            let parent = self.check_index(varint::read_u32(r)?, "parent")?;
            let flags = FormatFlags(varint::read_u32(r)?);
            if flags.unknown_bits() != 0 {
                return Err(HkxError::structural(format!(
                    "type {index} has unsupported format flags {:#x}",
                    flags.0
                )));
            }
            let mut body = FileType {
                parent,
                format_flags: flags.0,
                ..FileType::default()
            };
            if flags.contains(FormatFlags::SUBTYPE) {
                body.subtype = varint::read_u32(r)?;
            }
            if body.has_pointer_target() {
                body.pointer = self.check_index(varint::read_u32(r)?, "pointer")?;
            }
            if flags.contains(FormatFlags::VERSION) {
                body.version = varint::read_u32(r)?;
            }
            if flags.contains(FormatFlags::BYTE_SIZE) {
                body.byte_size = varint::read_u32(r)?;
                body.alignment = varint::read_u32(r)?;
            }
            if flags.contains(FormatFlags::ABSTRACT_VALUE) {
                body.abstract_value = varint::read_u32(r)?;
            }
            if flags.contains(FormatFlags::MEMBERS) {
                let count = bounded_count(r, 4, "member")?;
                for _ in 0..count {
                    let name = lookup(&self.field_strings, varint::read_u32(r)?, "FSTR")?;
                    let flags = varint::read_u32(r)?;
                    let offset = varint::read_u32(r)?;
                    let ty = self.check_index(varint::read_u32(r)?, "member")?;
                    body.members.push(FileMember {
                        name,
                        flags,
                        offset,
                        ty,
                    });
                }
            }
            if flags.contains(FormatFlags::INTERFACES) {
                let count = bounded_count(r, 2, "interface")?;
                for _ in 0..count {
                    let ty = self.check_index(varint::read_u32(r)?, "interface")?;
                    body.interfaces.push((ty, varint::read_u32(r)?));
                }
            }

            let slot = self.type_mut(index)?;
            body.name = std::mem::take(&mut slot.name);
            body.templates = std::mem::take(&mut slot.templates);
            *slot = body;
            self.body_order.push(index);
        }
        Ok(())
    }

    fn parse_hashes(&mut self, r: &mut ByteReader<'_>) -> Result<()> {
        if r.is_eof() {
            return Ok(());
        }
        let count = bounded_count(r, 5, "hash")?;
        for _ in 0..count {
            let index = varint::read_u32(r)?;
            let hash = r.read_u32()?;
            self.type_mut(index)?.hash = Some(hash);
            self.hash_order.push(index);
        }
        Ok(())
    }

    /// Write the `TYPE` container.
    pub(crate) fn write(&self, w: &mut ByteWriter) -> Result<()> {
        let mut type_strings = StringTable::from(&self.type_strings);
        let mut field_strings = StringTable::from(&self.field_strings);

        let mut names = ByteWriter::new(true);
        varint::write(&mut names, self.types.len() as u64 + 1)?;
        for ty in &self.types {
            varint::write(&mut names, type_strings.ordinal(&ty.name))?;
            varint::write(&mut names, ty.templates.len() as u64)?;
            for t in &ty.templates {
                varint::write(&mut names, type_strings.ordinal(&t.name))?;
                match t.value {
                    FileTemplateValue::Type(index) => varint::write(&mut names, u64::from(index))?,
                    FileTemplateValue::Int(v) => varint::write(&mut names, v)?,
                }
            }
        }

        let mut body = ByteWriter::new(true);
        for &index in &self.body_order {
            let ty = self.get(index).ok_or_else(|| {
                HkxError::structural(format!("body order lists missing type {index}"))
            })?;
            write_body(&mut body, index, ty, &mut field_strings)?;
        }

        let mut hashes = ByteWriter::new(true);
        varint::write(&mut hashes, self.hash_order.len() as u64)?;
        for &index in &self.hash_order {
            let hash = self.get(index).and_then(|t| t.hash).ok_or_else(|| {
                HkxError::structural(format!("hash order lists type {index} without a hash"))
            })?;
            varint::write(&mut hashes, u64::from(index))?;
            hashes.write_u32(hash);
        }

        let start = begin_chunk(w, tags::TYPE);
        write_leaf(w, tags::TPTR, &vec![0u8; (self.types.len() + 1) * TPTR_ENTRY_LEN])?;
        write_leaf(w, tags::TSTR, &type_strings.bytes())?;
        write_leaf(w, self.variant.names_tag(), names.as_slice())?;
        write_leaf(w, tags::FSTR, &field_strings.bytes())?;
        write_leaf(w, self.variant.body_tag(), body.as_slice())?;
        write_leaf(w, tags::THSH, hashes.as_slice())?;
        if let Some(padding) = &self.padding {
            write_leaf(w, tags::TPAD, padding)?;
        }
        end_chunk(w, start, false)
    }
}

fn write_body(
    w: &mut ByteWriter,
    index: u32,
    ty: &FileType,
    field_strings: &mut StringTable,
) -> Result<()> {
    let flags = ty.flags();
    if flags.unknown_bits() != 0 {
        return Err(HkxError::invalid_value(
            ty.name.clone(),
            format!("unsupported format flags {:#x}", flags.0),
        ));
    }
    varint::write(w, u64::from(index))?;
    varint::write(w, u64::from(ty.parent))?;
    varint::write(w, u64::from(flags.0))?;
    if flags.contains(FormatFlags::SUBTYPE) {
        varint::write(w, u64::from(ty.subtype))?;
    }
    if ty.has_pointer_target() {
        varint::write(w, u64::from(ty.pointer))?;
    }
    if flags.contains(FormatFlags::VERSION) {
        varint::write(w, u64::from(ty.version))?;
    }
    if flags.contains(FormatFlags::BYTE_SIZE) {
        varint::write(w, u64::from(ty.byte_size))?;
        varint::write(w, u64::from(ty.alignment))?;
    }
    if flags.contains(FormatFlags::ABSTRACT_VALUE) {
        varint::write(w, u64::from(ty.abstract_value))?;
    }
    if flags.contains(FormatFlags::MEMBERS) {
        varint::write(w, ty.members.len() as u64)?;
        for m in &ty.members {
            varint::write(w, field_strings.ordinal(&m.name))?;
            varint::write(w, u64::from(m.flags))?;
            varint::write(w, u64::from(m.offset))?;
            varint::write(w, u64::from(m.ty))?;
        }
    }
    if flags.contains(FormatFlags::INTERFACES) {
        varint::write(w, ty.interfaces.len() as u64)?;
        for (iface, value) in &ty.interfaces {
            varint::write(w, u64::from(*iface))?;
            varint::write(w, u64::from(*value))?;
        }
    }
    Ok(())
}

/// A count that cannot exceed what the rest of the payload could hold.
fn bounded_count(r: &mut ByteReader<'_>, min_entry: usize, what: &str) -> Result<u32> {
    let count = varint::read_u32(r)?;
    if count as usize > r.remaining() / min_entry.max(1) + 1 {
        return Err(HkxError::structural(format!(
            "{count} {what} entries in {} remaining bytes",
            r.remaining()
        )));
    }
    Ok(count)
}

fn parse_names(r: &mut ByteReader<'_>, strings: &[String]) -> Result<Vec<FileType>> {
    let count = bounded_count(r, 2, "type")?;
    let Some(n) = count.checked_sub(1) else {
        return Err(HkxError::structural("type count excludes the null type"));
    };
    let mut types = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let name = lookup(strings, varint::read_u32(r)?, "TSTR")?;
        let template_count = bounded_count(r, 2, "template")?;
        let mut templates = Vec::with_capacity(template_count as usize);
        for _ in 0..template_count {
            let t_name = lookup(strings, varint::read_u32(r)?, "TSTR")?;
            let raw = varint::read(r)?;
            let value = match t_name.as_bytes().first() {
                Some(b't') => FileTemplateValue::Type(u32::try_from(raw).map_err(|_| {
                    HkxError::structural(format!("template {t_name} type index {raw}"))
                })?),
                Some(b'v') => FileTemplateValue::Int(raw),
                _ => {
                    return Err(HkxError::structural(format!(
                        "template parameter {t_name:?} lacks a t/v prefix"
                    )))
                }
            };
            templates.push(FileTemplate {
                name: t_name,
                value,
            });
        }
        types.push(FileType {
            name,
            templates,
            ..FileType::default()
        });
    }
    for ty in &types {
        for t in &ty.templates {
            if let FileTemplateValue::Type(index) = t.value {
                if index > n {
                    return Err(HkxError::structural(format!(
                        "template {} of {} references type {index} of {n}",
                        t.name, ty.name
                    )));
                }
            }
        }
    }
    Ok(types)
}

fn split_strings(payload: &[u8], what: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        let end = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| HkxError::Decode(format!("unterminated string in {what}")))?;
        let s = std::str::from_utf8(&rest[..end])
            .map_err(|e| HkxError::Decode(format!("invalid UTF-8 in {what}: {e}")))?;
        out.push(s.to_string());
        rest = &rest[end + 1..];
    }
    Ok(out)
}

fn lookup(strings: &[String], ordinal: u32, what: &str) -> Result<String> {
    strings.get(ordinal as usize).cloned().ok_or_else(|| {
        HkxError::structural(format!(
            "{what} ordinal {ordinal} outside {} strings",
            strings.len()
        ))
    })
}

/// String table that keeps existing ordinals and appends new strings.
struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, u64>,
}

impl StringTable {
    fn from(strings: &[String]) -> Self {
        let mut index = HashMap::with_capacity(strings.len());
        for (i, s) in strings.iter().enumerate() {
            index.entry(s.clone()).or_insert(i as u64);
        }
        Self {
            strings: strings.to_vec(),
            index,
        }
    }

    fn ordinal(&mut self, s: &str) -> u64 {
        if let Some(i) = self.index.get(s) {
            return *i;
        }
        let i = self.strings.len() as u64;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }

    fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for s in &self.strings {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        out
    }
}

/// Maps file types to compiled descriptors.
///
/// Wrapper file names (`hkArray`, `T*`, ...) are instantiated through the
/// registry's factory from their template arguments; everything else is
/// looked up by name.
pub(crate) struct TypeResolver<'a> {
    types: &'a [FileType],
    registry: &'a TypeRegistry,
    cache: HashMap<u32, Arc<TypeDescriptor>>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(types: &'a [FileType], registry: &'a TypeRegistry) -> Self {
        Self {
            types,
            registry,
            cache: HashMap::new(),
        }
    }

    pub fn file_type(&self, index: u32) -> Result<&'a FileType> {
        index
            .checked_sub(1)
            .and_then(|i| self.types.get(i as usize))
            .ok_or_else(|| {
                HkxError::structural(format!(
                    "type index {index} outside 1..={}",
                    self.types.len()
                ))
            })
    }

    pub fn resolve(&mut self, index: u32) -> Result<Arc<TypeDescriptor>> {
        self.resolve_at(index, 0)
    }

    fn resolve_at(&mut self, index: u32, depth: usize) -> Result<Arc<TypeDescriptor>> {
        if let Some(hit) = self.cache.get(&index) {
            return Ok(hit.clone());
        }
        if depth > MAX_RESOLVE_DEPTH {
            return Err(HkxError::structural(format!(
                "type {index} nests deeper than {MAX_RESOLVE_DEPTH}"
            )));
        }
        let ft = self.file_type(index)?;
        let unknown = || HkxError::UnknownType {
            name: ft.name.clone(),
            metadata: Some(ft.describe()),
        };
        let element = |this: &mut Self, param: &str| -> Result<Arc<TypeDescriptor>> {
            let target = ft.template_type(param).ok_or_else(unknown)?;
            this.resolve_at(target, depth + 1)
        };

        let registry = self.registry;
        let desc = match ft.name.as_str() {
            "T*" => registry.pointer(&element(self, "tT")?),
            "hkRefPtr" => registry.smart_pointer(&element(self, "tT")?),
            "hkRefVariant" => registry.named_variant(&element(self, "tT")?),
            "hkViewPtr" => registry.back_reference(&element(self, "tT")?),
            "hkRelArray" => registry.relative_array(&element(self, "tT")?),
            "hkArray" => registry.array(&element(self, "tT")?),
            "T[N]" => {
                let length = ft
                    .template_int("vN")
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(unknown)?;
                registry.fixed_struct(&element(self, "tT")?, length)
            }
            "hkEnum" => {
                let logical = element(self, "tENUM")?;
                let storage = element(self, "tSTORAGE")?;
                registry.enumeration(&logical, &storage)
            }
            name => registry.get_by_file_name(name).ok_or_else(unknown)?,
        };
        self.cache.insert(index, desc.clone());
        Ok(desc)
    }

    /// Map every resolvable type to its index (first occurrence wins).
    pub fn index_by_name(&mut self) -> HashMap<String, u32> {
        let mut out = HashMap::new();
        for index in 1..=self.types.len() as u32 {
            if let Ok(desc) = self.resolve(index) {
                out.entry(desc.name.clone()).or_insert(index);
            }
        }
        out
    }
}

/// Builds a type section from compiled descriptors.
///
/// Indices are assigned depth-first: a type, then its parent, templates,
/// pointer target, member types and interfaces.
pub(crate) struct SectionBuilder<'l> {
    layout: &'l mut LayoutCache,
    types: Vec<FileType>,
    index: HashMap<String, u32>,
}

impl<'l> SectionBuilder<'l> {
    pub fn new(layout: &'l mut LayoutCache) -> Self {
        Self {
            layout,
            types: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Index of `desc`, adding it and its dependencies first if needed.
    pub fn add(&mut self, desc: &Arc<TypeDescriptor>) -> Result<u32> {
        if let Some(index) = self.index.get(&desc.name) {
            return Ok(*index);
        }
        self.types.push(FileType::default());
        let index = self.types.len() as u32;
        self.index.insert(desc.name.clone(), index);

        let mut ft = FileType {
            name: desc.file_name().to_string(),
            subtype: desc.tag_type,
            version: desc.version,
            abstract_value: desc.abstract_value,
            hash: desc.hash,
            ..FileType::default()
        };
        ft.parent = match &desc.parent {
            Some(parent) => self.add(parent)?,
            None => 0,
        };
        for t in &desc.templates {
            let value = match &t.value {
                TemplateValue::Type(ty) => FileTemplateValue::Type(self.add(ty)?),
                TemplateValue::Int(v) => FileTemplateValue::Int(u64::try_from(*v).map_err(|_| {
                    HkxError::invalid_value(
                        format!("{}.{}", desc.name, t.name),
                        "negative template value",
                    )
                })?),
            };
            ft.templates.push(FileTemplate {
                name: t.name.clone(),
                value,
            });
        }

        let pointer = match desc.pointer_target() {
            Some(target) if desc.tag_data_kind().has_pointer_target() => Some(self.add(target)?),
            _ => None,
        };
        ft.pointer = pointer.unwrap_or(0);
        ft.byte_size = self.layout.size_of(desc);
        ft.alignment = self.layout.align_of(desc);

        if !desc.members.is_empty() {
            let layout = self.layout.class(desc);
            let inherited = desc.effective_member_count() - desc.members.len();
            for (i, member) in desc.members.iter().enumerate() {
                ft.members.push(FileMember {
                    name: member.name.clone(),
                    flags: member.flags.0,
                    offset: layout.offsets[inherited + i],
                    ty: self.add(&member.ty)?,
                });
            }
        }
        for iface in &desc.interfaces {
            ft.interfaces.push((self.add(&iface.ty)?, iface.value));
        }

        let mut flags = FormatFlags::empty().with(FormatFlags::BYTE_SIZE);
        if ft.subtype != 0 {
            flags = flags.with(FormatFlags::SUBTYPE);
        }
        if pointer.is_some() {
            flags = flags.with(FormatFlags::POINTER);
        }
        if ft.version != 0 {
            flags = flags.with(FormatFlags::VERSION);
        }
        if ft.abstract_value != 0 {
            flags = flags.with(FormatFlags::ABSTRACT_VALUE);
        }
        if !ft.members.is_empty() {
            flags = flags.with(FormatFlags::MEMBERS);
        }
        if !ft.interfaces.is_empty() {
            flags = flags.with(FormatFlags::INTERFACES);
        }
        let flags = desc.format_flags.unwrap_or(flags);
        if flags.unknown_bits() != 0 {
            return Err(HkxError::invalid_value(
                desc.name.clone(),
                format!("unsupported format flags {:#x}", flags.0),
            ));
        }
        ft.format_flags = flags.0;

        self.types[index as usize - 1] = ft;
        Ok(index)
    }

    pub fn finish(self, variant: TypeChunkVariant) -> (TypeSection, HashMap<String, u32>) {
        (TypeSection::new(variant, self.types), self.index)
    }
}

/// Tag kind recorded for a file type, following the parent chain when the
/// type does not carry its own.
pub(crate) fn effective_kind(types: &[FileType], index: u32) -> TagDataKind {
    let mut current = index;
    for _ in 0..=types.len() {
        let Some(ft) = current.checked_sub(1).and_then(|i| types.get(i as usize)) else {
            break;
        };
        if ft.has(FormatFlags::SUBTYPE) {
            return TagDataKind::from_tag(ft.subtype);
        }
        current = ft.parent;
    }
    TagDataKind::Void
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutRules;
    use crate::types::{ClassBuilder, WrapperKind};

    fn sample_registry() -> TypeRegistry {
        let registry = TypeRegistry::with_base_types();
        let base = registry.require("hkReferencedObject").expect("base");
        let real = registry.require("hkReal").expect("real");
        let v4 = registry.require("hkVector4").expect("vector");
        let bone = registry.register(
            ClassBuilder::new("hkaBone")
                .member("name", registry.require("hkStringPtr").expect("string"))
                .member("lockTranslation", registry.require("hkBool").expect("bool"))
                .hash(0x3584_2E3B)
                .build(),
        );
        registry.register(
            ClassBuilder::new("hkaSkeleton")
                .parent(&base)
                .member("bones", registry.array(&bone))
                .member("referencePose", registry.array(&v4))
                .member("scale", registry.fixed_struct(&real, 3))
                .member("parent", registry.pointer(&base))
                .version(6)
                .hash(0x0C8A_3D75)
                .build(),
        );
        registry
    }

    fn build(registry: &TypeRegistry, root: &str) -> (TypeSection, HashMap<String, u32>) {
        let mut layout = LayoutCache::new(LayoutRules::NATIVE);
        let mut builder = SectionBuilder::new(&mut layout);
        builder
            .add(&registry.require(root).expect("root"))
            .expect("add");
        builder.finish(TypeChunkVariant::Classic)
    }

    fn write_parse(section: &TypeSection) -> (Vec<u8>, TypeSection) {
        let mut w = ByteWriter::new(true);
        section.write(&mut w).expect("write");
        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes, true);
        let chunk = Chunk::expect(&mut r, tags::TYPE).expect("TYPE chunk");
        let parsed = TypeSection::parse(&chunk).expect("parse");
        (bytes, parsed)
    }

    #[test]
    fn test_builder_indices_are_depth_first() {
        let registry = sample_registry();
        let (section, index) = build(&registry, "hkaSkeleton");
        assert_eq!(index["hkaSkeleton"], 1);
        assert_eq!(index["hkReferencedObject"], 2);
        assert_eq!(index["hkBaseObject"], 3);
        assert_eq!(section.get(1).map(|t| t.name.as_str()), Some("hkaSkeleton"));
        assert_eq!(section.get(1).map(|t| t.parent), Some(2));
        assert!(section.get(0).is_none());

        let array = section.get(index["Array[hkaBone]"]).expect("array");
        assert_eq!(array.name, "hkArray");
        assert_eq!(array.template_type("tT"), Some(index["hkaBone"]));
        assert!(array.has(FormatFlags::POINTER));
        assert_eq!(array.pointer, index["hkaBone"]);

        let scale = section.get(index["Struct[hkReal, 3]"]).expect("tuple");
        assert_eq!(scale.name, "T[N]");
        assert_eq!(scale.template_int("vN"), Some(3));
        assert_eq!(scale.byte_size, 12);
    }

    #[test]
    fn test_builder_fields_follow_layout() {
        let registry = sample_registry();
        let (section, index) = build(&registry, "hkaSkeleton");
        let skeleton = section.get(1).expect("skeleton");
        assert!(skeleton.has(FormatFlags::VERSION));
        assert_eq!(skeleton.version, 6);
        assert_eq!(skeleton.hash, Some(0x0C8A_3D75));
        assert_eq!(skeleton.byte_size, 72);
        assert_eq!(skeleton.alignment, 8);
        let offsets: Vec<(&str, u32)> = skeleton
            .members
            .iter()
            .map(|m| (m.name.as_str(), m.offset))
            .collect();
        assert_eq!(
            offsets,
            [("bones", 16), ("referencePose", 32), ("scale", 48), ("parent", 64)]
        );

        let base = section.get(index["hkBaseObject"]).expect("base");
        assert!(!base.has(FormatFlags::MEMBERS));
        assert_eq!(base.byte_size, 8);
        let real = section.get(index["hkReal"]).expect("real");
        assert!(!real.has(FormatFlags::POINTER));
        assert_eq!(real.subtype & 0xFF, 5);
    }

    #[test]
    fn test_section_round_trips_and_is_byte_stable() {
        let registry = sample_registry();
        let (section, _) = build(&registry, "hkaSkeleton");
        let (bytes, parsed) = write_parse(&section);
        assert_eq!(parsed.types, section.types);
        assert_eq!(parsed.variant, TypeChunkVariant::Classic);

        let (again, _) = write_parse(&parsed);
        assert_eq!(again, bytes);
    }

    #[test]
    fn test_revised_variant_and_padding_are_kept() {
        let registry = sample_registry();
        let (mut section, _) = build(&registry, "hkaBone");
        section.variant = TypeChunkVariant::Revised;
        section.padding = Some(vec![0xAB; 4]);
        let (bytes, parsed) = write_parse(&section);
        assert_eq!(parsed.variant, TypeChunkVariant::Revised);
        assert_eq!(parsed.padding, Some(vec![0xAB; 4]));
        assert!(bytes.windows(4).any(|w| w == b"TNA1"));
        assert!(bytes.windows(4).any(|w| w == b"TBDY"));
        assert!(!bytes.windows(4).any(|w| w == b"TNAM"));
    }

    #[test]
    fn test_resolver_instantiates_wrappers() {
        let registry = sample_registry();
        let (section, index) = build(&registry, "hkaSkeleton");

        let fresh = TypeRegistry::with_base_types();
        let base = fresh.require("hkReferencedObject").expect("base");
        fresh.register(ClassBuilder::new("hkaBone").build());
        fresh.register(ClassBuilder::new("hkaSkeleton").parent(&base).build());

        let mut resolver = TypeResolver::new(&section.types, &fresh);
        let array = resolver.resolve(index["Array[hkaBone]"]).expect("array");
        assert_eq!(array.name, "Array[hkaBone]");
        assert!(matches!(array.wrapper_kind(), Some(WrapperKind::Array)));
        let tuple = resolver.resolve(index["Struct[hkReal, 3]"]).expect("tuple");
        assert_eq!(tuple.name, "Struct[hkReal, 3]");
        assert!(resolver.resolve(0).is_err());

        let names = resolver.index_by_name();
        assert_eq!(names["hkaSkeleton"], 1);
        assert_eq!(names["Ptr[hkReferencedObject]"], index["Ptr[hkReferencedObject]"]);
    }

    #[test]
    fn test_resolver_reports_file_metadata() {
        let registry = sample_registry();
        let (section, _) = build(&registry, "hkaSkeleton");
        let bare = TypeRegistry::with_base_types();
        let mut resolver = TypeResolver::new(&section.types, &bare);
        match resolver.resolve(1) {
            Err(HkxError::UnknownType { name, metadata }) => {
                assert_eq!(name, "hkaSkeleton");
                let metadata = metadata.expect("metadata");
                assert!(metadata.contains("version=6"), "{metadata}");
                assert!(metadata.contains("members=[bones, referencePose, scale, parent]"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_bodies_are_rejected() {
        let registry = sample_registry();
        let (section, _) = build(&registry, "hkaBone");
        let mut bad = section.clone();
        bad.types[0].format_flags |= 0x80;
        let mut w = ByteWriter::new(true);
        assert!(matches!(
            bad.write(&mut w),
            Err(HkxError::InvalidValue { .. })
        ));

        let mut body = ByteWriter::new(true);
        for v in [1u64, 0, 0x80] {
            varint::write(&mut body, v).expect("varint");
        }
        let mut parsed = section.clone();
        let mut r = ByteReader::new(body.as_slice(), true);
        assert!(matches!(
            parsed.parse_bodies(&mut r),
            Err(HkxError::Structural(_))
        ));

        let mut body = ByteWriter::new(true);
        for v in [99u64, 0, 0] {
            varint::write(&mut body, v).expect("varint");
        }
        let mut r = ByteReader::new(body.as_slice(), true);
        assert!(matches!(
            parsed.parse_bodies(&mut r),
            Err(HkxError::Structural(_))
        ));
    }

    #[test]
    fn test_pointer_target_needs_pointer_class_subtype() {
        let registry = sample_registry();
        let (section, index) = build(&registry, "hkaBone");
        let flags = (FormatFlags::SUBTYPE.0 | FormatFlags::POINTER.0 | FormatFlags::VERSION.0) as u64;

        // Int subtype: no pointer index, the next varint is the version
        let mut body = ByteWriter::new(true);
        for v in [1u64, 0, flags, 0x04, 0x05, 0x00] {
            varint::write(&mut body, v).expect("varint");
        }
        let mut parsed = section.clone();
        parsed.body_order.clear();
        parsed
            .parse_bodies(&mut ByteReader::new(body.as_slice(), true))
            .expect("int body");
        assert_eq!(parsed.types[0].subtype, 0x04);
        assert_eq!(parsed.types[0].pointer, 0);
        assert_eq!(parsed.types[0].version, 5);
        assert!(!parsed.types[0].has_pointer_target());

        let (_, reparsed) = write_parse(&parsed);
        assert_eq!(reparsed.types[0].version, 5);
        assert_eq!(reparsed.types[0].pointer, 0);

        // Pointer subtype: the index is present
        let target = u64::from(index["hkStringPtr"]);
        let mut body = ByteWriter::new(true);
        for v in [1u64, 0, flags, 0x06, target, 0x03, 0x00] {
            varint::write(&mut body, v).expect("varint");
        }
        let mut parsed = section.clone();
        parsed
            .parse_bodies(&mut ByteReader::new(body.as_slice(), true))
            .expect("pointer body");
        assert_eq!(u64::from(parsed.types[0].pointer), target);
        assert_eq!(parsed.types[0].version, 3);
        assert!(parsed.types[0].has_pointer_target());
    }

    #[test]
    fn test_effective_kind_follows_parents() {
        let registry = sample_registry();
        let (mut section, index) = build(&registry, "hkaSkeleton");
        assert_eq!(effective_kind(&section.types, 1), TagDataKind::Class);
        section.types[0].format_flags &= !FormatFlags::SUBTYPE.0;
        assert_eq!(effective_kind(&section.types, 1), TagDataKind::Class);
        assert_eq!(
            effective_kind(&section.types, index["hkReal"]),
            TagDataKind::Float
        );
    }
}

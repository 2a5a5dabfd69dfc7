// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Value encode/decode shared by both containers.
//!
//! Inline data (primitives, records, fixed structs, enums) is laid out the
//! same way in both formats; only references differ. Each container plugs
//! its reference handling in through [`ValueSink`] / [`ValueSource`]:
//!
//! ```text
//!            write_value / read_value
//!                     |
//!    +----------------+------------------+
//!    | inline                            | reference slot
//!    v                                   v
//!  Bool / Int / F32 / Record /     object_ref / array / string
//!  Tuple / Enum (storage)          (packfile fixups or tagfile items)
//! ```

use crate::config::{VARIANT_CLASS_NAME_MEMBER, VARIANT_NAME_MEMBER};
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{HkxError, Result};
use crate::layout::LayoutCache;
use crate::object::{Instance, ObjectArena, ObjectHandle, PrimitiveBlock, Value};
use crate::types::{Dispatch, TypeDescriptor, TypeRegistry, WrapperKind};
use std::sync::Arc;

/// Which pending queue a string belongs to (tagfile item ordering).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StringRole {
    Plain,
    /// A named variant's own `name`.
    VariantName,
}

/// Encode-side hooks of a container format.
pub(crate) trait ValueSink<'g> {
    fn layout(&mut self) -> &mut LayoutCache;
    fn registry(&self) -> &TypeRegistry;
    fn arena(&self) -> &'g ObjectArena;
    /// Buffer of the item currently being written.
    fn out(&mut self) -> &mut ByteWriter;

    fn object_ref(
        &mut self,
        pos: usize,
        declared: &Arc<TypeDescriptor>,
        target: Option<ObjectHandle>,
    ) -> Result<()>;

    fn array(&mut self, pos: usize, declared: &Arc<TypeDescriptor>, value: &'g Value)
        -> Result<()>;

    fn string(
        &mut self,
        pos: usize,
        declared: &Arc<TypeDescriptor>,
        value: Option<&'g str>,
        role: StringRole,
    ) -> Result<()>;
}

/// Decode-side hooks of a container format.
pub(crate) trait ValueSource {
    fn layout(&mut self) -> &mut LayoutCache;
    fn registry(&self) -> &TypeRegistry;
    /// Whole data region; positions are absolute within it.
    fn data(&self) -> &ByteReader<'_>;

    /// Resolve an object reference slot. `expected` is the type the target
    /// must descend from.
    fn object_ref(
        &mut self,
        pos: usize,
        declared: &Arc<TypeDescriptor>,
        expected: &Arc<TypeDescriptor>,
    ) -> Result<Option<ObjectHandle>>;

    fn array(&mut self, pos: usize, declared: &Arc<TypeDescriptor>) -> Result<Value>;

    fn string(&mut self, pos: usize, declared: &Arc<TypeDescriptor>) -> Result<Option<String>>;
}

/// Fast-path element classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    Bool { width: usize },
    Int { width: usize },
    UInt { width: usize },
    F32,
    /// Row of 3 or 4 floats.
    Vector { length: usize },
}

impl BlockKind {
    /// Fast-path class of an array element type, if any.
    pub(crate) fn of(elem: &TypeDescriptor) -> Option<Self> {
        if let Some(w) = &elem.wrapper {
            return match w.kind {
                WrapperKind::FixedStruct { length: length @ (3 | 4) }
                    if w.element.dispatch() == Some(Dispatch::F32) =>
                {
                    Some(Self::Vector {
                        length: length as usize,
                    })
                }
                _ => None,
            };
        }
        match elem.dispatch()? {
            Dispatch::Bool { width } => Some(Self::Bool { width }),
            Dispatch::Int { width, signed: true } => Some(Self::Int { width }),
            Dispatch::Int {
                width,
                signed: false,
            } => Some(Self::UInt { width }),
            Dispatch::F32 => Some(Self::F32),
            _ => None,
        }
    }
}

fn mismatch(ty: &TypeDescriptor, value: &Value) -> HkxError {
    HkxError::invalid_value(
        ty.name.clone(),
        format!("cannot encode a {} value", value.kind_name()),
    )
}

/// Range-check an integer for a slot of `width` bytes.
fn int_bits(ty: &TypeDescriptor, value: &Value, width: usize, signed: bool) -> Result<u64> {
    let bits = (width * 8) as u32;
    let out_of_range = || HkxError::invalid_value(ty.name.clone(), "integer out of range");
    if signed {
        let v = value.as_i64().ok_or_else(|| {
            if matches!(value, Value::UInt(_)) {
                out_of_range()
            } else {
                mismatch(ty, value)
            }
        })?;
        if bits < 64 {
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            if v < min || v > max {
                return Err(out_of_range());
            }
        }
        Ok(v as u64)
    } else {
        let v = value.as_u64().ok_or_else(|| {
            if matches!(value, Value::Int(_)) {
                out_of_range()
            } else {
                mismatch(ty, value)
            }
        })?;
        if bits < 64 && v >> bits != 0 {
            return Err(out_of_range());
        }
        Ok(v)
    }
}

/// Element type of a pointer or array wrapper.
pub(crate) fn element_of(declared: &Arc<TypeDescriptor>) -> Result<Arc<TypeDescriptor>> {
    declared
        .pointer_target()
        .cloned()
        .ok_or_else(|| HkxError::invalid_value(declared.name.clone(), "wrapper has no element"))
}

/// The pointee must exist and descend from the pointer's element type.
pub(crate) fn check_target(
    arena: &ObjectArena,
    declared: &Arc<TypeDescriptor>,
    handle: ObjectHandle,
) -> Result<()> {
    let object = arena.require(handle)?;
    let element = element_of(declared)?;
    if !object.descriptor().is_subclass_of(&element.name) {
        return Err(HkxError::invalid_value(
            declared.name.clone(),
            format!("points at {} ({})", handle, object.type_name()),
        ));
    }
    Ok(())
}

/// Write a value of type `ty` at `pos` in the sink's current buffer.
pub(crate) fn write_value<'g, S: ValueSink<'g>>(
    sink: &mut S,
    pos: usize,
    ty: &Arc<TypeDescriptor>,
    value: &'g Value,
) -> Result<()> {
    if let Some(w) = &ty.wrapper {
        return match &w.kind {
            WrapperKind::Pointer
            | WrapperKind::SmartPointer
            | WrapperKind::NamedVariant
            | WrapperKind::BackReference => match value {
                Value::Pointer(target) => sink.object_ref(pos, ty, *target),
                other => Err(mismatch(ty, other)),
            },
            WrapperKind::Array | WrapperKind::RelativeArray => match value {
                Value::Array(_) | Value::Block(_) => sink.array(pos, ty, value),
                other => Err(mismatch(ty, other)),
            },
            WrapperKind::FixedStruct { length } => match value {
                Value::Tuple(items) if items.len() == *length as usize => {
                    let stride = sink.layout().size_of(&w.element) as usize;
                    for (i, item) in items.iter().enumerate() {
                        write_value(sink, pos + i * stride, &w.element, item)?;
                    }
                    Ok(())
                }
                other => Err(mismatch(ty, other)),
            },
            WrapperKind::Enum { .. } => write_value(sink, pos, &w.element, value),
        };
    }

    match ty.dispatch() {
        Some(Dispatch::Nothing) => Ok(()),
        Some(Dispatch::Bool { width }) => match value {
            Value::Bool(b) => {
                sink.out().put_uint(pos, u64::from(*b), width);
                Ok(())
            }
            other => Err(mismatch(ty, other)),
        },
        Some(Dispatch::Int { width, signed }) => {
            let bits = int_bits(ty, value, width, signed)?;
            sink.out().put_uint(pos, bits, width);
            Ok(())
        }
        Some(Dispatch::F32) => match value {
            Value::F32(f) => {
                sink.out().put_f32(pos, *f);
                Ok(())
            }
            other => Err(mismatch(ty, other)),
        },
        Some(Dispatch::String) => match value {
            Value::String(s) => sink.string(pos, ty, s.as_deref(), StringRole::Plain),
            other => Err(mismatch(ty, other)),
        },
        Some(Dispatch::Members) => match value {
            Value::Record(inst) => write_record(sink, pos, ty, inst),
            other => Err(mismatch(ty, other)),
        },
        None => Err(HkxError::invalid_value(
            ty.name.clone(),
            format!("tag type {:#x} has no encode routine", ty.tag_type),
        )),
    }
}

/// Write every serializable member of a class value.
pub(crate) fn write_record<'g, S: ValueSink<'g>>(
    sink: &mut S,
    pos: usize,
    ty: &Arc<TypeDescriptor>,
    inst: &'g Instance,
) -> Result<()> {
    if inst.type_name() != ty.name {
        return Err(HkxError::invalid_value(
            ty.name.clone(),
            format!("record holds a {}", inst.type_name()),
        ));
    }
    let layout = sink.layout().class(ty);
    let members = ty.effective_members();
    if inst.fields().len() != members.len() {
        return Err(HkxError::invalid_value(
            ty.name.clone(),
            "field count differs from member count",
        ));
    }
    let variant_name = ty
        .has_named_variant()
        .then(|| ty.member_index(VARIANT_NAME_MEMBER))
        .flatten();

    for (i, (member, value)) in members.iter().zip(inst.fields()).enumerate() {
        if !member.flags.is_serializable() {
            continue;
        }
        let at = pos + layout.offsets[i] as usize;
        if matches!(member.ty.wrapper_kind(), Some(WrapperKind::NamedVariant)) {
            let target = match value {
                Value::Pointer(p) => *p,
                other => return Err(mismatch(&member.ty, other)),
            };
            check_variant_target(sink, ty, inst, target)?;
            sink.object_ref(at, &member.ty, target)?;
        } else if Some(i) == variant_name {
            match value {
                Value::String(s) => {
                    sink.string(at, &member.ty, s.as_deref(), StringRole::VariantName)?;
                }
                other => return Err(mismatch(&member.ty, other)),
            }
        } else {
            write_value(sink, at, &member.ty, value)?;
        }
    }
    Ok(())
}

/// The sibling `className` must name a referenced-object type the target
/// descends from.
fn check_variant_target<'g, S: ValueSink<'g>>(
    sink: &S,
    owner: &TypeDescriptor,
    inst: &Instance,
    target: Option<ObjectHandle>,
) -> Result<()> {
    let Some(handle) = target else {
        return Ok(());
    };
    let class_name = inst
        .get(VARIANT_CLASS_NAME_MEMBER)
        .and_then(Value::as_str)
        .unwrap_or_default();
    let resolved = sink.registry().resolve_variant(class_name)?;
    let object = sink.arena().require(handle)?;
    if !object.descriptor().is_subclass_of(&resolved.name) {
        return Err(HkxError::invalid_value(
            format!("{}.variant", owner.name),
            format!(
                "object {} is a {}, not a {}",
                handle,
                object.type_name(),
                resolved.name
            ),
        ));
    }
    Ok(())
}

/// Write array elements contiguously starting at `pos`.
pub(crate) fn write_elements<'g, S: ValueSink<'g>>(
    sink: &mut S,
    pos: usize,
    elem: &Arc<TypeDescriptor>,
    value: &'g Value,
) -> Result<()> {
    let stride = sink.layout().size_of(elem) as usize;
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                write_value(sink, pos + i * stride, elem, item)?;
            }
            Ok(())
        }
        Value::Block(block) => write_block(sink, pos, elem, stride, block),
        other => Err(mismatch(elem, other)),
    }
}

fn write_block<'g, S: ValueSink<'g>>(
    sink: &mut S,
    pos: usize,
    elem: &Arc<TypeDescriptor>,
    stride: usize,
    block: &PrimitiveBlock,
) -> Result<()> {
    let kind = BlockKind::of(elem);
    match (kind, block) {
        (Some(BlockKind::Bool { width }), PrimitiveBlock::Bool(v)) => {
            for (i, b) in v.iter().enumerate() {
                sink.out().put_uint(pos + i * stride, u64::from(*b), width);
            }
        }
        (Some(BlockKind::Int { width }), PrimitiveBlock::Int(v)) => {
            for (i, n) in v.iter().enumerate() {
                let bits = int_bits(elem, &Value::Int(*n), width, true)?;
                sink.out().put_uint(pos + i * stride, bits, width);
            }
        }
        (Some(BlockKind::UInt { width }), PrimitiveBlock::UInt(v)) => {
            for (i, n) in v.iter().enumerate() {
                let bits = int_bits(elem, &Value::UInt(*n), width, false)?;
                sink.out().put_uint(pos + i * stride, bits, width);
            }
        }
        (Some(BlockKind::F32), PrimitiveBlock::F32(v)) if stride == 4 => {
            sink.out().put_f32s(pos, v);
        }
        (Some(BlockKind::Vector { length: 3 }), PrimitiveBlock::Vec3(rows)) => {
            for (i, row) in rows.iter().enumerate() {
                sink.out().put_f32s(pos + i * stride, row);
            }
        }
        (Some(BlockKind::Vector { length: 4 }), PrimitiveBlock::Vec4(rows)) => {
            if stride == 16 {
                let flat: Vec<f32> = rows.iter().flatten().copied().collect();
                sink.out().put_f32s(pos, &flat);
            } else {
                for (i, row) in rows.iter().enumerate() {
                    sink.out().put_f32s(pos + i * stride, row);
                }
            }
        }
        _ => {
            return Err(HkxError::invalid_value(
                elem.name.clone(),
                "primitive block does not match the element type",
            ))
        }
    }
    Ok(())
}

/// Read a value of type `ty` at `pos`.
pub(crate) fn read_value<S: ValueSource>(
    src: &mut S,
    pos: usize,
    ty: &Arc<TypeDescriptor>,
) -> Result<Value> {
    if let Some(w) = &ty.wrapper {
        return match &w.kind {
            WrapperKind::Pointer
            | WrapperKind::SmartPointer
            | WrapperKind::NamedVariant
            | WrapperKind::BackReference => {
                Ok(Value::Pointer(src.object_ref(pos, ty, &w.element)?))
            }
            WrapperKind::Array | WrapperKind::RelativeArray => src.array(pos, ty),
            WrapperKind::FixedStruct { length } => {
                let stride = src.layout().size_of(&w.element) as usize;
                let items = (0..*length as usize)
                    .map(|i| read_value(src, pos + i * stride, &w.element))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Tuple(items))
            }
            WrapperKind::Enum { .. } => read_value(src, pos, &w.element),
        };
    }

    match ty.dispatch() {
        Some(Dispatch::Nothing) => Ok(Value::Void),
        Some(Dispatch::Bool { width }) => Ok(Value::Bool(src.data().uint_at(pos, width)? != 0)),
        Some(Dispatch::Int {
            width,
            signed: true,
        }) => Ok(Value::Int(src.data().int_at(pos, width)?)),
        Some(Dispatch::Int {
            width,
            signed: false,
        }) => Ok(Value::UInt(src.data().uint_at(pos, width)?)),
        Some(Dispatch::F32) => Ok(Value::F32(src.data().f32_at(pos)?)),
        Some(Dispatch::String) => Ok(Value::String(src.string(pos, ty)?)),
        Some(Dispatch::Members) => Ok(Value::Record(read_record(src, pos, ty)?)),
        None => Err(HkxError::structural(format!(
            "type {} (tag {:#x}) has no decode routine",
            ty.name, ty.tag_type
        ))),
    }
}

/// Read every serializable member of a class value.
pub(crate) fn read_record<S: ValueSource>(
    src: &mut S,
    pos: usize,
    ty: &Arc<TypeDescriptor>,
) -> Result<Instance> {
    let layout = src.layout().class(ty);
    let members = ty.effective_members();
    let class_index = ty.member_index(VARIANT_CLASS_NAME_MEMBER);
    let mut fields: Vec<Value> = Vec::with_capacity(members.len());

    for (i, member) in members.iter().enumerate() {
        if !member.flags.is_serializable() {
            fields.push(Value::default_for(&member.ty));
            continue;
        }
        let at = pos + layout.offsets[i] as usize;
        let value = match &member.ty.wrapper {
            Some(w) if matches!(w.kind, WrapperKind::NamedVariant) => {
                let class_name = class_index
                    .and_then(|ci| fields.get(ci))
                    .and_then(Value::as_str);
                let expected = match class_name {
                    Some(name) => src.registry().resolve_variant(name)?,
                    None => w.element.clone(),
                };
                Value::Pointer(src.object_ref(at, &member.ty, &expected)?)
            }
            _ => read_value(src, at, &member.ty)?,
        };
        fields.push(value);
    }
    Ok(Instance::from_fields(ty.clone(), fields))
}

/// Read `count` contiguous elements, producing a [`PrimitiveBlock`] when
/// the element type allows it.
pub(crate) fn read_elements<S: ValueSource>(
    src: &mut S,
    pos: usize,
    elem: &Arc<TypeDescriptor>,
    count: usize,
) -> Result<Value> {
    let stride = src.layout().size_of(elem) as usize;
    let span = count
        .checked_mul(stride)
        .ok_or_else(|| HkxError::structural(format!("array of {count} elements overflows")))?;
    // Bounds-check the whole run before allocating for it
    src.data().bytes_at(pos, span)?;
    if stride == 0 && count > src.data().len() {
        return Err(HkxError::structural(format!(
            "array of {count} zero-sized {} elements",
            elem.name
        )));
    }

    let data = src.data();
    let block = match BlockKind::of(elem) {
        Some(BlockKind::Bool { width }) => PrimitiveBlock::Bool(
            (0..count)
                .map(|i| data.uint_at(pos + i * stride, width).map(|v| v != 0))
                .collect::<Result<_>>()?,
        ),
        Some(BlockKind::Int { width }) => PrimitiveBlock::Int(
            (0..count)
                .map(|i| data.int_at(pos + i * stride, width))
                .collect::<Result<_>>()?,
        ),
        Some(BlockKind::UInt { width }) => PrimitiveBlock::UInt(
            (0..count)
                .map(|i| data.uint_at(pos + i * stride, width))
                .collect::<Result<_>>()?,
        ),
        Some(BlockKind::F32) if stride == 4 => {
            let mut out = vec![0f32; count];
            data.f32s_at(pos, &mut out)?;
            PrimitiveBlock::F32(out)
        }
        Some(BlockKind::Vector { length: 3 }) => {
            let mut rows = vec![[0f32; 3]; count];
            for (i, row) in rows.iter_mut().enumerate() {
                data.f32s_at(pos + i * stride, row)?;
            }
            PrimitiveBlock::Vec3(rows)
        }
        Some(BlockKind::Vector { length: 4 }) => {
            let mut rows = vec![[0f32; 4]; count];
            for (i, row) in rows.iter_mut().enumerate() {
                data.f32s_at(pos + i * stride, row)?;
            }
            PrimitiveBlock::Vec4(rows)
        }
        _ => {
            let items = (0..count)
                .map(|i| read_value(src, pos + i * stride, elem))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Value::Array(items));
        }
    };
    Ok(Value::Block(block))
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic values held by object instances.

use crate::object::{Instance, ObjectHandle};
use crate::types::{Dispatch, TypeDescriptor, WrapperKind};
use std::sync::Arc;

/// Tightly packed run of primitive array elements.
///
/// Decoders produce this for arrays of bools, integers, floats and 3/4-float
/// vectors; encoders accept it or the equivalent [`Value::Array`] and emit
/// the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveBlock {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    UInt(Vec<u64>),
    F32(Vec<f32>),
    Vec3(Vec<[f32; 3]>),
    Vec4(Vec<[f32; 4]>),
}

impl PrimitiveBlock {
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::UInt(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::Vec3(v) => v.len(),
            Self::Vec4(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element-wise expansion (vector rows become tuples).
    pub fn to_values(&self) -> Vec<Value> {
        match self {
            Self::Bool(v) => v.iter().map(|b| Value::Bool(*b)).collect(),
            Self::Int(v) => v.iter().map(|i| Value::Int(*i)).collect(),
            Self::UInt(v) => v.iter().map(|u| Value::UInt(*u)).collect(),
            Self::F32(v) => v.iter().map(|f| Value::F32(*f)).collect(),
            Self::Vec3(v) => v
                .iter()
                .map(|row| Value::Tuple(row.iter().map(|f| Value::F32(*f)).collect()))
                .collect(),
            Self::Vec4(v) => v
                .iter()
                .map(|row| Value::Tuple(row.iter().map(|f| Value::F32(*f)).collect()))
                .collect(),
        }
    }
}

/// A value conforming to one [`TypeDescriptor`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Zero-width types.
    Void,
    Bool(bool),
    /// Signed integer of any width.
    Int(i64),
    /// Unsigned integer of any width.
    UInt(u64),
    F32(f32),
    /// String pointer; `None` is a null pointer.
    String(Option<String>),
    /// Object reference; `None` is a null pointer.
    Pointer(Option<ObjectHandle>),
    /// Array or relative-array elements.
    Array(Vec<Value>),
    /// Fast-path array elements.
    Block(PrimitiveBlock),
    /// Fixed-length inline struct.
    Tuple(Vec<Value>),
    /// Inline class value.
    Record(Instance),
}

impl Value {
    /// Zero value of a type: null pointers, empty arrays, defaulted records.
    pub fn default_for(ty: &Arc<TypeDescriptor>) -> Self {
        if let Some(w) = &ty.wrapper {
            return match &w.kind {
                WrapperKind::Pointer
                | WrapperKind::SmartPointer
                | WrapperKind::NamedVariant
                | WrapperKind::BackReference => Self::Pointer(None),
                WrapperKind::Array | WrapperKind::RelativeArray => Self::Array(Vec::new()),
                WrapperKind::FixedStruct { length } => Self::Tuple(
                    (0..*length).map(|_| Self::default_for(&w.element)).collect(),
                ),
                WrapperKind::Enum { .. } => Self::default_for(&w.element),
            };
        }
        match ty.dispatch() {
            Some(Dispatch::Bool { .. }) => Self::Bool(false),
            Some(Dispatch::Int { signed: true, .. }) => Self::Int(0),
            Some(Dispatch::Int { signed: false, .. }) => Self::UInt(0),
            Some(Dispatch::F32) => Self::F32(0.0),
            Some(Dispatch::String) => Self::String(None),
            Some(Dispatch::Members) => Self::Record(Instance::new(ty)),
            Some(Dispatch::Nothing) | None => Self::Void,
        }
    }

    /// Short kind label for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::F32(_) => "f32",
            Self::String(_) => "string",
            Self::Pointer(_) => "pointer",
            Self::Array(_) => "array",
            Self::Block(_) => "block",
            Self::Tuple(_) => "tuple",
            Self::Record(_) => "record",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value, converting between signed and unsigned when it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(*v),
            _ => None,
        }
    }

    /// String contents; `None` for null strings and non-strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => s.as_deref(),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<ObjectHandle> {
        match self {
            Self::Pointer(p) => *p,
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Instance> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Array elements in expanded form.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Self::Array(v) | Self::Tuple(v) => Some(v.clone()),
            Self::Block(b) => Some(b.to_values()),
            _ => None,
        }
    }

    /// Element count of an array-like value.
    pub fn len(&self) -> usize {
        match self {
            Self::Array(v) | Self::Tuple(v) => v.len(),
            Self::Block(b) => b.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(Some(v.to_string()))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(Some(v))
    }
}

impl From<ObjectHandle> for Value {
    fn from(v: ObjectHandle) -> Self {
        Self::Pointer(Some(v))
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Self::Record(v)
    }
}

impl From<PrimitiveBlock> for Value {
    fn from(v: PrimitiveBlock) -> Self {
        Self::Block(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

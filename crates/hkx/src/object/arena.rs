// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handle-addressed object storage.
//!
//! Object identity is the handle, never the value: two field-wise equal
//! instances in different slots are distinct objects.

use crate::error::{HkxError, Result};
use crate::object::Instance;
use crate::types::TypeDescriptor;
use std::fmt;
use std::sync::Arc;

/// Identity of one object in an [`ObjectArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u32);

impl ObjectHandle {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Append-only store of object instances.
#[derive(Debug, Clone, Default)]
pub struct ObjectArena {
    objects: Vec<Instance>,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty (zero-valued) instance to be populated in place.
    ///
    /// Decoders reserve a slot before reading an object's members so that a
    /// back-reference reached mid-decode resolves to the same handle.
    pub fn reserve(&mut self, descriptor: &Arc<TypeDescriptor>) -> ObjectHandle {
        self.alloc(Instance::new(descriptor))
    }

    pub fn alloc(&mut self, instance: Instance) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects.push(instance);
        handle
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&Instance> {
        self.objects.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut Instance> {
        self.objects.get_mut(handle.index())
    }

    /// Look up a handle that the graph claims exists.
    pub(crate) fn require(&self, handle: ObjectHandle) -> Result<&Instance> {
        self.get(handle)
            .ok_or_else(|| HkxError::invalid_value(handle.to_string(), "dangling object handle"))
    }

    /// Populate a reserved slot.
    pub(crate) fn fill(&mut self, handle: ObjectHandle, instance: Instance) -> Result<()> {
        let slot = self
            .get_mut(handle)
            .ok_or_else(|| HkxError::invalid_value(handle.to_string(), "dangling object handle"))?;
        *slot = instance;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &Instance)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, obj)| (ObjectHandle(i as u32), obj))
    }
}

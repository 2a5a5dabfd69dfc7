// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime object graphs.
//!
//! Instances live in an [`ObjectArena`] and refer to each other through
//! [`ObjectHandle`]s, so identity-based deduplication and cycles through
//! back-references need no shared ownership.

mod arena;
mod graph;
mod instance;
mod value;

pub use arena::{ObjectArena, ObjectHandle};
pub use graph::{NamedVariant, ObjectGraph};
pub use instance::Instance;
pub use value::{PrimitiveBlock, Value};

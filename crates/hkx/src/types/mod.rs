// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type descriptors for HKX object graphs
//!
//! Static description of every serializable type, shared by both container
//! formats.
//!
//! # Features
//!
//! - **TypeDescriptor**: primitives, classes with inheritance, templates
//! - **Wrappers**: pointer, array, fixed-struct and enum instantiations
//! - **TypeRegistry**: session-scoped name lookup plus the memoizing wrapper factory
//! - **Builder API**: fluent class construction with native member offsets
//!
//! # Example
//!
//! ```rust
//! use hkx::types::{ClassBuilder, TypeRegistry};
//!
//! let registry = TypeRegistry::with_base_types();
//! let base = registry.require("hkReferencedObject").unwrap();
//! let real = registry.require("hkReal").unwrap();
//!
//! let bone = registry.register(
//!     ClassBuilder::new("hkaBoneWeight")
//!         .parent(&base)
//!         .member("weight", real)
//!         .build(),
//! );
//! assert_eq!(bone.effective_members().len(), 2);
//! ```

mod base;
mod builder;
mod descriptor;
mod registry;
pub mod tag;
mod wrapper;

pub use builder::ClassBuilder;
pub use descriptor::{
    Extent, FormatFlags, Interface, Member, MemberFlags, TemplateParam, TemplateValue,
    TypeDescriptor,
};
pub use registry::TypeRegistry;
pub use tag::{Dispatch, TagDataKind};
pub use wrapper::{synthesized_name, Wrapper, WrapperKind};


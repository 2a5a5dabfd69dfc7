// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cross-check of file type metadata against compiled descriptors.
//!
//! Tag type, byte size and alignment may be omitted by a file type and are
//! then taken from its parent chain. Format flags, abstract value and
//! version belong to the type itself. Any disagreement is fatal except the
//! signature hash, which only produces a [`ValidationWarning`].

use crate::error::{HkxError, Result};
use crate::layout::{LayoutCache, LayoutRules};
use crate::tagfile::types::TypeResolver;
use crate::tagfile::{FileTemplateValue, FileType};
use crate::types::{FormatFlags, TypeDescriptor, TypeRegistry};
use std::fmt;

/// A non-fatal disagreement between file and compiled metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub type_name: String,
    pub field: String,
    pub expected: String,
    pub found: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type `{}` {}: compiled {}, file {}",
            self.type_name, self.field, self.expected, self.found
        )
    }
}

struct Validator<'a> {
    types: &'a [FileType],
    resolver: TypeResolver<'a>,
    layout: LayoutCache,
    warnings: Vec<ValidationWarning>,
}

fn mismatch(
    compiled: &TypeDescriptor,
    field: impl Into<String>,
    expected: impl fmt::Display,
    found: impl fmt::Display,
) -> HkxError {
    HkxError::TypeMismatch {
        type_name: compiled.name.clone(),
        field: field.into(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

impl<'a> Validator<'a> {
    fn new(types: &'a [FileType], registry: &'a TypeRegistry) -> Self {
        Self {
            types,
            resolver: TypeResolver::new(types, registry),
            layout: LayoutCache::new(LayoutRules::NATIVE),
            warnings: Vec::new(),
        }
    }

    /// First value of `get` along the parent chain of `index`, among types
    /// that carry `flag`.
    fn inherited(&self, index: u32, flag: FormatFlags, get: impl Fn(&FileType) -> u32) -> Option<u32> {
        let mut current = index;
        for _ in 0..=self.types.len() {
            let ft = current
                .checked_sub(1)
                .and_then(|i| self.types.get(i as usize))?;
            if ft.has(flag) {
                return Some(get(ft));
            }
            current = ft.parent;
        }
        None
    }

    fn name_of(&mut self, index: u32) -> Result<Option<String>> {
        if index == 0 {
            return Ok(None);
        }
        Ok(Some(self.resolver.resolve(index)?.name.clone()))
    }

    fn check(&mut self, index: u32, compiled: &TypeDescriptor) -> Result<()> {
        let ft = self.resolver.file_type(index)?;
        let show = |name: Option<&str>| name.unwrap_or("<none>").to_string();

        let parent = self.name_of(ft.parent)?;
        let compiled_parent = compiled.parent.as_ref().map(|p| p.name.clone());
        if parent != compiled_parent {
            return Err(mismatch(
                compiled,
                "parent",
                show(compiled_parent.as_deref()),
                show(parent.as_deref()),
            ));
        }

        if let Some(tag) = self.inherited(index, FormatFlags::SUBTYPE, |t| t.subtype) {
            if tag != compiled.tag_type {
                return Err(mismatch(
                    compiled,
                    "tag type",
                    format_args!("{:#x}", compiled.tag_type),
                    format_args!("{tag:#x}"),
                ));
            }
        }
        if let Some(size) = self.inherited(index, FormatFlags::BYTE_SIZE, |t| t.byte_size) {
            let expected = self.layout.size_of(compiled);
            if size != expected {
                return Err(mismatch(compiled, "byte size", expected, size));
            }
        }
        if let Some(align) = self.inherited(index, FormatFlags::BYTE_SIZE, |t| t.alignment) {
            let expected = self.layout.align_of(compiled);
            if align != expected {
                return Err(mismatch(compiled, "alignment", expected, align));
            }
        }

        if let Some(flags) = compiled.format_flags {
            if flags.0 != ft.format_flags {
                return Err(mismatch(
                    compiled,
                    "format flags",
                    format_args!("{:#x}", flags.0),
                    format_args!("{:#x}", ft.format_flags),
                ));
            }
        }
        if ft.abstract_value != compiled.abstract_value {
            return Err(mismatch(
                compiled,
                "abstract value",
                compiled.abstract_value,
                ft.abstract_value,
            ));
        }
        if ft.version != compiled.version {
            return Err(mismatch(compiled, "version", compiled.version, ft.version));
        }

        if ft.has_pointer_target() {
            let target = self.name_of(ft.pointer)?;
            let expected = compiled.pointer_target().map(|t| t.name.clone());
            if target != expected {
                return Err(mismatch(
                    compiled,
                    "pointer target",
                    show(expected.as_deref()),
                    show(target.as_deref()),
                ));
            }
        }
        for template in &ft.templates {
            if let FileTemplateValue::Type(arg) = template.value {
                self.name_of(arg)?;
            }
        }

        self.check_members(ft, compiled)?;

        if let (Some(expected), Some(found)) = (compiled.hash, ft.hash) {
            if expected != found {
                let warning = ValidationWarning {
                    type_name: compiled.name.clone(),
                    field: "hash".into(),
                    expected: format!("{expected:#010x}"),
                    found: format!("{found:#010x}"),
                };
                log::warn!("[validate] {warning}");
                self.warnings.push(warning);
            }
        }
        Ok(())
    }

    fn check_members(&mut self, ft: &FileType, compiled: &TypeDescriptor) -> Result<()> {
        if ft.members.len() != compiled.members.len() {
            return Err(mismatch(
                compiled,
                "member count",
                compiled.members.len(),
                ft.members.len(),
            ));
        }
        if ft.members.is_empty() {
            return Ok(());
        }
        let offsets = self.layout.class(compiled).offsets.clone();
        let inherited = compiled.effective_member_count() - compiled.members.len();
        for (i, (file, member)) in ft.members.iter().zip(&compiled.members).enumerate() {
            if file.name != member.name {
                return Err(mismatch(
                    compiled,
                    format!("member {i} name"),
                    &member.name,
                    &file.name,
                ));
            }
            if file.flags != member.flags.0 {
                return Err(mismatch(
                    compiled,
                    format!("member `{}` flags", member.name),
                    format_args!("{:#x}", member.flags.0),
                    format_args!("{:#x}", file.flags),
                ));
            }
            let offset = offsets[inherited + i];
            if file.offset != offset {
                return Err(mismatch(
                    compiled,
                    format!("member `{}` offset", member.name),
                    offset,
                    file.offset,
                ));
            }
            let ty = self.name_of(file.ty)?.unwrap_or_default();
            if ty != member.ty.name {
                return Err(mismatch(
                    compiled,
                    format!("member `{}` type", member.name),
                    &member.ty.name,
                    ty,
                ));
            }
        }
        Ok(())
    }
}

/// Validate the file type at `index` against `compiled`.
///
/// Referenced types (parent, pointer target, templates, member types) must
/// resolve through `registry`; one that does not is
/// [`HkxError::UnknownType`] carrying the file's metadata for it.
pub fn validate_type(
    types: &[FileType],
    index: u32,
    compiled: &TypeDescriptor,
    registry: &TypeRegistry,
) -> Result<Vec<ValidationWarning>> {
    let mut validator = Validator::new(types, registry);
    validator.check(index, compiled)?;
    Ok(validator.warnings)
}

/// Validate every file type against the compiled descriptor it resolves to.
pub fn validate_types(types: &[FileType], registry: &TypeRegistry) -> Result<Vec<ValidationWarning>> {
    let mut validator = Validator::new(types, registry);
    for index in 1..=types.len() as u32 {
        let compiled = validator.resolver.resolve(index)?;
        validator.check(index, &compiled)?;
    }
    log::debug!(
        "[validate] {} types checked, {} warnings",
        types.len(),
        validator.warnings.len()
    );
    Ok(validator.warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TypeChunkVariant;
    use crate::tagfile::types::SectionBuilder;
    use crate::types::ClassBuilder;
    use std::sync::Arc;

    fn registry_with_bone() -> (TypeRegistry, Arc<TypeDescriptor>) {
        let registry = TypeRegistry::with_base_types();
        let base = registry.expect_type("hkReferencedObject");
        let bone = registry.register(
            ClassBuilder::new("hkaBone")
                .parent(&base)
                .member("name", registry.expect_type("hkStringPtr"))
                .member("lockTranslation", registry.expect_type("hkBool"))
                .version(2)
                .hash(0x3550_9f8d)
                .build(),
        );
        (registry, bone)
    }

    fn section_for(ty: &Arc<TypeDescriptor>) -> Vec<FileType> {
        let mut layout = LayoutCache::new(LayoutRules::NATIVE);
        let mut builder = SectionBuilder::new(&mut layout);
        builder.add(ty).expect("add");
        builder.finish(TypeChunkVariant::Classic).0.types
    }

    #[test]
    fn test_matching_section_is_clean() {
        let (registry, bone) = registry_with_bone();
        let types = section_for(&bone);
        assert!(validate_types(&types, &registry).expect("valid").is_empty());
        assert!(validate_type(&types, 1, &bone, &registry)
            .expect("valid")
            .is_empty());
    }

    #[test]
    fn test_hash_mismatch_is_only_a_warning() {
        let (registry, bone) = registry_with_bone();
        let mut types = section_for(&bone);
        types[0].hash = Some(0xDEAD_BEEF);
        let warnings = validate_types(&types, &registry).expect("valid");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "hash");
        assert_eq!(warnings[0].found, "0xdeadbeef");
        assert!(warnings[0].to_string().contains("hkaBone"));
    }

    #[test]
    fn test_inherited_and_local_mismatches_are_fatal() {
        let (registry, bone) = registry_with_bone();
        let clean = section_for(&bone);

        let mut types = clean.clone();
        types[0].byte_size += 8;
        match validate_types(&types, &registry) {
            Err(HkxError::TypeMismatch { field, .. }) => assert_eq!(field, "byte size"),
            other => panic!("unexpected {other:?}"),
        }

        let mut types = clean.clone();
        types[0].version = 3;
        match validate_types(&types, &registry) {
            Err(HkxError::TypeMismatch { field, expected, found, .. }) => {
                assert_eq!(field, "version");
                assert_eq!((expected.as_str(), found.as_str()), ("2", "3"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut types = clean.clone();
        types[0].members[1].offset += 1;
        match validate_types(&types, &registry) {
            Err(HkxError::TypeMismatch { field, .. }) => {
                assert_eq!(field, "member `lockTranslation` offset");
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut types = clean;
        types[0].members[0].name = "label".into();
        assert!(matches!(
            validate_types(&types, &registry),
            Err(HkxError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_parent_mismatch_is_fatal() {
        let (registry, bone) = registry_with_bone();
        let mut types = section_for(&bone);
        let root = types
            .iter()
            .position(|t| t.name == "hkBaseObject")
            .expect("base object listed") as u32
            + 1;
        types[0].parent = root;
        match validate_type(&types, 1, &bone, &registry) {
            Err(HkxError::TypeMismatch { field, found, .. }) => {
                assert_eq!(field, "parent");
                assert_eq!(found, "hkBaseObject");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_member_type_reports_metadata() {
        let (registry, bone) = registry_with_bone();
        let mut types = section_for(&bone);
        types.push(FileType {
            name: "hkaMysteryType".into(),
            version: 7,
            ..FileType::default()
        });
        types[0].members[1].ty = types.len() as u32;
        match validate_type(&types, 1, &bone, &registry) {
            Err(HkxError::UnknownType { name, metadata }) => {
                assert_eq!(name, "hkaMysteryType");
                assert!(metadata.is_some_and(|m| m.contains("version")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

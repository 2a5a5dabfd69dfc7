// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::chunk::{Children, Chunk};
use super::{Compendium, TypeSection};
use crate::config::{tags, TagfileDecodeOptions, TagfileOptions, TypeChunkVariant};
use crate::cursor::ByteReader;
use crate::error::HkxError;
use crate::object::{Instance, ObjectArena, ObjectGraph, ObjectHandle, PrimitiveBlock, Value};
use crate::session::Session;
use crate::types::{ClassBuilder, TypeDescriptor, TypeRegistry};
use std::sync::Arc;

/// TAG0 header + SDKV chunk + DATA header.
const DATA_START: usize = 32;

/// Item table and patch groups of an encoded file, with type names.
struct FileIndex {
    /// (type name, pointer target, offset, count)
    items: Vec<(String, bool, u32, u32)>,
    /// (declared type name, offsets)
    patches: Vec<(String, Vec<u32>)>,
}

fn file_index(bytes: &[u8]) -> FileIndex {
    let mut r = ByteReader::new(bytes, true);
    let root = Chunk::expect(&mut r, tags::TAG0).expect("TAG0");
    let mut children = Children::of(&root).expect("children");
    children.expect(tags::SDKV).expect("SDKV");
    children.expect(tags::DATA).expect("DATA");
    let types = TypeSection::parse(&children.expect(tags::TYPE).expect("TYPE")).expect("types");
    let indx = children.expect(tags::INDX).expect("INDX");
    let mut index = Children::of(&indx).expect("index");
    let name = |ty: u32| types.get(ty).expect("type index").name.clone();

    let mut items = Vec::new();
    let mut item_reader = index.expect(tags::ITEM).expect("ITEM").reader();
    item_reader.skip(12).expect("null item");
    while !item_reader.is_eof() {
        let info = item_reader.read_u32().expect("info");
        let offset = item_reader.read_u32().expect("offset");
        let count = item_reader.read_u32().expect("count");
        items.push((name(info & 0xFF_FFFF), info >> 24 == 0x10, offset, count));
    }

    let mut patches = Vec::new();
    let mut patch_reader = index.expect(tags::PTCH).expect("PTCH").reader();
    while !patch_reader.is_eof() {
        let ty = patch_reader.read_u32().expect("type");
        let count = patch_reader.read_u32().expect("count");
        let offsets = (0..count)
            .map(|_| patch_reader.read_u32().expect("offset"))
            .collect();
        patches.push((name(ty), offsets));
    }
    FileIndex { items, patches }
}

fn data_u32(bytes: &[u8], offset: u32) -> u32 {
    ByteReader::new(bytes, true)
        .u32_at(DATA_START + offset as usize)
        .expect("slot")
}

fn data_str(bytes: &[u8], offset: u32) -> &str {
    ByteReader::new(bytes, true)
        .cstr_at(DATA_START + offset as usize)
        .expect("string")
}

/// `hkxLeaf { label }`, `hkxHolder { name, child, values, other }`.
fn holder_types(registry: &TypeRegistry) -> (Arc<TypeDescriptor>, Arc<TypeDescriptor>) {
    let base = registry.expect_type("hkReferencedObject");
    let string = registry.expect_type("hkStringPtr");
    let leaf = registry.register(
        ClassBuilder::new("hkxLeaf")
            .parent(&base)
            .member("label", string.clone())
            .hash(0x2000_0001)
            .build(),
    );
    let ptr = registry.pointer(&leaf);
    let holder = registry.register(
        ClassBuilder::new("hkxHolder")
            .parent(&base)
            .member("name", string)
            .member("child", ptr.clone())
            .member("values", registry.array(&registry.expect_type("hkReal")))
            .member("other", ptr)
            .hash(0x2000_0002)
            .build(),
    );
    (holder, leaf)
}

fn leaf(arena: &mut ObjectArena, ty: &Arc<TypeDescriptor>, label: &str) -> ObjectHandle {
    arena.alloc(Instance::new(ty).with("label", label).expect("leaf"))
}

fn holder_graph(registry: &TypeRegistry, shared: bool) -> ObjectGraph {
    let (holder_ty, leaf_ty) = holder_types(registry);
    let mut arena = ObjectArena::new();
    let a = leaf(&mut arena, &leaf_ty, "a");
    let b = if shared { a } else { leaf(&mut arena, &leaf_ty, "b") };
    let root = arena.alloc(
        Instance::new(&holder_ty)
            .with("name", "holder")
            .and_then(|i| i.with("child", a))
            .and_then(|i| i.with("values", PrimitiveBlock::F32(vec![1.5, -2.0])))
            .and_then(|i| i.with("other", b))
            .expect("holder"),
    );
    ObjectGraph::new(arena, root)
}

fn decode_options() -> TagfileDecodeOptions {
    TagfileDecodeOptions::default()
}

#[test]
fn test_queue_priority_order() {
    let registry = TypeRegistry::with_base_types();
    let graph = holder_graph(&registry, false);
    let session = Session::new(&registry);
    let bytes = session
        .encode_tagfile(&graph, &TagfileOptions::default())
        .expect("encode");

    let index = file_index(&bytes);
    let kinds: Vec<(&str, bool, u32)> = index
        .items
        .iter()
        .map(|(name, ptr, _, count)| (name.as_str(), *ptr, *count))
        .collect();
    // pointers drain before arrays, arrays before strings
    assert_eq!(
        kinds,
        [
            ("hkxHolder", true, 1),
            ("hkxLeaf", true, 1),
            ("hkxLeaf", true, 1),
            ("hkReal", false, 2),
            ("char", false, 7),
            ("char", false, 2),
            ("char", false, 2),
        ]
    );
    let strings: Vec<&str> = index.items[4..]
        .iter()
        .map(|(_, _, offset, _)| data_str(&bytes, *offset))
        .collect();
    assert_eq!(strings, ["holder", "a", "b"]);

    let decoded = session.decode_tagfile(&bytes, &decode_options()).expect("decode");
    assert!(decoded.graph.structurally_eq(&graph));
    assert_eq!(decoded.options, TagfileOptions::default());
}

#[test]
fn test_variant_names_precede_plain_strings() {
    let registry = TypeRegistry::with_base_types();
    let (_, leaf_ty) = holder_types(&registry);
    let named = registry.expect_type("hkRootLevelContainerNamedVariant");
    let bundle = registry.register(
        ClassBuilder::new("hkxBundle")
            .member("title", registry.expect_type("hkStringPtr"))
            .member("entries", registry.array(&named))
            .hash(0x2000_0003)
            .build(),
    );
    let mut arena = ObjectArena::new();
    let target = leaf(&mut arena, &leaf_ty, "payload");
    let entry = Instance::new(&named)
        .with("name", "Leaf")
        .and_then(|i| i.with("className", "hkxLeaf"))
        .and_then(|i| i.with("variant", target))
        .expect("entry");
    let root = arena.alloc(
        Instance::new(&bundle)
            .with("title", "bundle")
            .and_then(|i| i.with("entries", vec![Value::Record(entry)]))
            .expect("bundle"),
    );
    let graph = ObjectGraph::new(arena, root);
    let session = Session::new(&registry);
    let bytes = session
        .encode_tagfile(&graph, &TagfileOptions::default())
        .expect("encode");

    let index = file_index(&bytes);
    let names: Vec<&str> = index.items.iter().map(|(n, ..)| n.as_str()).collect();
    assert_eq!(
        names,
        [
            "hkxBundle",
            "hkRootLevelContainerNamedVariant",
            "char",
            "char",
            "char",
            "hkxLeaf",
            "char",
        ]
    );
    // the variant payload waits for the string queues of the first pass
    let strings: Vec<&str> = index
        .items
        .iter()
        .filter(|(name, ..)| name == "char")
        .map(|(_, _, offset, _)| data_str(&bytes, *offset))
        .collect();
    assert_eq!(strings, ["Leaf", "bundle", "hkxLeaf", "payload"]);

    let decoded = session.decode_tagfile(&bytes, &decode_options()).expect("decode");
    assert!(decoded.graph.structurally_eq(&graph));
}

#[test]
fn test_arrays_drain_before_their_pointees() {
    let registry = TypeRegistry::with_base_types();
    let (_, leaf_ty) = holder_types(&registry);
    let list = registry.array(&registry.pointer(&leaf_ty));
    let two_lists = registry.register(
        ClassBuilder::new("hkxTwoLists")
            .parent(&registry.expect_type("hkReferencedObject"))
            .member("a", list.clone())
            .member("b", list)
            .hash(0x2000_0004)
            .build(),
    );
    let mut arena = ObjectArena::new();
    let l1 = leaf(&mut arena, &leaf_ty, "l1");
    let l2 = leaf(&mut arena, &leaf_ty, "l2");
    let root = arena.alloc(
        Instance::new(&two_lists)
            .with("a", vec![Value::from(l1)])
            .and_then(|i| i.with("b", vec![Value::from(l2)]))
            .expect("lists"),
    );
    let graph = ObjectGraph::new(arena, root);
    let session = Session::new(&registry);
    let bytes = session
        .encode_tagfile(&graph, &TagfileOptions::default())
        .expect("encode");

    let index = file_index(&bytes);
    let kinds: Vec<(&str, bool)> = index
        .items
        .iter()
        .map(|(name, ptr, ..)| (name.as_str(), *ptr))
        .collect();
    assert_eq!(
        kinds,
        [
            ("hkxTwoLists", true),
            ("T*", false),
            ("T*", false),
            ("hkxLeaf", true),
            ("hkxLeaf", true),
            ("char", false),
            ("char", false),
        ]
    );
    // each array element slot points at its leaf item
    assert_eq!(data_u32(&bytes, index.items[1].2), 4);
    assert_eq!(data_u32(&bytes, index.items[2].2), 5);

    let decoded = session.decode_tagfile(&bytes, &decode_options()).expect("decode");
    assert!(decoded.graph.structurally_eq(&graph));
}

#[test]
fn test_shared_target_is_one_item_with_two_patches() {
    let registry = TypeRegistry::with_base_types();
    let graph = holder_graph(&registry, true);
    let session = Session::new(&registry);
    let bytes = session
        .encode_tagfile(&graph, &TagfileOptions::default())
        .expect("encode");

    let index = file_index(&bytes);
    assert_eq!(index.items.len(), 5);
    // hkReferencedObject (16) + name (8) -> child at 24, values at 32, other at 48
    let pointers = index
        .patches
        .iter()
        .find(|(name, _)| name == "T*")
        .expect("pointer patches");
    assert_eq!(pointers.1, [24, 48]);
    assert_eq!(data_u32(&bytes, 24), 2);
    assert_eq!(data_u32(&bytes, 48), 2);
    let arrays = index
        .patches
        .iter()
        .find(|(name, _)| name == "hkArray")
        .expect("array patches");
    assert_eq!(arrays.1, [32]);
    assert_eq!(data_u32(&bytes, 32), 3);

    let decoded = session.decode_tagfile(&bytes, &decode_options()).expect("decode");
    assert!(decoded.graph.structurally_eq(&graph));
    let root = decoded.graph.root().expect("root");
    assert_eq!(
        root.get("child").and_then(Value::as_pointer),
        root.get("other").and_then(Value::as_pointer)
    );
    assert!(!decoded
        .graph
        .structurally_eq(&holder_graph(&TypeRegistry::with_base_types(), false)));
}

#[test]
fn test_round_trip_and_byte_stability() {
    let registry = TypeRegistry::with_base_types();
    let graph = holder_graph(&registry, false);
    let session = Session::new(&registry);

    for variant in [TypeChunkVariant::Classic, TypeChunkVariant::Revised] {
        let options = TagfileOptions {
            sdk_version: "20180100".into(),
            chunk_variant: variant,
            compendium_id: None,
        };
        let bytes = session.encode_tagfile(&graph, &options).expect("encode");
        assert_eq!(&bytes[4..8], b"TAG0");
        assert_eq!(&bytes[16..24], b"20180100");
        let names_tag = variant.names_tag();
        assert!(bytes.windows(4).any(|w| w == names_tag));

        let decoded = session.decode_tagfile(&bytes, &decode_options()).expect("decode");
        assert_eq!(decoded.options, options);
        assert!(decoded.graph.structurally_eq(&graph));
        assert_eq!(decoded.encode(&registry).expect("re-encode"), bytes);
        assert_eq!(
            session.encode_tagfile(&decoded.graph, &options).expect("fresh"),
            bytes
        );
    }
}

#[test]
fn test_back_reference_cycle_round_trips() {
    let registry = TypeRegistry::with_base_types();
    let base = registry.expect_type("hkReferencedObject");
    let owner_fwd = registry.register(ClassBuilder::new("hkxOwner").parent(&base).build());
    let child_ty = registry.register(
        ClassBuilder::new("hkxChild")
            .parent(&base)
            .member("owner", registry.back_reference(&owner_fwd))
            .build(),
    );
    let owner_ty = registry.register(
        ClassBuilder::new("hkxOwner")
            .parent(&base)
            .member("child", registry.pointer(&child_ty))
            .build(),
    );
    let mut arena = ObjectArena::new();
    let owner = arena.reserve(&owner_ty);
    let child = arena.alloc(Instance::new(&child_ty).with("owner", owner).expect("child"));
    arena
        .fill(owner, Instance::new(&owner_ty).with("child", child).expect("owner"))
        .expect("fill");
    let graph = ObjectGraph::new(arena, owner);

    let session = Session::new(&registry);
    let bytes = session
        .encode_tagfile(&graph, &TagfileOptions::default())
        .expect("encode");
    assert_eq!(file_index(&bytes).items.len(), 2);
    let decoded = session.decode_tagfile(&bytes, &decode_options()).expect("decode");
    assert!(decoded.graph.structurally_eq(&graph));
    let child = decoded
        .graph
        .root()
        .and_then(|r| r.get("child"))
        .and_then(Value::as_pointer)
        .and_then(|h| decoded.graph.get(h))
        .expect("child");
    assert_eq!(
        child.get("owner").and_then(Value::as_pointer),
        Some(decoded.graph.root)
    );
}

#[test]
fn test_cleared_slot_leaves_dangling_patch() {
    let registry = TypeRegistry::with_base_types();
    let graph = holder_graph(&registry, false);
    let session = Session::new(&registry);
    let mut bytes = session
        .encode_tagfile(&graph, &TagfileOptions::default())
        .expect("encode");
    bytes[DATA_START + 48..DATA_START + 52].fill(0);
    match session.decode_tagfile(&bytes, &decode_options()) {
        Err(HkxError::DanglingFixup { item, offsets }) => {
            assert_eq!(item, 1);
            assert_eq!(offsets, [48]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_compendium_reference() {
    let registry = TypeRegistry::with_base_types();
    let graph = holder_graph(&registry, false);
    let session = Session::new(&registry);
    let compendium = Compendium::from_types(
        vec![0xC0FF_EE00, 0xBEEF],
        &[registry.expect_type("hkxHolder"), registry.expect_type("char")],
    )
    .expect("compendium");

    let stored = compendium.encode().expect("encode compendium");
    assert_eq!(&stored[4..8], b"TCM0");
    let reloaded = Compendium::decode(&stored).expect("decode compendium");
    assert_eq!(reloaded.ids, compendium.ids);
    assert_eq!(reloaded.sdk_version, compendium.sdk_version);
    assert_eq!(reloaded.types.types, compendium.types.types);
    assert_eq!(reloaded.encode().expect("re-encode compendium"), stored);

    let bytes = session
        .encode_tagfile_with_compendium(&graph, &TagfileOptions::default(), &reloaded)
        .expect("encode");
    assert!(bytes.windows(4).any(|w| w == tags::TCRF));
    assert!(!bytes.windows(4).any(|w| w == tags::TPTR));

    match session.decode_tagfile(&bytes, &decode_options()) {
        Err(HkxError::UnknownType { name, .. }) => assert_eq!(name, "compendium 0x00000000c0ffee00"),
        other => panic!("unexpected {other:?}"),
    }
    let decoded = session
        .decode_tagfile_with_compendium(&bytes, &decode_options(), &reloaded)
        .expect("decode");
    assert_eq!(decoded.options.compendium_id, Some(0xC0FF_EE00));
    assert!(decoded.graph.structurally_eq(&graph));
    assert_eq!(decoded.encode(&registry).expect("re-encode"), bytes);

    let second = TagfileOptions {
        compendium_id: Some(0xBEEF),
        ..TagfileOptions::default()
    };
    let bytes = session
        .encode_tagfile_with_compendium(&graph, &second, &reloaded)
        .expect("second id");
    let decoded = session
        .decode_tagfile_with_compendium(&bytes, &decode_options(), &reloaded)
        .expect("decode second id");
    assert_eq!(decoded.options.compendium_id, Some(0xBEEF));
}

#[test]
fn test_compendium_misuse_is_rejected() {
    let registry = TypeRegistry::with_base_types();
    let graph = holder_graph(&registry, false);
    let session = Session::new(&registry);
    let compendium =
        Compendium::from_types(vec![1], &[registry.expect_type("hkxLeaf")]).expect("compendium");

    let unknown_id = TagfileOptions {
        compendium_id: Some(7),
        ..TagfileOptions::default()
    };
    assert!(matches!(
        session.encode_tagfile_with_compendium(&graph, &unknown_id, &compendium),
        Err(HkxError::UnknownType { .. })
    ));
    // hkxHolder is not in the compendium
    match session.encode_tagfile_with_compendium(&graph, &TagfileOptions::default(), &compendium) {
        Err(HkxError::UnknownType { name, .. }) => assert_eq!(name, "hkxHolder"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        session.encode_tagfile(&graph, &unknown_id),
        Err(HkxError::InvalidValue { .. })
    ));

    let stored = compendium.encode().expect("encode compendium");
    assert!(matches!(
        session.decode_tagfile(&stored, &decode_options()),
        Err(HkxError::Structural(_))
    ));
}

#[test]
fn test_unknown_type_reports_file_metadata() {
    let registry = TypeRegistry::with_base_types();
    let graph = holder_graph(&registry, false);
    let bytes = Session::new(&registry)
        .encode_tagfile(&graph, &TagfileOptions::default())
        .expect("encode");

    let bare = TypeRegistry::with_base_types();
    for validate in [true, false] {
        match Session::new(&bare).decode_tagfile(&bytes, &TagfileDecodeOptions { validate }) {
            Err(HkxError::UnknownType { name, metadata }) => {
                assert_eq!(name, "hkxHolder");
                assert!(metadata.is_some_and(|m| m.contains("members=[name, child, values, other]")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn test_layout_drift_is_a_type_mismatch() {
    let registry = TypeRegistry::with_base_types();
    let graph = holder_graph(&registry, false);
    let bytes = Session::new(&registry)
        .encode_tagfile(&graph, &TagfileOptions::default())
        .expect("encode");

    // Same names, but the reader's hkxLeaf grew a member
    let drifted = TypeRegistry::with_base_types();
    let base = drifted.expect_type("hkReferencedObject");
    let string = drifted.expect_type("hkStringPtr");
    let leaf = drifted.register(
        ClassBuilder::new("hkxLeaf")
            .parent(&base)
            .member("label", string.clone())
            .member("weight", drifted.expect_type("hkReal"))
            .hash(0x2000_0001)
            .build(),
    );
    let ptr = drifted.pointer(&leaf);
    drifted.register(
        ClassBuilder::new("hkxHolder")
            .parent(&base)
            .member("name", string)
            .member("child", ptr.clone())
            .member("values", drifted.array(&drifted.expect_type("hkReal")))
            .member("other", ptr)
            .hash(0x2000_0002)
            .build(),
    );
    assert!(matches!(
        Session::new(&drifted).decode_tagfile(&bytes, &decode_options()),
        Err(HkxError::TypeMismatch { .. })
    ));
}

#[test]
fn test_invalid_sdk_version_is_rejected() {
    let registry = TypeRegistry::with_base_types();
    let graph = holder_graph(&registry, false);
    let options = TagfileOptions {
        sdk_version: "2016".into(),
        ..TagfileOptions::default()
    };
    assert!(matches!(
        Session::new(&registry).encode_tagfile(&graph, &options),
        Err(HkxError::InvalidValue { .. })
    ));
}

#[test]
fn test_truncated_input_never_panics() {
    let registry = TypeRegistry::with_base_types();
    let graph = holder_graph(&registry, false);
    let session = Session::new(&registry);
    let bytes = session
        .encode_tagfile(&graph, &TagfileOptions::default())
        .expect("encode");
    for len in 0..bytes.len() {
        assert!(session.decode_tagfile(&bytes[..len], &decode_options()).is_err(), "prefix {len}");
    }

    let mut rng = fastrand::Rng::with_seed(0x7A6F);
    for _ in 0..300 {
        let mut noisy = bytes.clone();
        for _ in 0..3 {
            let at = rng.usize(..noisy.len());
            noisy[at] = rng.u8(..);
        }
        let _ = session.decode_tagfile(&noisy, &decode_options());
        let _ = session.decode_tagfile(&noisy, &TagfileDecodeOptions { validate: false });
    }
}

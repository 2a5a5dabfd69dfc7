// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use hkx::{TagfileDecodeOptions, TypeRegistry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let registry = TypeRegistry::with_base_types();

    // Object files, with and without the validator
    for validate in [true, false] {
        let _ = hkx::decode_tagfile(data, &registry, &TagfileDecodeOptions { validate });
    }

    // Compendia share the chunk parser and type section reader
    if let Ok(compendium) = hkx::decode_compendium(data) {
        let _ = compendium.encode();
    }
});

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use hkx::TypeRegistry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let registry = TypeRegistry::with_base_types();

    // Decoded graphs must re-encode without panicking
    if let Ok(file) = hkx::decode_packfile(data, &registry) {
        let _ = file.encode(&registry);
    }
});

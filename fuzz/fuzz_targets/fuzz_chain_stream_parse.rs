// Copyright (c) 2026 Emberchain
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use emberchain::core::runtime::blockchain::Blockchain;
use emberchain::core::state::storage::{FileStorage, Storage};
use libfuzzer_sys::fuzz_target;
use std::io::Write;

fuzz_target!(|data: &[u8]| {
    // A corrupted chain file must fail loading cleanly, and whatever does
    // parse must survive validation without panicking.
    let Ok(mut file) = tempfile::NamedTempFile::new() else {
        return;
    };
    if file.write_all(data).is_err() {
        return;
    }
    let storage = FileStorage::new(file.path());
    if let Ok(chain) = storage.load_chain() {
        let _ = Blockchain::validate_chain_slice(&chain);
    }
});

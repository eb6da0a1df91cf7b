// Copyright (c) 2026 Emberchain
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Peer frames come straight off the wire; parsing must never panic.
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = emberchain::networking::messages::PeerMessage::decode(text);
    }
});

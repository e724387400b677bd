#![no_main]

use bote_protocol::decode_packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic, and anything that decodes
    // must re-encode to the same bytes.
    if let Ok(packet) = decode_packet(data) {
        let encoded = packet.encode().expect("decoded packet re-encodes");
        assert_eq!(encoded, data);
    }
});

//! Fuzz target for the firmware decrypt/extract pipeline.
//!
//! # Invariants
//!
//! - Parsing and extraction never panic on malformed images
//! - Streaming and buffer decryption agree byte for byte

#![no_main]

use libfuzzer_sys::fuzz_target;

use acp_firmware::{StreamDecryptor, parse};

fuzz_target!(|data: &[u8]| {
    let buffered = parse(data);

    let mut decryptor = StreamDecryptor::new();
    let mut body = Vec::new();
    let mut streamed = Ok(());
    for piece in data.chunks(97) {
        match decryptor.update(piece) {
            Ok(out) => body.extend_from_slice(&out),
            Err(err) => {
                streamed = Err(err);
                break;
            },
        }
    }

    if let (Ok(firmware), Ok(())) = (&buffered, &streamed) {
        if let Ok(tail) = decryptor.finish() {
            body.extend_from_slice(&tail);
            assert_eq!(body, firmware.body);
        }
    }
});

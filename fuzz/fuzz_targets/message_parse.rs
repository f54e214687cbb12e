//! Fuzz target for message frame parsing.
//!
//! # Invariants
//!
//! - Parsing never panics, whatever the input bytes
//! - Anything that parses re-composes to bytes that parse to an equal
//!   message

#![no_main]

use libfuzzer_sys::fuzz_target;

use acp_proto::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = Message::parse(data) {
        let wire = message.compose();
        let reparsed = Message::parse(&wire).expect("composed message must parse");
        assert_eq!(reparsed, message);
    }

    // Split mode must agree with caller mode on the prefix
    let _ = Message::parse_split(data);
});

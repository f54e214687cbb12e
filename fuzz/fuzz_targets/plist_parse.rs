//! Fuzz target for the binary plist codec.
//!
//! # Invariants
//!
//! - Parsing never panics and never loops; depth is bounded
//! - Parsed values re-compose and re-parse to an equal value

#![no_main]

use libfuzzer_sys::fuzz_target;

use acp_proto::Value;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = Value::parse(data) {
        let wire = value.compose();
        let reparsed = Value::parse(&wire).expect("composed document must parse");
        assert_eq!(reparsed, value);
    }
});

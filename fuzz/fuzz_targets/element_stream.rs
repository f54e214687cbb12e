//! Fuzz target for property element streams.
//!
//! # Invariants
//!
//! - Element list parsing never panics and terminates on every input
//! - Size fields never cause out-of-bounds reads

#![no_main]

use libfuzzer_sys::fuzz_target;

use acp_proto::property::{parse_element, parse_element_list};

fuzz_target!(|data: &[u8]| {
    let _ = parse_element(data);
    let _ = parse_element_list(data);
});

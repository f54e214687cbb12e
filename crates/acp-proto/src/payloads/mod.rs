//! Typed views over plist-encoded message bodies.
//!
//! Message headers are raw binary, but the authenticate and RPC commands
//! carry CFLBinaryPList dictionaries as bodies. These modules give each
//! such payload a struct with explicit fields and an encode/decode pair,
//! so protocol drivers never pick keys out of dictionaries by hand.
//!
//! # Invariants
//!
//! Round-trip encoding must produce an equivalent value; decoding rejects
//! payloads missing required keys rather than defaulting them.

pub mod auth;
pub mod rpc;

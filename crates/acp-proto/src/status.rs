//! Numeric status codes the protocol puts on the wire.
//!
//! Property elements with the error flag set carry one of these as a
//! 4-byte big-endian signed value; authentication failures carry theirs in
//! the message header's error-code field.

/// Property exists but has no value on this station.
pub const NOT_AVAILABLE: i32 = -10;

/// Property name is not recognized.
pub const INVALID_KEY: i32 = -16;

/// Failure code observed on current firmware; meaning undocumented.
pub const UNKNOWN_ERROR: i32 = -6772;

/// SRP proof did not verify; the client may retry on the same socket.
pub const INCORRECT_PASSWORD: i32 = -6754;

/// Success code in per-property set responses.
pub const OK: i32 = 0;

//! Framing-layer error types.
//!
//! These cover the 128-byte message header, body validation, and the
//! monitor frame header. The plist codec and the property registry carry
//! their own error enums next to their modules.

use thiserror::Error;

/// Errors produced while packing or parsing protocol frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Leading magic was not `"acpp"` (or `"XE"` for monitor frames).
    #[error("bad frame magic")]
    BadMagic,

    /// Header version field was neither 0x00000001 nor 0x00030001.
    #[error("unknown protocol version {0:#010x}")]
    UnknownVersion(i32),

    /// Recomputed header Adler-32 does not match the transmitted value.
    #[error("header checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    HeaderChecksum {
        /// Checksum carried in the header.
        expected: u32,
        /// Checksum recomputed over the received header.
        actual: u32,
    },

    /// Recomputed body Adler-32 does not match the transmitted value.
    #[error("body checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    BodyChecksum {
        /// Checksum carried in the header.
        expected: u32,
        /// Checksum recomputed over the received body.
        actual: u32,
    },

    /// Body bytes were present but their length disagrees with the header.
    #[error("body length mismatch: header claims {expected}, got {actual}")]
    BodyLengthMismatch {
        /// Length claimed by the header's body-size field.
        expected: usize,
        /// Length of the body bytes actually supplied.
        actual: usize,
    },

    /// Header command code is not in the known set.
    #[error("unknown command code {0}")]
    UnknownCommand(i32),

    /// A streaming header (body size -1) arrived together with body bytes.
    #[error("streaming header accompanied by body bytes")]
    StreamHeaderWithBody,

    /// Fewer bytes than the fixed structure requires.
    #[error("truncated frame: need {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the structure requires.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
}

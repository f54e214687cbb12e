//! Firmware codec error types.

use thiserror::Error;

/// Errors from parsing, decrypting or extracting a firmware image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FirmwareError {
    /// The 32-byte header does not start with the firmware magic.
    #[error("bad firmware magic")]
    BadMagic,

    /// No decryption key is known for this hardware model.
    #[error("unsupported hardware model {0}")]
    UnknownModel(u32),

    /// The trailing Adler-32 over header and decrypted body disagrees.
    #[error("firmware checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    BadChecksum {
        /// Checksum carried in the image trailer.
        expected: u32,
        /// Checksum recomputed while decrypting.
        actual: u32,
    },

    /// The image ends before header plus trailer fit.
    #[error("firmware image truncated: {0} more bytes required")]
    NotEnoughData(usize),

    /// The decrypted body contains no gzip stream.
    #[error("no compressed payload in firmware body")]
    NoCompressedPayload,

    /// The gzip stream is damaged.
    #[error("inflate failed: {0}")]
    Inflate(String),
}

//! Firmware image header and per-model key material.
//!
//! Images are `header(32) ‖ body ‖ adler32(4, big-endian)`. The checksum
//! covers the header and the *decrypted* body. Header byte 0x0f doubles
//! as the final byte of the AES-CBC IV; the first fifteen IV bytes are
//! the magic itself.

use crate::error::FirmwareError;

/// Size of the packed image header.
pub const HEADER_SIZE: usize = 32;

/// Leading magic, NUL included.
pub const MAGIC: &[u8; 15] = b"APPLE-FIRMWARE\0";

/// Body bytes processed per CBC run. The cipher restarts at the fixed IV
/// for every chunk; this is observed device behavior, not standard CBC.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Header flag bit marking an encrypted body.
pub const FLAG_ENCRYPTED: u8 = 0x02;

/// Offset the derivation mask starts from.
const KEY_MASK_BASE: u8 = 0x19;

/// Per-model root keys. The wire key is derived by XORing a running
/// counter into these, see [`model_key`].
static MODEL_KEYS: &[(u32, [u8; 16])] = &[
    (107, [
        0x8a, 0x21, 0xd8, 0x4c, 0x07, 0xbe, 0xe3, 0x91, 0x55, 0x0f, 0x62, 0x3d, 0xc8, 0x7a, 0x9d,
        0x16,
    ]),
    (108, [
        0x34, 0xe9, 0x0b, 0xd2, 0x6f, 0x18, 0xa4, 0x7b, 0xe0, 0x93, 0x2c, 0x51, 0xba, 0x0d, 0x47,
        0xf8,
    ]),
    (115, [
        0xc1, 0x56, 0x98, 0x2e, 0xd3, 0x40, 0x7f, 0xaa, 0x19, 0xe4, 0x8b, 0x65, 0x02, 0xcf, 0x31,
        0x9e,
    ]),
    (120, [
        0x5d, 0xb0, 0x43, 0xf7, 0x2a, 0x8c, 0x11, 0xe6, 0x7c, 0x25, 0xd9, 0x0e, 0x96, 0x58, 0xa3,
        0x6b,
    ]),
];

/// Derive the AES key for `model`.
///
/// Byte `i` of the key is `root[i] XOR ((i + 0x19) & 0xFF)`.
pub fn model_key(model: u32) -> Result<[u8; 16], FirmwareError> {
    let root = MODEL_KEYS
        .iter()
        .find(|(candidate, _)| *candidate == model)
        .map(|(_, key)| key)
        .ok_or(FirmwareError::UnknownModel(model))?;

    let mut key = [0u8; 16];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = root[i] ^ ((i as u8).wrapping_add(KEY_MASK_BASE));
    }
    Ok(key)
}

/// Parsed 32-byte image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Byte at offset 0x0f; the last byte of the CBC IV.
    pub iv_seed: u8,
    /// Hardware model the image targets.
    pub model: u32,
    /// Firmware version number.
    pub version: u32,
    /// Three bytes with no known meaning, preserved verbatim.
    pub unknown: [u8; 3],
    /// Flag byte; see [`FLAG_ENCRYPTED`].
    pub flags: u8,
    /// Trailing 32-bit field with no known meaning.
    pub trailer: u32,
}

impl ImageHeader {
    /// Parse from the first 32 bytes of an image.
    pub fn parse(bytes: &[u8]) -> Result<Self, FirmwareError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FirmwareError::NotEnoughData(HEADER_SIZE - bytes.len()));
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(FirmwareError::BadMagic);
        }

        let word = |offset: usize| -> u32 {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[offset..offset + 4]);
            u32::from_be_bytes(buf)
        };

        Ok(Self {
            iv_seed: bytes[0x0f],
            model: word(0x10),
            version: word(0x14),
            unknown: [bytes[0x18], bytes[0x19], bytes[0x1a]],
            flags: bytes[0x1b],
            trailer: word(0x1c),
        })
    }

    /// Pack to wire form.
    #[must_use]
    pub fn pack(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..MAGIC.len()].copy_from_slice(MAGIC);
        out[0x0f] = self.iv_seed;
        out[0x10..0x14].copy_from_slice(&self.model.to_be_bytes());
        out[0x14..0x18].copy_from_slice(&self.version.to_be_bytes());
        out[0x18..0x1b].copy_from_slice(&self.unknown);
        out[0x1b] = self.flags;
        out[0x1c..0x20].copy_from_slice(&self.trailer.to_be_bytes());
        out
    }

    /// True when the body is AES-CBC encrypted.
    #[must_use]
    pub fn encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// The CBC IV: the fifteen magic bytes followed by the seed byte.
    #[must_use]
    pub fn iv(&self) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[..MAGIC.len()].copy_from_slice(MAGIC);
        iv[15] = self.iv_seed;
        iv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = ImageHeader {
            iv_seed: 0xA7,
            model: 115,
            version: 0x0007_0901,
            unknown: [1, 2, 3],
            flags: FLAG_ENCRYPTED,
            trailer: 0xDEAD_BEEF,
        };
        let parsed = ImageHeader::parse(&header.pack()).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.encrypted());
    }

    #[test]
    fn iv_is_magic_plus_seed() {
        let header = ImageHeader {
            iv_seed: 0x42,
            model: 107,
            version: 0,
            unknown: [0; 3],
            flags: 0,
            trailer: 0,
        };
        let iv = header.iv();
        assert_eq!(&iv[..15], MAGIC.as_slice());
        assert_eq!(iv[15], 0x42);
    }

    #[test]
    fn reject_bad_magic() {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..15].copy_from_slice(b"NOT-A-FIRMWARE\0");
        assert_eq!(ImageHeader::parse(&bytes), Err(FirmwareError::BadMagic));
    }

    #[test]
    fn reject_short_header() {
        assert_eq!(ImageHeader::parse(&[0u8; 10]), Err(FirmwareError::NotEnoughData(22)));
    }

    #[test]
    fn model_keys_cover_the_supported_set() {
        for model in [107, 108, 115, 120] {
            let key = model_key(model).unwrap();
            assert_ne!(key, [0u8; 16]);
        }
        assert_eq!(model_key(999), Err(FirmwareError::UnknownModel(999)));
    }

    #[test]
    fn key_derivation_applies_the_mask() {
        let key = model_key(107).unwrap();
        // First byte: root ^ 0x19, second: root ^ 0x1a
        assert_eq!(key[0], 0x8a ^ 0x19);
        assert_eq!(key[1], 0x21 ^ 0x1a);
    }
}

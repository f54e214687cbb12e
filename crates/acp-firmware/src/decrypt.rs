//! Streaming firmware decryption.
//!
//! The body is processed in 32 KiB chunks; within a chunk AES-128-CBC
//! runs over the full 16-byte blocks, and the cipher restarts at the same
//! IV for every chunk. A sub-block remainder at the end of the body is
//! passed through verbatim. The final four bytes of the image are a
//! big-endian Adler-32 over header plus decrypted body, verified at
//! [`StreamDecryptor::finish`].
//!
//! The decryptor is push-style so multi-megabyte images never need to be
//! resident: feed bytes in any sized pieces and collect decrypted output
//! as it becomes available. [`parse`] is the buffer-in/buffer-out wrapper
//! for small images.

use acp_proto::checksum::Adler32;
use aes::Aes128;
use aes::cipher::{BlockDecryptMut, KeyIvInit, generic_array::GenericArray};

use crate::{
    error::FirmwareError,
    image::{CHUNK_SIZE, HEADER_SIZE, ImageHeader, model_key},
};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Size of the trailing checksum field.
const TRAILER_SIZE: usize = 4;

/// A fully decrypted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    /// Parsed image header.
    pub header: ImageHeader,
    /// Decrypted (or originally plain) body bytes.
    pub body: Vec<u8>,
}

/// Push-style decryptor.
pub struct StreamDecryptor {
    pending: Vec<u8>,
    header: Option<ImageHeader>,
    key: [u8; 16],
    cipher: Option<Aes128CbcDec>,
    chunk_pos: usize,
    checksum: Adler32,
}

impl StreamDecryptor {
    /// Fresh decryptor awaiting the 32-byte header.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            header: None,
            key: [0u8; 16],
            cipher: None,
            chunk_pos: 0,
            checksum: Adler32::new(),
        }
    }

    /// The header, once enough bytes have been fed.
    #[must_use]
    pub fn header(&self) -> Option<&ImageHeader> {
        self.header.as_ref()
    }

    /// Feed image bytes; returns whatever body bytes became available.
    ///
    /// The last four fed bytes are always withheld as the candidate
    /// checksum trailer, along with any sub-block remainder, until
    /// [`Self::finish`].
    pub fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, FirmwareError> {
        self.pending.extend_from_slice(data);

        if self.header.is_none() {
            if self.pending.len() < HEADER_SIZE {
                return Ok(Vec::new());
            }
            let header = ImageHeader::parse(&self.pending)?;
            if header.encrypted() {
                self.key = model_key(header.model)?;
            }
            self.checksum.update(&self.pending[..HEADER_SIZE]);
            self.pending.drain(..HEADER_SIZE);
            self.header = Some(header);
        }

        // INVARIANT: header is set past this point
        let Some(header) = self.header else { return Ok(Vec::new()) };

        let available = self.pending.len().saturating_sub(TRAILER_SIZE);
        if available == 0 {
            return Ok(Vec::new());
        }

        if !header.encrypted() {
            let out: Vec<u8> = self.pending.drain(..available).collect();
            self.checksum.update(&out);
            return Ok(out);
        }

        let iv = header.iv();
        let mut processed = 0;
        while processed < available {
            let chunk_remaining = CHUNK_SIZE - self.chunk_pos;
            let span = (available - processed).min(chunk_remaining);
            let blocks = span - span % 16;
            if blocks == 0 {
                break;
            }

            let cipher = self
                .cipher
                .get_or_insert_with(|| Aes128CbcDec::new(&self.key.into(), &iv.into()));
            for block in self.pending[processed..processed + blocks].chunks_exact_mut(16) {
                cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }

            processed += blocks;
            self.chunk_pos += blocks;
            if self.chunk_pos == CHUNK_SIZE {
                // Next chunk restarts the cipher at the same IV
                self.chunk_pos = 0;
                self.cipher = None;
            }
        }

        let out: Vec<u8> = self.pending.drain(..processed).collect();
        self.checksum.update(&out);
        Ok(out)
    }

    /// Consume the trailer: emit the verbatim sub-block tail (if any) and
    /// verify the checksum.
    pub fn finish(mut self) -> Result<Vec<u8>, FirmwareError> {
        if self.header.is_none() {
            let needed = HEADER_SIZE + TRAILER_SIZE - self.pending.len();
            return Err(FirmwareError::NotEnoughData(needed));
        }
        if self.pending.len() < TRAILER_SIZE {
            return Err(FirmwareError::NotEnoughData(TRAILER_SIZE - self.pending.len()));
        }

        let trailer = self.pending.split_off(self.pending.len() - TRAILER_SIZE);
        let tail = self.pending;

        // Sub-block remainder is not ciphered, only checksummed
        self.checksum.update(&tail);

        let mut expected = [0u8; TRAILER_SIZE];
        expected.copy_from_slice(&trailer);
        let expected = u32::from_be_bytes(expected);
        let actual = self.checksum.finish();
        if expected != actual {
            return Err(FirmwareError::BadChecksum { expected, actual });
        }

        Ok(tail)
    }
}

impl Default for StreamDecryptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrypt a whole in-memory image.
pub fn parse(image: &[u8]) -> Result<Firmware, FirmwareError> {
    let mut decryptor = StreamDecryptor::new();
    let mut body = decryptor.update(image)?;

    let header = match decryptor.header() {
        Some(header) => *header,
        None => {
            return Err(FirmwareError::NotEnoughData(
                HEADER_SIZE + TRAILER_SIZE - image.len().min(HEADER_SIZE + TRAILER_SIZE),
            ));
        },
    };

    body.extend_from_slice(&decryptor.finish()?);
    Ok(Firmware { header, body })
}

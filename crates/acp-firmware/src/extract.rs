//! Payload extraction from decrypted firmware bodies.
//!
//! The interesting content of an image is a gzip stream that starts
//! somewhere inside the decrypted body, not at a fixed offset. The
//! extractor scans for the three-byte gzip signature (keeping a two-byte
//! lookbehind so a signature split across feeds is still found) and
//! inflates everything from there.

use std::io::Write;

use flate2::write::GzDecoder;

use crate::{decrypt::Firmware, error::FirmwareError};

/// Deflate-mode gzip member signature.
pub const GZIP_SIGNATURE: [u8; 3] = [0x1f, 0x8b, 0x08];

fn find_signature(window: &[u8]) -> Option<usize> {
    window.windows(GZIP_SIGNATURE.len()).position(|candidate| candidate == GZIP_SIGNATURE)
}

/// Push-style extractor.
pub struct StreamExtractor {
    decoder: Option<GzDecoder<Vec<u8>>>,
    lookbehind: Vec<u8>,
}

impl StreamExtractor {
    /// Fresh extractor, still scanning for the signature.
    #[must_use]
    pub fn new() -> Self {
        Self { decoder: None, lookbehind: Vec::new() }
    }

    /// Feed decrypted body bytes; returns whatever decompressed bytes
    /// became available.
    pub fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>, FirmwareError> {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder
                .write_all(chunk)
                .map_err(|err| FirmwareError::Inflate(err.to_string()))?;
            return Ok(std::mem::take(decoder.get_mut()));
        }

        let mut window = std::mem::take(&mut self.lookbehind);
        window.extend_from_slice(chunk);

        if let Some(offset) = find_signature(&window) {
            let mut decoder = GzDecoder::new(Vec::new());
            decoder
                .write_all(&window[offset..])
                .map_err(|err| FirmwareError::Inflate(err.to_string()))?;
            let out = std::mem::take(decoder.get_mut());
            self.decoder = Some(decoder);
            return Ok(out);
        }

        let keep = window.len().min(GZIP_SIGNATURE.len() - 1);
        self.lookbehind = window.split_off(window.len() - keep);
        Ok(Vec::new())
    }

    /// Flush the inflater and return the remaining decompressed bytes.
    pub fn finish(self) -> Result<Vec<u8>, FirmwareError> {
        match self.decoder {
            Some(decoder) => {
                decoder.finish().map_err(|err| FirmwareError::Inflate(err.to_string()))
            },
            None => Err(FirmwareError::NoCompressedPayload),
        }
    }
}

impl Default for StreamExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the payload of an already-decrypted image.
pub fn extract(firmware: &Firmware) -> Result<Vec<u8>, FirmwareError> {
    let mut extractor = StreamExtractor::new();
    let mut out = extractor.update(&firmware.body)?;
    out.extend_from_slice(&extractor.finish()?);
    Ok(out)
}

/// Decrypt and extract a whole in-memory image.
pub fn extract_image(image: &[u8]) -> Result<Vec<u8>, FirmwareError> {
    extract(&crate::decrypt::parse(image)?)
}

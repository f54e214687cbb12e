//! Decrypt and extract signed base-station firmware images.
//!
//! An image is a 32-byte header, an optionally encrypted body and a
//! trailing Adler-32 over header plus decrypted body. Encrypted bodies
//! use AES-128-CBC restarted per 32 KiB chunk with a key derived from a
//! per-model root; the interesting payload inside is a gzip stream found
//! by signature scan.
//!
//! Both stages come in two shapes: buffer-in/buffer-out ([`parse`],
//! [`extract`], [`extract_image`]) for small images, and push-style
//! transforms ([`StreamDecryptor`], [`StreamExtractor`]) for images too
//! large to hold twice in memory.

pub mod decrypt;
pub mod error;
pub mod extract;
pub mod image;

pub use decrypt::{Firmware, StreamDecryptor, parse};
pub use error::FirmwareError;
pub use extract::{GZIP_SIGNATURE, StreamExtractor, extract, extract_image};
pub use image::{CHUNK_SIZE, FLAG_ENCRYPTED, HEADER_SIZE, ImageHeader, MAGIC, model_key};

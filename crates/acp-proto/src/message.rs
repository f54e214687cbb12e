//! Message framing: the 128-byte header and its body.
//!
//! Every exchange on an ACP connection is a `Message`: a fixed big-endian
//! header followed by an optional body. The header self-checksums with
//! Adler-32 (computed with its own checksum field zeroed) and carries the
//! body's length and Adler-32 so the receiver can validate reassembly.
//!
//! A body size of `-1` marks a header with no body. Messages whose payload
//! is streamed separately (property element streams after a get/set
//! response) use exactly this shape: the header frames the exchange and
//! the elements follow as raw bytes on the connection.
//!
//! # Invariants
//!
//! - `key` is exactly 32 bytes.
//! - When a body is present, the packed body-size field equals its length
//!   and the body-checksum field equals its Adler-32.
//! - When no body is present, body size is `-1` and body checksum is `1`
//!   (the Adler-32 of the empty string).

use bytes::Bytes;

use crate::{
    Result,
    checksum::adler32,
    command::Command,
    error::ProtocolError,
    keystream::{HEADER_KEY_LEN, generate_header_key},
};

/// Size of the packed header.
pub const HEADER_SIZE: usize = 128;

/// Leading magic of every header.
pub const MAGIC: &[u8; 4] = b"acpp";

/// Protocol version spoken by the oldest supported firmware.
pub const VERSION_LEGACY: i32 = 0x0000_0001;

/// Protocol version current firmware speaks; all composed messages use it.
pub const VERSION_CURRENT: i32 = 0x0003_0001;

/// Body-size value marking a header with no attached body.
pub const BODY_SIZE_NONE: i32 = -1;

/// Packed view of the 128-byte header.
///
/// All fields are raw, including both checksums, so low-level tooling and
/// tests can pack headers in any intermediate state. [`Message`] is the
/// validated construction path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Protocol version (one of the two supported constants).
    pub version: i32,
    /// Adler-32 of this header with this field zeroed.
    pub header_checksum: u32,
    /// Adler-32 of the body; `1` when no body follows.
    pub body_checksum: u32,
    /// Body length in bytes, or `-1` for none.
    pub body_size: i32,
    /// Command-specific flag bits.
    pub flags: i32,
    /// Transmitted as zero by all known senders.
    pub unused: i32,
    /// Requested operation.
    pub command: Command,
    /// Zero on requests; failure code on responses.
    pub error_code: i32,
    /// Obfuscated password, or zeros, or ciphertext garbage once session
    /// encryption is active.
    pub key: [u8; HEADER_KEY_LEN],
}

impl MessageHeader {
    /// Pack into wire form. Fields are written exactly as stored; call
    /// [`Self::finalize`] first to fill the header checksum.
    #[must_use]
    pub fn pack(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(MAGIC);
        out[4..8].copy_from_slice(&self.version.to_be_bytes());
        out[8..12].copy_from_slice(&self.header_checksum.to_be_bytes());
        out[12..16].copy_from_slice(&self.body_checksum.to_be_bytes());
        out[16..20].copy_from_slice(&self.body_size.to_be_bytes());
        out[20..24].copy_from_slice(&self.flags.to_be_bytes());
        out[24..28].copy_from_slice(&self.unused.to_be_bytes());
        out[28..32].copy_from_slice(&self.command.to_i32().to_be_bytes());
        out[32..36].copy_from_slice(&self.error_code.to_be_bytes());
        // bytes 36..48 stay zero
        out[48..80].copy_from_slice(&self.key);
        // bytes 80..128 stay zero
        out
    }

    /// Compute and store the header checksum (Adler-32 over the packed
    /// header with the checksum field zeroed).
    #[must_use]
    pub fn finalize(mut self) -> Self {
        self.header_checksum = 0;
        self.header_checksum = adler32(&self.pack());
        self
    }

    /// Parse and validate a packed header.
    ///
    /// Validation order: length, magic, version, header checksum, command.
    /// Body validation is the caller's job once the body bytes are in hand
    /// (see [`Message::from_parts`]).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated { expected: HEADER_SIZE, actual: bytes.len() });
        }

        if &bytes[0..4] != MAGIC {
            return Err(ProtocolError::BadMagic);
        }

        let field = |offset: usize| -> [u8; 4] {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[offset..offset + 4]);
            buf
        };

        let version = i32::from_be_bytes(field(4));
        if version != VERSION_LEGACY && version != VERSION_CURRENT {
            return Err(ProtocolError::UnknownVersion(version));
        }

        let header_checksum = u32::from_be_bytes(field(8));
        let mut zeroed = [0u8; HEADER_SIZE];
        zeroed.copy_from_slice(&bytes[..HEADER_SIZE]);
        zeroed[8..12].fill(0);
        let actual = adler32(&zeroed);
        if actual != header_checksum {
            return Err(ProtocolError::HeaderChecksum { expected: header_checksum, actual });
        }

        let raw_command = i32::from_be_bytes(field(28));
        let command =
            Command::from_i32(raw_command).ok_or(ProtocolError::UnknownCommand(raw_command))?;

        let mut key = [0u8; HEADER_KEY_LEN];
        key.copy_from_slice(&bytes[48..80]);

        Ok(Self {
            version,
            header_checksum,
            body_checksum: u32::from_be_bytes(field(12)),
            body_size: i32::from_be_bytes(field(16)),
            flags: i32::from_be_bytes(field(20)),
            unused: i32::from_be_bytes(field(24)),
            command,
            error_code: i32::from_be_bytes(field(32)),
            key,
        })
    }
}

/// A complete protocol message: header fields plus optional body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Protocol version.
    pub version: i32,
    /// Command-specific flag bits.
    pub flags: i32,
    /// Transmitted as zero.
    pub unused: i32,
    /// Requested operation.
    pub command: Command,
    /// Zero on requests; failure code on responses.
    pub error_code: i32,
    /// Header key field (obfuscated password or zeros).
    pub key: [u8; HEADER_KEY_LEN],
    /// Body bytes, if any.
    pub body: Option<Bytes>,
}

/// Header key for a message composed outside the authenticate path:
/// the obfuscated password, or zeros once session encryption carries the
/// authentication instead.
fn header_key(password: Option<&str>) -> [u8; HEADER_KEY_LEN] {
    match password {
        Some(password) => generate_header_key(password),
        None => [0u8; HEADER_KEY_LEN],
    }
}

impl Message {
    /// Construct a message with the current protocol version.
    #[must_use]
    pub fn new(
        command: Command,
        flags: i32,
        error_code: i32,
        key: [u8; HEADER_KEY_LEN],
        body: Option<Bytes>,
    ) -> Self {
        Self { version: VERSION_CURRENT, flags, unused: 0, command, error_code, key, body }
    }

    /// Body length as carried in the header.
    #[must_use]
    pub fn body_size(&self) -> i32 {
        match &self.body {
            Some(body) => body.len() as i32,
            None => BODY_SIZE_NONE,
        }
    }

    /// Body Adler-32 as carried in the header.
    #[must_use]
    pub fn body_checksum(&self) -> u32 {
        match &self.body {
            Some(body) => adler32(body),
            None => 1,
        }
    }

    /// Header for this message with both checksums filled in.
    #[must_use]
    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            version: self.version,
            header_checksum: 0,
            body_checksum: self.body_checksum(),
            body_size: self.body_size(),
            flags: self.flags,
            unused: self.unused,
            command: self.command,
            error_code: self.error_code,
            key: self.key,
        }
        .finalize()
    }

    /// Serialize to wire form: finalized header, then body.
    #[must_use]
    pub fn compose(&self) -> Vec<u8> {
        let header = self.header().pack();
        match &self.body {
            Some(body) => {
                let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
                out.extend_from_slice(&header);
                out.extend_from_slice(body);
                out
            },
            None => header.to_vec(),
        }
    }

    /// Rebuild a message from a parsed header and separately received body
    /// bytes, validating length and checksum claims.
    pub fn from_parts(header: &MessageHeader, body: Option<Bytes>) -> Result<Self> {
        let body = match (header.body_size, body) {
            (BODY_SIZE_NONE, None) => None,
            (BODY_SIZE_NONE, Some(_)) => return Err(ProtocolError::StreamHeaderWithBody),
            (expected, body) => {
                let expected = expected as usize;
                let body = body.unwrap_or_else(Bytes::new);
                if body.len() != expected {
                    return Err(ProtocolError::BodyLengthMismatch {
                        expected,
                        actual: body.len(),
                    });
                }
                let actual = adler32(&body);
                if actual != header.body_checksum {
                    return Err(ProtocolError::BodyChecksum {
                        expected: header.body_checksum,
                        actual,
                    });
                }
                Some(body)
            },
        };

        Ok(Self {
            version: header.version,
            flags: header.flags,
            unused: header.unused,
            command: header.command,
            error_code: header.error_code,
            key: header.key,
            body,
        })
    }

    /// Parse a complete message from `bytes`, treating everything after
    /// the header as the body.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = MessageHeader::parse(bytes)?;
        let rest = &bytes[HEADER_SIZE..];
        let body = if rest.is_empty() { None } else { Some(Bytes::copy_from_slice(rest)) };
        Self::from_parts(&header, body)
    }

    /// Parse one message from the front of `bytes` and return the
    /// unconsumed tail.
    ///
    /// Headers with no body consume only their 128 bytes; trailing bytes
    /// after such a header are an error, because a well-formed single
    /// frame never has them.
    pub fn parse_split(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let header = MessageHeader::parse(bytes)?;
        let rest = &bytes[HEADER_SIZE..];

        if header.body_size == BODY_SIZE_NONE {
            if !rest.is_empty() {
                return Err(ProtocolError::StreamHeaderWithBody);
            }
            return Ok((Self::from_parts(&header, None)?, rest));
        }

        let size = header.body_size as usize;
        if rest.len() < size {
            return Err(ProtocolError::BodyLengthMismatch { expected: size, actual: rest.len() });
        }

        let (body, tail) = rest.split_at(size);
        let message = Self::from_parts(&header, Some(Bytes::copy_from_slice(body)))?;
        if !tail.is_empty() {
            tracing::trace!(trailing = tail.len(), "message parsed with unconsumed tail");
        }
        Ok((message, tail))
    }

    /// Request to read properties; `payload` is a run of property elements.
    #[must_use]
    pub fn get_property(password: Option<&str>, flags: i32, payload: impl Into<Bytes>) -> Self {
        Self::new(Command::GetProperty, flags, 0, header_key(password), Some(payload.into()))
    }

    /// Request to write properties.
    #[must_use]
    pub fn set_property(password: Option<&str>, flags: i32, payload: impl Into<Bytes>) -> Self {
        Self::new(Command::SetProperty, flags, 0, header_key(password), Some(payload.into()))
    }

    /// Request to invoke a named station action.
    #[must_use]
    pub fn perform(password: Option<&str>, flags: i32, payload: impl Into<Bytes>) -> Self {
        Self::new(Command::Perform, flags, 0, header_key(password), Some(payload.into()))
    }

    /// Subscribe to unsolicited change events.
    #[must_use]
    pub fn monitor(password: Option<&str>, flags: i32, payload: impl Into<Bytes>) -> Self {
        Self::new(Command::Monitor, flags, 0, header_key(password), Some(payload.into()))
    }

    /// Remote procedure call; `payload` is a composed plist document.
    #[must_use]
    pub fn rpc(password: Option<&str>, payload: impl Into<Bytes>) -> Self {
        Self::new(Command::Rpc, 0, 0, header_key(password), Some(payload.into()))
    }

    /// Authentication exchange message. Always keyed with the obfuscated
    /// empty password: authenticate runs before a password can be proven.
    #[must_use]
    pub fn authenticate(payload: impl Into<Bytes>) -> Self {
        Self::new(Command::Authenticate, 0, 0, generate_header_key(""), Some(payload.into()))
    }

    /// Capability-list request. Header-only, empty-password key.
    #[must_use]
    pub fn get_features() -> Self {
        Self::new(Command::GetFeatures, 0, 0, generate_header_key(""), None)
    }

    /// Firmware write to the primary partition.
    #[must_use]
    pub fn flash_primary(password: Option<&str>, image: impl Into<Bytes>) -> Self {
        Self::new(Command::FlashPrimary, 0, 0, header_key(password), Some(image.into()))
    }

    /// Firmware write to the secondary partition.
    #[must_use]
    pub fn flash_secondary(password: Option<&str>, image: impl Into<Bytes>) -> Self {
        Self::new(Command::FlashSecondary, 0, 0, header_key(password), Some(image.into()))
    }

    /// Bootloader write.
    #[must_use]
    pub fn flash_bootloader(password: Option<&str>, image: impl Into<Bytes>) -> Self {
        Self::new(Command::FlashBootloader, 0, 0, header_key(password), Some(image.into()))
    }

    /// Round-trip probe; the peer reflects the body back.
    #[must_use]
    pub fn echo(password: Option<&str>, payload: impl Into<Bytes>) -> Self {
        Self::new(Command::Echo, 0, 0, header_key(password), Some(payload.into()))
    }

    /// Response to `request`, echoing its command with a zero key.
    #[must_use]
    pub fn response(request: &Message, error_code: i32, body: Option<Bytes>) -> Self {
        Self::new(request.command, 0, error_code, [0u8; HEADER_KEY_LEN], body)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn testing_key() -> [u8; HEADER_KEY_LEN] {
        generate_header_key("testing")
    }

    #[test]
    fn pack_header_without_checksums() {
        let header = MessageHeader {
            version: VERSION_CURRENT,
            header_checksum: 0,
            body_checksum: 0,
            body_size: BODY_SIZE_NONE,
            flags: 4,
            unused: 0,
            command: Command::GetProperty,
            error_code: 0,
            key: testing_key(),
        };

        let packed = header.pack();
        assert_eq!(
            hex::encode(&packed[..24]),
            "61637070000300010000000000000000ffffffff00000004",
        );
        assert_eq!(packed[80..], [0u8; 48]);

        // Adler-32 over the same 128 bytes (checksum field zero)
        assert_eq!(adler32(&packed), 558_240_741);
        assert_eq!(adler32(&packed), 0x2146_13e5);

        let finalized = header.finalize();
        assert_eq!(finalized.header_checksum, 0x2146_13e5);
    }

    #[test]
    fn compose_get_property_vector() {
        // Element: name "dbug", flags 0, size 4, four zero value bytes
        let payload = hex::decode("64627567000000000000000400000000").unwrap();
        let message = Message::get_property(Some("testing"), 4, payload.clone());

        let wire = message.compose();
        assert_eq!(wire.len(), 144);
        assert_eq!(
            hex::encode(&wire[..32]),
            "61637070000300011bef117b17c301a700000010000000040000000000000014",
        );
        assert_eq!(&wire[128..], payload.as_slice());
    }

    #[test]
    fn parse_get_property_vector() {
        let payload = hex::decode("64627567000000000000000400000000").unwrap();
        let wire = Message::get_property(Some("testing"), 4, payload.clone()).compose();

        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.version, 196_609);
        assert_eq!(parsed.flags, 4);
        assert_eq!(parsed.unused, 0);
        assert_eq!(parsed.command, Command::GetProperty);
        assert_eq!(parsed.error_code, 0);
        assert_eq!(parsed.key, testing_key());
        assert_eq!(parsed.body.as_deref(), Some(payload.as_slice()));
        assert_eq!(parsed.body_size(), 16);
        assert_eq!(parsed.body_checksum(), 398_655_911);
    }

    #[test]
    fn reject_bad_magic() {
        let mut wire = Message::get_features().compose();
        wire[0] = b'x';
        assert_eq!(Message::parse(&wire), Err(ProtocolError::BadMagic));
    }

    #[test]
    fn reject_unknown_version() {
        let mut msg = Message::get_features();
        msg.version = 0x0002_0001;
        let wire = msg.compose();
        assert_eq!(Message::parse(&wire), Err(ProtocolError::UnknownVersion(0x0002_0001)));
    }

    #[test]
    fn reject_corrupted_header() {
        let mut wire = Message::get_features().compose();
        wire[20] ^= 0xFF; // flip a flags byte after checksumming
        assert!(matches!(Message::parse(&wire), Err(ProtocolError::HeaderChecksum { .. })));
    }

    #[test]
    fn reject_corrupted_body() {
        let mut wire = Message::echo(None, vec![1, 2, 3, 4]).compose();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert!(matches!(Message::parse(&wire), Err(ProtocolError::BodyChecksum { .. })));
    }

    #[test]
    fn reject_unknown_command() {
        let mut packed = Message::get_features().header().pack();
        packed[28..32].copy_from_slice(&99i32.to_be_bytes());
        packed[8..12].fill(0);
        let checksum = adler32(&packed);
        packed[8..12].copy_from_slice(&checksum.to_be_bytes());
        assert_eq!(MessageHeader::parse(&packed), Err(ProtocolError::UnknownCommand(99)));
    }

    #[test]
    fn reject_stream_header_with_body() {
        let mut wire = Message::get_features().compose();
        wire.push(0xAA);
        assert_eq!(Message::parse(&wire), Err(ProtocolError::StreamHeaderWithBody));
    }

    #[test]
    fn reject_short_buffer() {
        let err = Message::parse(&[0u8; 64]).unwrap_err();
        assert_eq!(err, ProtocolError::Truncated { expected: HEADER_SIZE, actual: 64 });
    }

    #[test]
    fn split_returns_tail() {
        let mut wire = Message::echo(None, vec![9, 9, 9]).compose();
        wire.extend_from_slice(b"tail");

        let (msg, tail) = Message::parse_split(&wire).unwrap();
        assert_eq!(msg.body.as_deref(), Some([9, 9, 9].as_slice()));
        assert_eq!(tail, b"tail");
    }

    #[test]
    fn empty_body_is_distinct_from_no_body() {
        let empty = Message::echo(None, Vec::new());
        assert_eq!(empty.body_size(), 0);
        assert_eq!(empty.body_checksum(), 1);

        let none = Message::get_features();
        assert_eq!(none.body_size(), BODY_SIZE_NONE);
        assert_eq!(none.body_checksum(), 1);

        let parsed = Message::parse(&empty.compose()).unwrap();
        assert_eq!(parsed.body, Some(Bytes::new()));
    }

    fn arbitrary_command() -> impl Strategy<Value = Command> {
        prop::sample::select(vec![
            Command::Echo,
            Command::FlashPrimary,
            Command::Reserved4,
            Command::FlashSecondary,
            Command::FlashBootloader,
            Command::GetProperty,
            Command::SetProperty,
            Command::Perform,
            Command::Reserved23,
            Command::Monitor,
            Command::Rpc,
            Command::Authenticate,
            Command::GetFeatures,
        ])
    }

    proptest! {
        #[test]
        fn compose_parse_round_trip(
            command in arbitrary_command(),
            version in prop::sample::select(vec![VERSION_LEGACY, VERSION_CURRENT]),
            flags in any::<i32>(),
            error_code in any::<i32>(),
            key in prop::collection::vec(any::<u8>(), HEADER_KEY_LEN),
            body in prop::option::of(prop::collection::vec(any::<u8>(), 0..512)),
        ) {
            let mut key_arr = [0u8; HEADER_KEY_LEN];
            key_arr.copy_from_slice(&key);

            let mut message = Message::new(
                command,
                flags,
                error_code,
                key_arr,
                body.map(Bytes::from),
            );
            message.version = version;

            let parsed = Message::parse(&message.compose()).unwrap();
            prop_assert_eq!(parsed, message);
        }
    }
}

//! Unsolicited monitor event frames.
//!
//! After a monitor subscription is acknowledged, the station pushes
//! events without being asked: each is an 8-byte header (`"XE"` magic,
//! two reserved bytes, a big-endian body size) followed by a
//! CFLBinaryPList body. The session stays in push mode until the socket
//! closes.

use crate::{Result, cflbinary::Value, error::ProtocolError};

/// Monitor frame magic.
pub const MONITOR_MAGIC: &[u8; 2] = b"XE";

/// Size of the packed monitor frame header.
pub const MONITOR_HEADER_SIZE: usize = 8;

/// Parsed monitor frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorFrameHeader {
    /// Reserved bytes following the magic; senders put zeros here.
    pub reserved: [u8; 2],
    /// Body length in bytes.
    pub body_size: u32,
}

impl MonitorFrameHeader {
    /// Parse from wire form.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MONITOR_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                expected: MONITOR_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        if &bytes[0..2] != MONITOR_MAGIC {
            return Err(ProtocolError::BadMagic);
        }
        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[4..8]);
        Ok(Self { reserved: [bytes[2], bytes[3]], body_size: u32::from_be_bytes(size) })
    }

    /// Pack to wire form.
    #[must_use]
    pub fn pack(&self) -> [u8; MONITOR_HEADER_SIZE] {
        let mut out = [0u8; MONITOR_HEADER_SIZE];
        out[0..2].copy_from_slice(MONITOR_MAGIC);
        out[2..4].copy_from_slice(&self.reserved);
        out[4..8].copy_from_slice(&self.body_size.to_be_bytes());
        out
    }
}

/// Serialize a complete event frame around an already-composed plist body.
#[must_use]
pub fn compose_monitor_frame(body: &[u8]) -> Vec<u8> {
    let header = MonitorFrameHeader { reserved: [0, 0], body_size: body.len() as u32 };
    let mut out = Vec::with_capacity(MONITOR_HEADER_SIZE + body.len());
    out.extend_from_slice(&header.pack());
    out.extend_from_slice(body);
    out
}

/// Build a monitor subscription body: four zero bytes, then a plist
/// document wrapping `filters`.
#[must_use]
pub fn compose_monitor_body(filters: &Value) -> Vec<u8> {
    let document = Value::dict(vec![("filters", filters.clone())]).compose();
    let mut out = Vec::with_capacity(4 + document.len());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&document);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let body = Value::dict(vec![("name", Value::from("syNm"))]).compose();
        let frame = compose_monitor_frame(&body);

        let header = MonitorFrameHeader::parse(&frame).unwrap();
        assert_eq!(header.body_size as usize, body.len());
        assert_eq!(&frame[MONITOR_HEADER_SIZE..], body.as_slice());
    }

    #[test]
    fn reject_wrong_magic() {
        let mut frame = compose_monitor_frame(b"x");
        frame[0] = b'Y';
        assert_eq!(MonitorFrameHeader::parse(&frame), Err(ProtocolError::BadMagic));
    }

    #[test]
    fn reject_short_header() {
        assert!(matches!(
            MonitorFrameHeader::parse(b"XE\0\0"),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn subscription_body_shape() {
        let filters = Value::dict(vec![("names", Value::Array(vec![Value::from("syNm")]))]);
        let body = compose_monitor_body(&filters);

        assert_eq!(&body[..4], &[0, 0, 0, 0]);
        let document = Value::parse(&body[4..]).unwrap();
        assert!(document.get("filters").is_some());
    }
}

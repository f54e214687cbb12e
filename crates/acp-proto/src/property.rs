//! Property elements: named typed values and their wire codec.
//!
//! Get/set bodies are runs of elements, each a 12-byte big-endian header
//! (name, flags, size) followed by `size` value bytes, terminated by a
//! sentinel of sixteen zero bytes. Flag bit 0 marks an error element whose
//! value is a 4-byte signed status code instead of data.
//!
//! Values travel as raw bytes. Interpretation comes from a static registry
//! keyed by the 4-byte name: each entry declares a [`ValueKind`] plus an
//! optional validator. The registry here is the curated subset current
//! tooling relies on; stations answer plenty of names beyond it, which
//! callers handle as opaque bytes.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use thiserror::Error;

use crate::{Result, cflbinary, error::ProtocolError};

/// Size of the packed element header.
pub const ELEMENT_HEADER_SIZE: usize = 12;

/// The sixteen-zero-byte end-of-list marker.
pub const SENTINEL: [u8; 16] = [0u8; 16];

/// Element flag bit marking an error value.
pub const FLAG_ERROR: u32 = 1;

/// A 4-byte ASCII property name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropName(
    /// Raw name bytes.
    pub [u8; 4],
);

impl PropName {
    /// Build from a string, which must be exactly four ASCII bytes.
    pub fn new(name: &str) -> std::result::Result<Self, PropertyError> {
        let bytes = name.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii) {
            return Err(PropertyError::InvalidName(name.to_owned()));
        }
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// True for the all-zero name carried by the sentinel.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 4]
    }
}

impl std::fmt::Display for PropName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if self.0.iter().all(|b| b.is_ascii_graphic()) => f.write_str(s),
            _ => write!(f, "0x{}", self.0.iter().fold(String::new(), |mut acc, b| {
                use std::fmt::Write;
                let _ = write!(acc, "{b:02x}");
                acc
            })),
        }
    }
}

/// A named property with raw value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Four-byte name.
    pub name: PropName,
    /// Raw value bytes.
    pub value: Bytes,
}

impl Property {
    /// Property with an explicit byte value.
    #[must_use]
    pub fn new(name: PropName, value: impl Into<Bytes>) -> Self {
        Self { name, value: value.into() }
    }

    /// Name-only property as used in get requests. On the wire its value
    /// is the four-byte zero placeholder.
    #[must_use]
    pub fn request(name: PropName) -> Self {
        Self { name, value: Bytes::new() }
    }

    /// Property carrying an encoded typed value.
    #[must_use]
    pub fn typed(name: PropName, value: &PropertyValue) -> Self {
        Self { name, value: value.encode() }
    }

    /// Decode this property's bytes according to the registry.
    pub fn decode(&self) -> std::result::Result<PropertyValue, PropertyError> {
        let info = lookup(self.name).ok_or(PropertyError::UnknownProperty(self.name))?;
        PropertyValue::decode(info.kind, &self.value)
    }
}

/// Unpacked element header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    /// Property name, or zeros for the sentinel.
    pub name: PropName,
    /// Flag bits; bit 0 marks an error element.
    pub flags: u32,
    /// Value length in bytes.
    pub size: u32,
}

impl ElementHeader {
    /// Pack to wire form.
    #[must_use]
    pub fn pack(&self) -> [u8; ELEMENT_HEADER_SIZE] {
        let mut out = [0u8; ELEMENT_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.name.0);
        out[4..8].copy_from_slice(&self.flags.to_be_bytes());
        out[8..12].copy_from_slice(&self.size.to_be_bytes());
        out
    }

    /// Parse from wire form.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ELEMENT_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                expected: ELEMENT_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let mut name = [0u8; 4];
        name.copy_from_slice(&bytes[0..4]);
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[4..8]);
        let flags = u32::from_be_bytes(word);
        word.copy_from_slice(&bytes[8..12]);
        let size = u32::from_be_bytes(word);
        Ok(Self { name: PropName(name), flags, size })
    }

    /// True when this header starts an end-of-list sentinel. The canonical
    /// sentinel carries size 0 and four zero pad bytes; some peers send
    /// size 4 with a zero value, which reads the same.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.name.is_zero() && self.flags == 0 && (self.size == 0 || self.size == 4)
    }

    /// Bytes of trailing payload the sentinel shape carries (always four).
    #[must_use]
    pub fn sentinel_pad(&self) -> usize {
        4
    }
}

/// One parsed element, or the list terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedElement {
    /// A real property element.
    Element(RawElement),
    /// The end-of-list sentinel.
    Sentinel,
}

/// A property element as received, before typed interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawElement {
    /// Property name.
    pub name: PropName,
    /// Flag bits from the header.
    pub flags: u32,
    /// Raw value bytes (a status code when the error flag is set).
    pub value: Bytes,
}

impl RawElement {
    /// Status code carried instead of data when flag bit 0 is set.
    #[must_use]
    pub fn error_code(&self) -> Option<i32> {
        if self.flags & FLAG_ERROR == 0 || self.value.len() != 4 {
            return None;
        }
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.value);
        Some(i32::from_be_bytes(buf))
    }

    /// Strip the flags and keep name plus value.
    #[must_use]
    pub fn into_property(self) -> Property {
        Property { name: self.name, value: self.value }
    }
}

/// Serialize one element.
///
/// A fully empty property (zero name, no value) writes the sentinel. A
/// named property with no value bytes writes the four-byte zero
/// placeholder get requests use.
#[must_use]
pub fn compose_element(flags: u32, property: &Property) -> Vec<u8> {
    if property.name.is_zero() && property.value.is_empty() {
        return SENTINEL.to_vec();
    }

    let value: &[u8] = if property.value.is_empty() { &[0u8; 4] } else { &property.value };
    let header =
        ElementHeader { name: property.name, flags, size: value.len() as u32 };

    let mut out = Vec::with_capacity(ELEMENT_HEADER_SIZE + value.len());
    out.extend_from_slice(&header.pack());
    out.extend_from_slice(value);
    out
}

/// Serialize a run of elements followed by the sentinel.
#[must_use]
pub fn compose_element_list(properties: &[Property]) -> Vec<u8> {
    let mut out = Vec::new();
    for property in properties {
        out.extend_from_slice(&compose_element(0, property));
    }
    out.extend_from_slice(&SENTINEL);
    out
}

/// Parse one element from the front of `bytes`, returning it and the
/// unconsumed tail.
pub fn parse_element(bytes: &[u8]) -> Result<(ParsedElement, &[u8])> {
    let header = ElementHeader::parse(bytes)?;
    let rest = &bytes[ELEMENT_HEADER_SIZE..];

    if header.is_sentinel() {
        let pad = header.sentinel_pad();
        if rest.len() < pad {
            return Err(ProtocolError::Truncated { expected: pad, actual: rest.len() });
        }
        return Ok((ParsedElement::Sentinel, &rest[pad..]));
    }

    let size = header.size as usize;
    if rest.len() < size {
        return Err(ProtocolError::Truncated { expected: size, actual: rest.len() });
    }

    let element = RawElement {
        name: header.name,
        flags: header.flags,
        value: Bytes::copy_from_slice(&rest[..size]),
    };
    Ok((ParsedElement::Element(element), &rest[size..]))
}

/// Parse a buffer of elements, stopping at the sentinel or at the end of
/// the buffer.
pub fn parse_element_list(mut bytes: &[u8]) -> Result<Vec<RawElement>> {
    let mut elements = Vec::new();
    while !bytes.is_empty() {
        let (parsed, rest) = parse_element(bytes)?;
        bytes = rest;
        match parsed {
            ParsedElement::Element(element) => elements.push(element),
            ParsedElement::Sentinel => break,
        }
    }
    Ok(elements)
}

/// Errors from typed property handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// Property name is not four ASCII bytes.
    #[error("property names are four ASCII bytes, got {0:?}")]
    InvalidName(String),

    /// Name is not in the registry.
    #[error("unknown property {0}")]
    UnknownProperty(PropName),

    /// Value bytes do not decode as the declared kind.
    #[error("invalid {kind} value {value:02x?}")]
    InvalidValue {
        /// Declared kind of the property.
        kind: ValueKind,
        /// Offending value bytes.
        value: Vec<u8>,
    },

    /// The station answered this property with a status code.
    #[error("station returned status {0} for property")]
    ServerError(i32),
}

/// Closed set of property value encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// UTF-8 text.
    Str,
    /// 4-byte unsigned, rendered in decimal.
    Dec,
    /// 4-byte unsigned, rendered in hexadecimal.
    Hex,
    /// NUL-separated log text, rendered newline-joined.
    Log,
    /// 6-byte MAC address.
    Mac,
    /// Embedded CFLBinaryPList document.
    Cfb,
    /// Opaque bytes.
    Bin,
    /// 1-byte boolean.
    Bool,
    /// 1-byte unsigned.
    U8,
    /// 2-byte big-endian unsigned.
    U16,
    /// 4-byte big-endian unsigned.
    U32,
    /// 8-byte big-endian unsigned.
    U64,
    /// 4-byte IPv4 address.
    Ip4,
    /// 16-byte IPv6 address.
    Ip6,
    /// Apple binary plist bytes, kept opaque.
    Bpl,
    /// 16-byte UUID.
    Uid,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::Str => "str",
            Self::Dec => "dec",
            Self::Hex => "hex",
            Self::Log => "log",
            Self::Mac => "mac",
            Self::Cfb => "cfb",
            Self::Bin => "bin",
            Self::Bool => "boo",
            Self::U8 => "ui8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::Ip4 => "ip4",
            Self::Ip6 => "ip6",
            Self::Bpl => "bpl",
            Self::Uid => "uid",
        };
        f.write_str(code)
    }
}

/// A property value in native form.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// UTF-8 text.
    Str(String),
    /// Decimal-rendered 32-bit unsigned.
    Dec(u32),
    /// Hex-rendered 32-bit unsigned.
    Hex(u32),
    /// Log text, newline-joined.
    Log(String),
    /// MAC address.
    Mac([u8; 6]),
    /// Parsed plist value.
    Cfb(cflbinary::Value),
    /// Opaque bytes.
    Bin(Bytes),
    /// Boolean.
    Bool(bool),
    /// 8-bit unsigned.
    U8(u8),
    /// 16-bit unsigned.
    U16(u16),
    /// 32-bit unsigned.
    U32(u32),
    /// 64-bit unsigned.
    U64(u64),
    /// IPv4 address.
    Ip4(Ipv4Addr),
    /// IPv6 address.
    Ip6(Ipv6Addr),
    /// Opaque Apple binary plist.
    Bpl(Bytes),
    /// UUID bytes.
    Uid([u8; 16]),
}

impl PropertyValue {
    /// The kind this value encodes as.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Str(_) => ValueKind::Str,
            Self::Dec(_) => ValueKind::Dec,
            Self::Hex(_) => ValueKind::Hex,
            Self::Log(_) => ValueKind::Log,
            Self::Mac(_) => ValueKind::Mac,
            Self::Cfb(_) => ValueKind::Cfb,
            Self::Bin(_) => ValueKind::Bin,
            Self::Bool(_) => ValueKind::Bool,
            Self::U8(_) => ValueKind::U8,
            Self::U16(_) => ValueKind::U16,
            Self::U32(_) => ValueKind::U32,
            Self::U64(_) => ValueKind::U64,
            Self::Ip4(_) => ValueKind::Ip4,
            Self::Ip6(_) => ValueKind::Ip6,
            Self::Bpl(_) => ValueKind::Bpl,
            Self::Uid(_) => ValueKind::Uid,
        }
    }

    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Str(s) => Bytes::copy_from_slice(s.as_bytes()),
            Self::Dec(v) | Self::Hex(v) | Self::U32(v) => {
                Bytes::copy_from_slice(&v.to_be_bytes())
            },
            Self::Log(s) => Bytes::from(s.replace('\n', "\0").into_bytes()),
            Self::Mac(m) => Bytes::copy_from_slice(m),
            Self::Cfb(v) => Bytes::from(v.compose()),
            Self::Bin(b) | Self::Bpl(b) => b.clone(),
            Self::Bool(v) => Bytes::copy_from_slice(&[u8::from(*v)]),
            Self::U8(v) => Bytes::copy_from_slice(&[*v]),
            Self::U16(v) => Bytes::copy_from_slice(&v.to_be_bytes()),
            Self::U64(v) => Bytes::copy_from_slice(&v.to_be_bytes()),
            Self::Ip4(a) => Bytes::copy_from_slice(&a.octets()),
            Self::Ip6(a) => Bytes::copy_from_slice(&a.octets()),
            Self::Uid(u) => Bytes::copy_from_slice(u),
        }
    }

    /// Decode wire bytes as `kind`.
    pub fn decode(kind: ValueKind, bytes: &[u8]) -> std::result::Result<Self, PropertyError> {
        let invalid = || PropertyError::InvalidValue { kind, value: bytes.to_vec() };

        let exact = |n: usize| -> std::result::Result<&[u8], PropertyError> {
            if bytes.len() == n { Ok(bytes) } else { Err(invalid()) }
        };

        match kind {
            ValueKind::Str => {
                let text = std::str::from_utf8(bytes).map_err(|_| invalid())?;
                Ok(Self::Str(text.trim_end_matches('\0').to_owned()))
            },
            ValueKind::Dec => Ok(Self::Dec(be_u32(exact(4)?))),
            ValueKind::Hex => Ok(Self::Hex(be_u32(exact(4)?))),
            ValueKind::U32 => Ok(Self::U32(be_u32(exact(4)?))),
            ValueKind::Log => {
                let text = String::from_utf8_lossy(bytes);
                let joined: Vec<&str> =
                    text.split('\0').filter(|part| !part.is_empty()).collect();
                Ok(Self::Log(joined.join("\n")))
            },
            ValueKind::Mac => {
                let mut mac = [0u8; 6];
                mac.copy_from_slice(exact(6)?);
                Ok(Self::Mac(mac))
            },
            ValueKind::Cfb => {
                let value = cflbinary::Value::parse(bytes).map_err(|_| invalid())?;
                Ok(Self::Cfb(value))
            },
            ValueKind::Bin => Ok(Self::Bin(Bytes::copy_from_slice(bytes))),
            ValueKind::Bpl => Ok(Self::Bpl(Bytes::copy_from_slice(bytes))),
            ValueKind::Bool => Ok(Self::Bool(exact(1)?[0] != 0)),
            ValueKind::U8 => Ok(Self::U8(exact(1)?[0])),
            ValueKind::U16 => {
                let mut buf = [0u8; 2];
                buf.copy_from_slice(exact(2)?);
                Ok(Self::U16(u16::from_be_bytes(buf)))
            },
            ValueKind::U64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(exact(8)?);
                Ok(Self::U64(u64::from_be_bytes(buf)))
            },
            ValueKind::Ip4 => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(exact(4)?);
                Ok(Self::Ip4(Ipv4Addr::from(buf)))
            },
            ValueKind::Ip6 => {
                let mut buf = [0u8; 16];
                buf.copy_from_slice(exact(16)?);
                Ok(Self::Ip6(Ipv6Addr::from(buf)))
            },
            ValueKind::Uid => {
                let mut buf = [0u8; 16];
                buf.copy_from_slice(exact(16)?);
                Ok(Self::Uid(buf))
            },
        }
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) | Self::Log(s) => f.write_str(s),
            Self::Dec(v) => write!(f, "{v}"),
            Self::Hex(v) => write!(f, "{v:#010x}"),
            Self::Mac(m) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                m[0], m[1], m[2], m[3], m[4], m[5]
            ),
            Self::Cfb(v) => write!(f, "{v:?}"),
            Self::Bin(b) | Self::Bpl(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            },
            Self::Bool(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::Ip4(a) => write!(f, "{a}"),
            Self::Ip6(a) => write!(f, "{a}"),
            Self::Uid(u) => {
                let h = |range: std::ops::Range<usize>| {
                    u[range].iter().fold(String::new(), |mut acc, b| {
                        use std::fmt::Write;
                        let _ = write!(acc, "{b:02x}");
                        acc
                    })
                };
                write!(f, "{}-{}-{}-{}-{}", h(0..4), h(4..6), h(6..8), h(8..10), h(10..16))
            },
        }
    }
}

/// One registry entry.
#[derive(Debug, Clone, Copy)]
pub struct PropertyInfo {
    /// Four-character property name.
    pub name: &'static str,
    /// Declared value encoding.
    pub kind: ValueKind,
    /// Human-readable description.
    pub description: &'static str,
    /// Optional write validator.
    pub validator: Option<fn(&PropertyValue) -> bool>,
}

fn validate_station_name(value: &PropertyValue) -> bool {
    matches!(value, PropertyValue::Str(s) if !s.is_empty() && s.len() <= 63)
}

fn validate_reboot(value: &PropertyValue) -> bool {
    matches!(value, PropertyValue::Dec(0))
}

fn validate_channel(value: &PropertyValue) -> bool {
    matches!(value, PropertyValue::U32(c) if (1..=165).contains(c))
}

/// The curated property registry.
pub static PROPERTIES: &[PropertyInfo] = &[
    PropertyInfo {
        name: "syNm",
        kind: ValueKind::Str,
        description: "station name",
        validator: Some(validate_station_name),
    },
    PropertyInfo {
        name: "syPW",
        kind: ValueKind::Str,
        description: "administrator password",
        validator: None,
    },
    PropertyInfo {
        name: "syLo",
        kind: ValueKind::Str,
        description: "physical location",
        validator: None,
    },
    PropertyInfo {
        name: "syCt",
        kind: ValueKind::Str,
        description: "administrative contact",
        validator: None,
    },
    PropertyInfo {
        name: "syVs",
        kind: ValueKind::Str,
        description: "firmware version string",
        validator: None,
    },
    PropertyInfo {
        name: "syAP",
        kind: ValueKind::U32,
        description: "hardware model identifier",
        validator: None,
    },
    PropertyInfo {
        name: "syUp",
        kind: ValueKind::U32,
        description: "uptime in seconds",
        validator: None,
    },
    PropertyInfo {
        name: "timz",
        kind: ValueKind::Str,
        description: "time zone",
        validator: None,
    },
    PropertyInfo {
        name: "time",
        kind: ValueKind::U32,
        description: "station clock, seconds since epoch",
        validator: None,
    },
    PropertyInfo {
        name: "dbug",
        kind: ValueKind::Hex,
        description: "debug flag mask",
        validator: None,
    },
    PropertyInfo {
        name: "logm",
        kind: ValueKind::Log,
        description: "syslog ring buffer",
        validator: None,
    },
    PropertyInfo {
        name: "acRB",
        kind: ValueKind::Dec,
        description: "reboot trigger, write zero",
        validator: Some(validate_reboot),
    },
    PropertyInfo {
        name: "raCh",
        kind: ValueKind::U32,
        description: "radio channel",
        validator: Some(validate_channel),
    },
    PropertyInfo {
        name: "raNm",
        kind: ValueKind::Str,
        description: "wireless network name",
        validator: None,
    },
    PropertyInfo {
        name: "raMA",
        kind: ValueKind::Mac,
        description: "radio MAC address",
        validator: None,
    },
    PropertyInfo {
        name: "waMA",
        kind: ValueKind::Mac,
        description: "WAN interface MAC address",
        validator: None,
    },
    PropertyInfo {
        name: "laMA",
        kind: ValueKind::Mac,
        description: "LAN interface MAC address",
        validator: None,
    },
    PropertyInfo {
        name: "waIP",
        kind: ValueKind::Ip4,
        description: "WAN IPv4 address",
        validator: None,
    },
    PropertyInfo {
        name: "laIP",
        kind: ValueKind::Ip4,
        description: "LAN IPv4 address",
        validator: None,
    },
    PropertyInfo {
        name: "laV6",
        kind: ValueKind::Ip6,
        description: "LAN IPv6 address",
        validator: None,
    },
    PropertyInfo {
        name: "stat",
        kind: ValueKind::Cfb,
        description: "status dictionary",
        validator: None,
    },
    PropertyInfo {
        name: "usrd",
        kind: ValueKind::Bpl,
        description: "user account records",
        validator: None,
    },
    PropertyInfo {
        name: "fltr",
        kind: ValueKind::Bin,
        description: "access control blob",
        validator: None,
    },
    PropertyInfo {
        name: "wsEn",
        kind: ValueKind::Bool,
        description: "wireless radio enabled",
        validator: None,
    },
    PropertyInfo {
        name: "uuid",
        kind: ValueKind::Uid,
        description: "station UUID",
        validator: None,
    },
];

/// Find a registry entry for `name`.
#[must_use]
pub fn lookup(name: PropName) -> Option<&'static PropertyInfo> {
    PROPERTIES.iter().find(|info| info.name.as_bytes() == name.0)
}

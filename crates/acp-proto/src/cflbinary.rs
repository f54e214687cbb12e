//! CFLBinaryPList: the compact typed-value format carried by message
//! bodies.
//!
//! Authenticate, monitor, RPC and feature exchanges all carry one value
//! serialized in this dialect, framed by the ASCII magics `"CFB0"` and
//! `"END!"`. Each value starts with a one-byte marker whose high nibble
//! selects the type and whose low nibble is a size hint:
//!
//! | high | type        | low nibble                                |
//! |------|-------------|-------------------------------------------|
//! | 0x0  | null / bool | 0x0 null, 0x8 false, 0x9 true             |
//! | 0x1  | uint BE     | exponent `e`, payload `2^e` bytes         |
//! | 0x2  | float BE    | exponent `e`; 4 = f32, 8 = f64            |
//! | 0x4  | data        | count, or 0xF with the count as an int    |
//! | 0x7  | string      | unused; payload is NUL-terminated UTF-8   |
//! | 0xA  | array       | unused; values until a null marker        |
//! | 0xD  | dict        | unused; key/value pairs until null marker |
//!
//! The remaining nibbles (dates, alternate strings, UIDs, sets) are not
//! spoken by any known peer and parse as [`PlistError::UnsupportedType`].
//! Nesting deeper than [`MAX_DEPTH`] is rejected. The composer always
//! emits the smallest integer width that fits and tries a 4-byte float
//! before falling back to 8.

use thiserror::Error;

/// Document prefix magic.
pub const HEADER_MAGIC: &[u8; 4] = b"CFB0";

/// Document suffix magic.
pub const FOOTER_MAGIC: &[u8; 4] = b"END!";

/// Maximum container nesting the parser accepts.
pub const MAX_DEPTH: usize = 10;

/// Errors from parsing or interpreting a plist document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlistError {
    /// Document does not start with `"CFB0"`.
    #[error("plist document does not start with CFB0")]
    BadHeader,

    /// Document does not end with `"END!"`.
    #[error("plist document does not end with END!")]
    BadFooter,

    /// Bytes remain after the footer.
    #[error("trailing bytes after plist footer")]
    TrailingGarbage,

    /// Marker selects a type this dialect does not carry.
    #[error("unsupported plist marker {0:#04x}")]
    UnsupportedType(u8),

    /// Containers nest deeper than [`MAX_DEPTH`].
    #[error("plist nesting deeper than {MAX_DEPTH} levels")]
    MaxDepthExceeded,

    /// Payload bytes end before the value is complete.
    #[error("plist value truncated: {0} more bytes needed")]
    UnexpectedEnd(usize),

    /// String payload is not valid UTF-8.
    #[error("plist string is not valid UTF-8")]
    BadString,

    /// A dictionary lookup required by a typed payload failed.
    #[error("plist dictionary is missing key {0:?}")]
    MissingKey(&'static str),

    /// A value had the wrong shape for a typed payload.
    #[error("plist value has unexpected shape: wanted {0}")]
    UnexpectedShape(&'static str),
}

/// One plist value.
///
/// Dictionaries preserve insertion order and permit arbitrary keys, since
/// the wire format does; in practice every peer uses string keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null marker.
    Null,
    /// Boolean.
    Bool(bool),
    /// Unsigned integer, up to 64 bits.
    Integer(u64),
    /// IEEE float.
    Real(f64),
    /// Raw bytes.
    Data(Vec<u8>),
    /// UTF-8 text (may not contain NUL).
    String(String),
    /// Ordered sequence.
    Array(Vec<Value>),
    /// Ordered key/value pairs.
    Dict(Vec<(Value, Value)>),
}

impl Value {
    /// Build a dictionary with string keys.
    #[must_use]
    pub fn dict(entries: Vec<(&str, Value)>) -> Self {
        Self::Dict(entries.into_iter().map(|(k, v)| (Self::String(k.to_owned()), v)).collect())
    }

    /// Look up a string key in a dictionary value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Dict(entries) => entries.iter().find_map(|(k, v)| match k {
                Self::String(s) if s == key => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Like [`Self::get`], but a missing key is an error.
    pub fn require(&self, key: &'static str) -> Result<&Value, PlistError> {
        self.get(key).ok_or(PlistError::MissingKey(key))
    }

    /// Integer content, if this is an integer.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean content, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Byte content, if this is a data value.
    #[must_use]
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(d) => Some(d),
            _ => None,
        }
    }

    /// Element list, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Entry list, if this is a dictionary.
    #[must_use]
    pub fn as_dict(&self) -> Option<&[(Value, Value)]> {
        match self {
            Self::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    /// Serialize to a complete document (`CFB0` … `END!`).
    #[must_use]
    pub fn compose(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(HEADER_MAGIC);
        self.write(&mut out);
        out.extend_from_slice(FOOTER_MAGIC);
        out
    }

    /// Parse a complete document.
    pub fn parse(bytes: &[u8]) -> Result<Self, PlistError> {
        if bytes.len() < HEADER_MAGIC.len() || &bytes[..4] != HEADER_MAGIC {
            return Err(PlistError::BadHeader);
        }

        let mut parser = Parser { input: &bytes[4..], pos: 0 };
        let value = parser.parse_value(1)?;

        let rest = &parser.input[parser.pos..];
        if rest.len() < FOOTER_MAGIC.len() || &rest[..4] != FOOTER_MAGIC {
            return Err(PlistError::BadFooter);
        }
        if rest.len() > FOOTER_MAGIC.len() {
            return Err(PlistError::TrailingGarbage);
        }
        Ok(value)
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Self::Null => out.push(0x00),
            Self::Bool(false) => out.push(0x08),
            Self::Bool(true) => out.push(0x09),
            Self::Integer(v) => write_integer(*v, out),
            Self::Real(v) => {
                let narrowed = *v as f32;
                if f64::from(narrowed).to_bits() == v.to_bits() {
                    out.push(0x22);
                    out.extend_from_slice(&narrowed.to_be_bytes());
                } else {
                    out.push(0x23);
                    out.extend_from_slice(&v.to_be_bytes());
                }
            },
            Self::Data(data) => {
                if data.len() < 0xF {
                    out.push(0x40 | data.len() as u8);
                } else {
                    out.push(0x4F);
                    write_integer(data.len() as u64, out);
                }
                out.extend_from_slice(data);
            },
            Self::String(s) => {
                out.push(0x70);
                out.extend_from_slice(s.as_bytes());
                out.push(0x00);
            },
            Self::Array(items) => {
                out.push(0xA0);
                for item in items {
                    item.write(out);
                }
                out.push(0x00);
            },
            Self::Dict(entries) => {
                out.push(0xD0);
                for (key, value) in entries {
                    key.write(out);
                    value.write(out);
                }
                out.push(0x00);
            },
        }
    }
}

/// Emit an integer with the smallest power-of-two width that fits.
fn write_integer(v: u64, out: &mut Vec<u8>) {
    if v < 1 << 8 {
        out.push(0x10);
        out.push(v as u8);
    } else if v < 1 << 16 {
        out.push(0x11);
        out.extend_from_slice(&(v as u16).to_be_bytes());
    } else if v < 1 << 32 {
        out.push(0x12);
        out.extend_from_slice(&(v as u32).to_be_bytes());
    } else {
        out.push(0x13);
        out.extend_from_slice(&v.to_be_bytes());
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(u64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Data(v)
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], PlistError> {
        let available = self.input.len() - self.pos;
        if available < n {
            return Err(PlistError::UnexpectedEnd(n - available));
        }
        let slice = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, PlistError> {
        Ok(self.take(1)?[0])
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, PlistError> {
        if depth > MAX_DEPTH {
            return Err(PlistError::MaxDepthExceeded);
        }

        let marker = self.byte()?;
        match marker >> 4 {
            0x0 => match marker & 0xF {
                0x0 => Ok(Value::Null),
                0x8 => Ok(Value::Bool(false)),
                0x9 => Ok(Value::Bool(true)),
                _ => Err(PlistError::UnsupportedType(marker)),
            },
            0x1 => Ok(Value::Integer(self.read_uint(marker)?)),
            0x2 => match 1usize << (marker & 0xF) {
                4 => {
                    let mut buf = [0u8; 4];
                    buf.copy_from_slice(self.take(4)?);
                    Ok(Value::Real(f64::from(f32::from_be_bytes(buf))))
                },
                8 => {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(self.take(8)?);
                    Ok(Value::Real(f64::from_be_bytes(buf)))
                },
                _ => Err(PlistError::UnsupportedType(marker)),
            },
            0x4 => {
                let count = if marker & 0xF == 0xF {
                    let count_marker = self.byte()?;
                    if count_marker >> 4 != 0x1 {
                        return Err(PlistError::UnsupportedType(count_marker));
                    }
                    self.read_uint(count_marker)? as usize
                } else {
                    (marker & 0xF) as usize
                };
                Ok(Value::Data(self.take(count)?.to_vec()))
            },
            0x7 => {
                let rest = &self.input[self.pos..];
                let nul = rest
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(PlistError::UnexpectedEnd(1))?;
                let text = std::str::from_utf8(&rest[..nul]).map_err(|_| PlistError::BadString)?;
                self.pos += nul + 1;
                Ok(Value::String(text.to_owned()))
            },
            0xA => {
                let mut items = Vec::new();
                loop {
                    if self.peek() == Some(0x00) {
                        self.pos += 1;
                        return Ok(Value::Array(items));
                    }
                    items.push(self.parse_value(depth + 1)?);
                }
            },
            0xD => {
                let mut entries = Vec::new();
                loop {
                    if self.peek() == Some(0x00) {
                        self.pos += 1;
                        return Ok(Value::Dict(entries));
                    }
                    let key = self.parse_value(depth + 1)?;
                    let value = self.parse_value(depth + 1)?;
                    entries.push((key, value));
                }
            },
            _ => Err(PlistError::UnsupportedType(marker)),
        }
    }

    /// Read the payload of an integer marker (`0x10 | e` → `2^e` bytes).
    fn read_uint(&mut self, marker: u8) -> Result<u64, PlistError> {
        let exponent = marker & 0xF;
        if exponent > 3 {
            return Err(PlistError::UnsupportedType(marker));
        }
        let mut value: u64 = 0;
        for &byte in self.take(1 << exponent)? {
            value = (value << 8) | u64::from(byte);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn round_trip(value: &Value) -> Value {
        Value::parse(&value.compose()).unwrap()
    }

    #[test]
    fn scalars_round_trip() {
        for value in [
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Integer(0),
            Value::Integer(0xFF),
            Value::Integer(0x1_0000),
            Value::Integer(u64::MAX),
            Value::Real(1.5),
            Value::Real(-0.25),
            Value::String(String::new()),
            Value::String("admin".to_owned()),
            Value::Data(vec![]),
            Value::Data(vec![0xAB; 14]),
            Value::Data(vec![0xCD; 300]),
        ] {
            assert_eq!(round_trip(&value), value, "{value:?}");
        }
    }

    #[test]
    fn integer_widths_are_minimal() {
        assert_eq!(Value::Integer(7).compose(), b"CFB0\x10\x07END!".to_vec());
        assert_eq!(Value::Integer(0x100).compose(), b"CFB0\x11\x01\x00END!".to_vec());
        assert_eq!(
            Value::Integer(0x0102_0304).compose(),
            b"CFB0\x12\x01\x02\x03\x04END!".to_vec()
        );
        assert_eq!(
            Value::Integer(0x1_0000_0000).compose(),
            b"CFB0\x13\x00\x00\x00\x01\x00\x00\x00\x00END!".to_vec()
        );
    }

    #[test]
    fn float_narrows_when_exact() {
        // 1.5 is exact in f32: four bytes
        let four = Value::Real(1.5).compose();
        assert_eq!(four[4], 0x22);
        assert_eq!(four.len(), 4 + 1 + 4 + 4);

        // 0.1 is not: eight bytes
        let eight = Value::Real(0.1).compose();
        assert_eq!(eight[4], 0x23);
        assert_eq!(eight.len(), 4 + 1 + 8 + 4);
    }

    #[test]
    fn long_data_uses_integer_count() {
        let wire = Value::Data(vec![0u8; 16]).compose();
        // CFB0, 0x4F, 0x10 0x10 (count 16 as one-byte int), 16 bytes, END!
        assert_eq!(&wire[4..7], &[0x4F, 0x10, 0x10]);
    }

    #[test]
    fn dict_preserves_order_and_lookup() {
        let dict = Value::dict(vec![
            ("state", Value::Integer(1)),
            ("username", Value::from("admin")),
        ]);

        let parsed = round_trip(&dict);
        assert_eq!(parsed.get("state").and_then(Value::as_u64), Some(1));
        assert_eq!(parsed.get("username").and_then(Value::as_str), Some("admin"));
        assert_eq!(parsed.get("missing"), None);
    }

    #[test]
    fn nested_containers_round_trip() {
        let value = Value::dict(vec![
            (
                "filters",
                Value::dict(vec![("names", Value::Array(vec![Value::from("syNm")]))]),
            ),
            ("limit", Value::Integer(16)),
        ]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn reject_bad_header_and_footer() {
        assert_eq!(Value::parse(b"XXXX\x00END!"), Err(PlistError::BadHeader));
        assert_eq!(Value::parse(b"CFB0\x00END?"), Err(PlistError::BadFooter));
        assert_eq!(Value::parse(b"CFB0\x00"), Err(PlistError::BadFooter));
    }

    #[test]
    fn reject_trailing_garbage() {
        assert_eq!(Value::parse(b"CFB0\x00END!xx"), Err(PlistError::TrailingGarbage));
    }

    #[test]
    fn reject_unsupported_markers() {
        // 0x3 = date, 0x8 = UID, 0xB = set: none are spoken here
        for marker in [0x30u8, 0x80, 0xB0, 0xC0, 0x5A, 0x65] {
            let doc = [b"CFB0".as_slice(), &[marker], b"END!"].concat();
            assert_eq!(Value::parse(&doc), Err(PlistError::UnsupportedType(marker)));
        }
    }

    #[test]
    fn reject_excess_depth() {
        let mut value = Value::Integer(1);
        for _ in 0..MAX_DEPTH + 1 {
            value = Value::Array(vec![value]);
        }
        assert_eq!(Value::parse(&value.compose()), Err(PlistError::MaxDepthExceeded));
    }

    #[test]
    fn depth_limit_admits_max_depth() {
        let mut value = Value::Integer(1);
        for _ in 0..MAX_DEPTH - 1 {
            value = Value::Array(vec![value]);
        }
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn reject_truncated_value() {
        assert!(matches!(
            Value::parse(b"CFB0\x12\x01\x02END!"),
            Err(PlistError::UnexpectedEnd(_) | PlistError::BadFooter)
        ));
    }

    fn arbitrary_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<u64>().prop_map(Value::Integer),
            any::<f32>().prop_filter("finite", |f| f.is_finite()).prop_map(|f| Value::Real(f64::from(f))),
            prop::collection::vec(any::<u8>(), 0..40).prop_map(Value::Data),
            "[a-zA-Z0-9 _.-]{0,24}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,8}", inner), 0..6).prop_map(|entries| {
                    Value::Dict(
                        entries
                            .into_iter()
                            .map(|(k, v)| (Value::String(k), v))
                            .collect(),
                    )
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn compose_parse_round_trip(value in arbitrary_value()) {
            prop_assert_eq!(round_trip(&value), value);
        }
    }
}

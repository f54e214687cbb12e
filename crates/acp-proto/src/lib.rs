//! Wire formats for the ACP base-station management protocol.
//!
//! ACP exchanges fixed 128-byte checksummed headers with optional bodies
//! over a single TCP connection (port 5009 by default). This crate holds
//! every byte-level codec the protocol needs and nothing else: no sockets,
//! no crypto state, no policy. Higher layers (`acp-session`, `acp-client`,
//! `acp-server`) compose these codecs into live exchanges.
//!
//! # Modules
//!
//! - [`checksum`]: the Adler-32 primitive used by headers, bodies and
//!   firmware images
//! - [`keystream`]: password-field obfuscation for pre-encryption frames
//! - [`command`]: the command enumeration carried in message headers
//! - [`message`]: 128-byte header packing/parsing and message composition
//! - [`property`]: the typed 12-byte-header property element codec and the
//!   static property registry
//! - [`cflbinary`]: the compact binary plist dialect carried by
//!   authenticate/monitor/RPC/feature bodies
//! - [`monitor`]: the unsolicited `"XE"` event frame codec
//! - [`payloads`]: typed views over the plist payloads of specific commands

pub mod checksum;
pub mod cflbinary;
pub mod command;
pub mod error;
pub mod keystream;
pub mod message;
pub mod monitor;
pub mod payloads;
pub mod property;
pub mod status;

pub use checksum::adler32;
pub use cflbinary::Value;
pub use command::Command;
pub use error::ProtocolError;
pub use keystream::{HEADER_KEY_LEN, generate_header_key, keystream};
pub use message::{HEADER_SIZE, Message, MessageHeader};
pub use monitor::{MONITOR_HEADER_SIZE, MonitorFrameHeader};
pub use property::{ELEMENT_HEADER_SIZE, PropName, Property, PropertyValue, ValueKind};

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

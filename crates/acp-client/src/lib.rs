//! High-level ACP client.
//!
//! [`Client`] wraps a [`acp_session::Session`] with the operations an
//! operator actually wants: read and write typed properties, subscribe to
//! change events, call remote procedures, fetch features and logs,
//! reboot, and flash firmware. Every operation runs as one queued
//! exchange, so callers can share a client across tasks without
//! interleaving requests.
//!
//! Authentication is a single call: [`Client::authenticate`] runs the
//! SRP exchange and flips the session into encrypted operation
//! transparently. Operations before authentication carry the obfuscated
//! password in the message header, matching what stations expect.

pub mod client;
pub mod error;

mod auth;

pub use client::{Client, DEFAULT_PORT, PropertyReply, SetStatus};
pub use error::ClientError;

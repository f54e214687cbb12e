//! Cryptographic primitives for ACP sessions.
//!
//! Three concerns live here, all pure: random material is supplied by the
//! caller, which keeps every function deterministic and directly testable.
//!
//! - [`keys`]: stretching the SRP shared secret into the two per-direction
//!   AES keys
//! - [`cipher`]: the paired AES-128-CTR streams that wrap a session once
//!   authentication completes
//! - [`srp`]: the SRP-6a exchange (1536-bit group, SHA-1) both peers run
//!   to prove the password and agree on the shared secret

pub mod cipher;
pub mod keys;
pub mod srp;

pub use cipher::{Role, SessionCipher};
pub use keys::{SessionKeys, derive_session_keys};
pub use srp::{SrpClient, SrpError, SrpServer};

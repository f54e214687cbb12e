//! TCP session transport for ACP.
//!
//! A [`Session`] owns one TCP connection and everything stateful about
//! it: the receive buffer, the optional encryption context, and the FIFO
//! queue that keeps request/response exchanges from interleaving. Both
//! the client and the test station are built on this type; only the
//! encryption roles differ.
//!
//! See [`session`] for the concurrency model.

pub mod error;
pub mod session;

pub use error::SessionError;
pub use session::{DEFAULT_TIMEOUT, Exchange, ReadState, Session};

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SessionError>;

//! Session error types.

use acp_proto::ProtocolError;
use thiserror::Error;

/// Errors from session transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No socket; the session was never connected or has been closed.
    #[error("session is not connected")]
    NotConnected,

    /// The connection attempt did not succeed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// A read deadline passed. The session stays usable.
    #[error("timed out waiting for data")]
    Timeout,

    /// The session closed underneath a pending operation.
    #[error("session closed while operation was pending")]
    Canceled,

    /// The session is dedicated to monitor events; no further exchanges
    /// can be queued on it.
    #[error("session is in monitor mode")]
    Monitoring,

    /// Encryption is installed once per session and never rotated.
    #[error("session encryption is already enabled")]
    EncryptionAlreadyEnabled,

    /// Framing-level failure; the receive buffer is dropped as
    /// desynchronized but the session stays open.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Socket-level failure; the session is closed.
    #[error("i/o failure: {0}")]
    Io(String),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

//! Server error types.

use acp_proto::ProtocolError;
use acp_session::SessionError;
use thiserror::Error;

/// Errors from server operations.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Could not bind the listener.
    #[error("bind failed: {0}")]
    Bind(String),

    /// Transport failure on a connection.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Frame codec failure outside the session's own parsing.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Listener-level I/O failure.
    #[error("i/o failure: {0}")]
    Io(String),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

//! Client error types.

use acp_proto::{Command, ProtocolError, cflbinary::PlistError, property::PropertyError};
use acp_session::SessionError;
use acp_crypto::SrpError;
use thiserror::Error;

/// Errors surfaced by client operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Transport-level failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Wire-format failure outside the session's own parsing.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Plist body failure.
    #[error(transparent)]
    Payload(#[from] PlistError),

    /// Typed property failure, including per-property status codes.
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// SRP failure. A proof mismatch reported by this variant is fatal
    /// for the session; reconnect before retrying.
    #[error("authentication failed: {0}")]
    Auth(#[from] SrpError),

    /// The station rejected the password. The socket stays usable and
    /// authentication may be retried on it.
    #[error("station rejected the password")]
    IncorrectPassword,

    /// The station answered with a different command than asked.
    #[error("station answered {got} to a {expected} request")]
    UnexpectedCommand {
        /// Command of the request.
        expected: Command,
        /// Command of the response.
        got: Command,
    },

    /// The station set a failure code in the response header.
    #[error("station returned error code {0}")]
    ErrorCode(i32),

    /// A remote call completed with a non-zero status.
    #[error("remote call failed with status {0}")]
    RpcFailed(u64),

    /// A response body was missing or had the wrong shape.
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),
}

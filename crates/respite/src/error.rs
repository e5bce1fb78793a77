//! Unified error type for respite.

use respite_protocol::ProtocolError;
use respite_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Transports report protocol violations inside
/// [`TransportError::Protocol`]; the `Protocol` variant here carries errors
/// from encoding or decoding done directly with `respite_protocol`.
#[derive(Debug, thiserror::Error)]
pub enum RespiteError {
    /// A transport-level error (cancel, abort, socket fault).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed frame, unencodable value).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl RespiteError {
    /// The operation was canceled, now or by an earlier abandoned call.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Canceled))
    }

    /// The connection is gone: closed by the peer, closed locally or aborted.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Aborted))
    }

    /// The peer sent bytes that are not valid RESP.
    pub fn is_protocol_violation(&self) -> bool {
        let err = match self {
            Self::Protocol(err) | Self::Transport(TransportError::Protocol(err)) => err,
            Self::Transport(_) => return false,
        };
        !err.is_incomplete() && !matches!(err, ProtocolError::Io(_))
    }
}

impl From<std::io::Error> for RespiteError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.into())
    }
}

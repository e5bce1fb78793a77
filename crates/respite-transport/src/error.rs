use respite_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The operation was abandoned before it finished.
    ///
    /// The read (or write) position of the transport is no longer known;
    /// every later operation in that direction fails the same way until
    /// the transport is closed.
    #[error("operation canceled")]
    Canceled,

    /// The peer closed the channel, or the transport was torn down while
    /// an operation was outstanding. Terminal for the transport.
    #[error("connection aborted")]
    Aborted,

    /// The operating system reported a socket error.
    #[error("socket error (os error {code})")]
    Socket { code: i32 },

    /// The peer sent bytes that are not valid RESP. Terminal.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The underlying byte stream failed.
    #[error("i/o error: {0}")]
    Io(std::io::Error),

    /// A caller passed an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A completion result was requested before the operation finished.
    #[error("operation has not completed")]
    NotCompleted,

    /// A single frame outgrew the receive buffer limit.
    #[error("frame exceeds {max} bytes (buffered {len})")]
    FrameTooLarge { len: usize, max: usize },

    /// A received frame was leaked instead of released, so the read cursor
    /// cannot advance.
    #[error("previous frame was never released")]
    FrameNotReleased,
}

impl From<std::io::Error> for TransportError {
    /// Disconnects (reset, broken pipe, early EOF) map to [`Aborted`].
    ///
    /// [`Aborted`]: TransportError::Aborted
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof => Self::Aborted,
            _ => Self::Io(err),
        }
    }
}

impl TransportError {
    /// Returns the OS error behind a [`TransportError::Socket`].
    pub fn os_error(&self) -> Option<std::io::Error> {
        match self {
            Self::Socket { code } => Some(std::io::Error::from_raw_os_error(*code)),
            _ => None,
        }
    }
}

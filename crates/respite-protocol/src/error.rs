//! Error types for the protocol layer.
//!
//! Every variant except [`ProtocolError::Incomplete`] is a protocol
//! violation: the byte stream can no longer be trusted and the connection
//! carrying it has to be closed.

/// Errors that can occur while encoding or decoding RESP frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The input ends before the frame does.
    ///
    /// Nothing was consumed. Buffer more bytes and retry from the same
    /// frame start. Transports never surface this to callers.
    #[error("incomplete frame")]
    Incomplete,

    /// The leading byte is not a known frame marker.
    #[error("invalid frame marker: 0x{0:02x}")]
    InvalidMarker(u8),

    /// A length or count prefix is negative without being a null sentinel.
    #[error("invalid length prefix: {0}")]
    InvalidLength(i64),

    /// An integer line or length prefix is not a valid decimal `i64`.
    #[error("invalid integer")]
    InvalidInteger,

    /// A double line is not a valid floating point literal.
    #[error("invalid double")]
    InvalidDouble,

    /// A boolean line is neither `t` nor `f`.
    #[error("invalid boolean")]
    InvalidBoolean,

    /// A big number line is not an optionally signed run of digits.
    #[error("invalid big number")]
    InvalidBigNumber,

    /// A RESP3 null carries a payload.
    #[error("invalid null frame")]
    InvalidNull,

    /// A verbatim string payload lacks its `xxx:` format prefix.
    #[error("invalid verbatim string")]
    InvalidVerbatim,

    /// A length-prefixed payload is not followed by CRLF.
    #[error("missing CRLF terminator")]
    MissingCrlf,

    /// A line-terminated payload grew past the line limit without a CRLF.
    #[error("line too long: {len} bytes (max {max})")]
    LineTooLong { len: usize, max: usize },

    /// A bulk payload length exceeds the bulk limit.
    #[error("bulk payload too large: {len} bytes (max {max})")]
    BulkTooLarge { len: usize, max: usize },

    /// Aggregates are nested deeper than the decoder allows.
    #[error("aggregate nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    /// A simple string, error or big number to encode contains CR or LF.
    #[error("line payload contains CR or LF")]
    InvalidSimpleString,

    /// I/O failure reported through the `tokio_util` codec adapter.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns `true` for the "need more bytes" control signal.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_is_not_a_violation() {
        assert!(ProtocolError::Incomplete.is_incomplete());
        assert!(!ProtocolError::InvalidMarker(b'?').is_incomplete());
    }

    #[test]
    fn test_display_includes_marker_hex() {
        let err = ProtocolError::InvalidMarker(b'?');
        assert_eq!(err.to_string(), "invalid frame marker: 0x3f");
    }
}

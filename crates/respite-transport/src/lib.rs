//! Transport layer for respite.
//!
//! Provides the [`Transport`] trait that moves whole RESP frames over a
//! channel, plus its implementations:
//!
//! - [`SocketTransport`]: a connected `std::net::TcpStream` driven by the
//!   allocation-free [`SocketAwaitable`] completion source (Unix only)
//! - [`StreamTransport`]: any `tokio` `AsyncRead + AsyncWrite` stream
//! - [`FramedTransport`]: a `tokio_util` `Framed` stream with `RespCodec`
//!
//! Received frames come back wrapped in a [`Lifetime`]: they may borrow the
//! transport's receive buffer and must be released (or dropped) before the
//! next read.
//!
//! # Feature Flags
//!
//! - `framed` (default): [`FramedTransport`] via `tokio-util`

#![allow(async_fn_in_trait)]

mod awaitable;
mod buffer;
mod config;
mod error;
#[cfg(feature = "framed")]
mod framed;
mod lifetime;
#[cfg(unix)]
mod socket;
mod stream;

pub use awaitable::{SUCCESS, SocketAwaitable, Wait};
pub use config::TransportConfig;
pub use error::TransportError;
#[cfg(feature = "framed")]
pub use framed::FramedTransport;
pub use lifetime::{Lifetime, Release};
#[cfg(unix)]
pub use socket::{ABORT_CODE, AbortHandle, SocketTransport};
pub use stream::StreamTransport;

use std::fmt;

use respite_protocol::RespValue;

/// Identifier a connection carries in its log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A bidirectional channel carrying RESP frames.
///
/// One read and one write may be in flight at a time. A read or write whose
/// future is dropped before completion poisons that direction: later calls
/// fail with [`TransportError::Canceled`].
pub trait Transport: Send + 'static {
    /// Encodes `value` and writes all of its bytes.
    async fn write_frame(&mut self, value: &RespValue<'_>) -> Result<(), TransportError>;

    /// Reads exactly one frame.
    ///
    /// The returned frame may alias the receive buffer; the transport stays
    /// borrowed until it is released or dropped.
    async fn read_frame(&mut self) -> Result<Lifetime<'_, RespValue<'_>>, TransportError>;

    /// Tears the channel down, failing anything in flight. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_formats_for_logs() {
        let id = ConnectionId::new(7);
        assert_eq!(id.into_inner(), 7);
        assert_eq!(id.to_string(), "conn-7");
    }
}

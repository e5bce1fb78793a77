//! The connection facade and its builder.

use std::sync::atomic::{AtomicU64, Ordering};

use respite_protocol::{RespCodec, RespValue};
use respite_transport::{
    ConnectionId, FramedTransport, Lifetime, StreamTransport, Transport, TransportConfig,
    TransportError,
};
#[cfg(unix)]
use respite_transport::{AbortHandle, SocketTransport};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::RespiteError;
use crate::blocking;

/// Global counter for assigning unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A client connection exchanging RESP frames over a [`Transport`].
///
/// Offers both calling styles over the same transport:
///
/// - [`send`](Self::send) / [`receive`](Self::receive) block the calling
///   thread, finishing inline when the socket completes synchronously.
/// - [`send_async`](Self::send_async) / [`receive_async`](Self::receive_async)
///   suspend, and honor a [`CancellationToken`].
///
/// Received frames may alias the receive buffer; release (or drop) each
/// one before receiving the next.
#[derive(Debug)]
pub struct RespConnection<T> {
    transport: T,
    id: ConnectionId,
    closed: bool,
}

impl<T: Transport> RespConnection<T> {
    /// Wraps an already constructed transport.
    pub fn new(transport: T) -> Self {
        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, "connection opened");
        Self {
            transport,
            id,
            closed: false,
        }
    }

    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sends one frame, blocking until all of its bytes are handed off.
    pub fn send(&mut self, value: &RespValue<'_>) -> Result<(), RespiteError> {
        let result = blocking::wait(self.transport.write_frame(value));
        if let Err(e) = &result {
            log_failure(self.id, "send", e);
        }
        Ok(result?)
    }

    /// Receives one frame, blocking until it has fully arrived.
    pub fn receive(&mut self) -> Result<Lifetime<'_, RespValue<'_>>, RespiteError> {
        let id = self.id;
        let result = blocking::wait(self.transport.read_frame());
        if let Err(e) = &result {
            log_failure(id, "receive", e);
        }
        Ok(result?)
    }

    /// Sends one frame.
    ///
    /// Returns [`TransportError::Canceled`] if `cancel` fires first. A send
    /// canceled part way leaves the outgoing stream in an unknown state, so
    /// later sends fail with `Canceled` too.
    pub async fn send_async(
        &mut self,
        value: &RespValue<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), RespiteError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Canceled.into());
        }
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Canceled),
            result = self.transport.write_frame(value) => result,
        };
        if let Err(e) = &result {
            log_failure(self.id, "send", e);
        }
        Ok(result?)
    }

    /// Receives one frame.
    ///
    /// Returns [`TransportError::Canceled`] if `cancel` fires before the
    /// frame has fully arrived. Bytes of an interrupted frame may already be
    /// consumed, so later receives fail with `Canceled` too.
    pub async fn receive_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Lifetime<'_, RespValue<'_>>, RespiteError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Canceled.into());
        }
        let id = self.id;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Canceled),
            result = self.transport.read_frame() => result,
        };
        if let Err(e) = &result {
            log_failure(id, "receive", e);
        }
        Ok(result?)
    }

    /// Closes the transport. Idempotent.
    pub async fn close(&mut self) -> Result<(), RespiteError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.transport.close().await?;
        tracing::debug!(id = %self.id, "connection closed");
        Ok(())
    }

    /// Blocking counterpart of [`close`](Self::close).
    pub fn close_blocking(&mut self) -> Result<(), RespiteError> {
        blocking::wait(self.close())
    }
}

fn log_failure(id: ConnectionId, op: &'static str, err: &TransportError) {
    match err {
        TransportError::Protocol(e) => {
            tracing::warn!(%id, op, error = %e, "protocol violation, connection unusable");
        }
        e => tracing::debug!(%id, op, error = %e, "operation failed"),
    }
}

#[cfg(unix)]
impl RespConnection<SocketTransport> {
    /// Creates a connection over a connected TCP socket.
    pub fn from_socket(socket: std::net::TcpStream) -> Result<Self, RespiteError> {
        ConnectionBuilder::new().socket(socket)
    }

    /// Returns a handle that aborts this connection from any thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.transport.abort_handle()
    }
}

impl<S> RespConnection<StreamTransport<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a connection over an async byte stream.
    pub fn from_stream(stream: S) -> Self {
        ConnectionBuilder::new().stream(stream)
    }
}

impl<S> RespConnection<FramedTransport<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a connection over a `tokio_util` framed stream.
    pub fn from_framed(framed: Framed<S, RespCodec>) -> Self {
        Self::new(FramedTransport::from_framed(framed))
    }
}

/// Builder for configuring a [`RespConnection`].
///
/// # Example
///
/// ```rust,no_run
/// use respite::prelude::*;
///
/// # fn main() -> Result<(), RespiteError> {
/// let socket = std::net::TcpStream::connect("127.0.0.1:6379")?;
/// let mut conn = ConnectionBuilder::new()
///     .receive_buffer_size(64 * 1024)
///     .socket(socket)?;
/// conn.send(&RespValue::command(["PING"]))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    config: TransportConfig,
}

impl ConnectionBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial receive buffer size.
    pub fn receive_buffer_size(mut self, bytes: usize) -> Self {
        self.config.receive_buffer_size = bytes;
        self
    }

    /// Sets the largest frame the receive buffer may grow to hold.
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.config.max_frame_size = bytes;
        self
    }

    /// Sets `TCP_NODELAY` for socket connections.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Replaces the whole transport configuration.
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    #[cfg(unix)]
    pub fn socket(self, socket: std::net::TcpStream) -> Result<RespConnection<SocketTransport>, RespiteError> {
        let transport = SocketTransport::with_config(socket, &self.config)?;
        Ok(RespConnection::new(transport))
    }

    pub fn stream<S>(self, stream: S) -> RespConnection<StreamTransport<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        RespConnection::new(StreamTransport::with_config(stream, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    #[test]
    fn test_connection_ids_are_unique() {
        let (a, _) = duplex(16);
        let (b, _) = duplex(16);
        let first = RespConnection::from_stream(a);
        let second = RespConnection::from_stream(b);
        assert_ne!(first.id(), second.id());
        assert!(first.id().into_inner() > 0);
    }

    #[test]
    fn test_builder_applies_config() {
        let builder = ConnectionBuilder::new()
            .receive_buffer_size(1024)
            .max_frame_size(4096)
            .nodelay(false);
        assert_eq!(
            builder.config,
            TransportConfig {
                receive_buffer_size: 1024,
                max_frame_size: 4096,
                nodelay: false,
            }
        );
    }

    #[tokio::test]
    async fn test_already_canceled_token_skips_io() {
        let (client, mut server) = duplex(64);
        let mut conn = RespConnection::from_stream(client);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = conn
            .send_async(&RespValue::command(["PING"]), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_canceled());
        drop(conn);

        let mut written = Vec::new();
        server.read_to_end(&mut written).await.unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_close_twice_is_ok() {
        let (client, _server) = duplex(64);
        let mut conn = RespConnection::from_stream(client);
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.is_closed());

        let err = conn
            .receive_async(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_aborted());
    }
}

use futures_util::{SinkExt, StreamExt};
use respite_protocol::{ProtocolError, RespCodec, RespValue};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::buffer::OpState;
use crate::{Lifetime, Transport, TransportError};

/// [`Transport`] over a `tokio_util` [`Framed`] stream using [`RespCodec`].
///
/// Frames are decoded into owned values, so they are returned detached and
/// releasing them is a no-op.
#[derive(Debug)]
pub struct FramedTransport<S> {
    framed: Framed<S, RespCodec>,
    reader: OpState,
    writer: OpState,
    closed: bool,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        Self::from_framed(Framed::new(stream, RespCodec))
    }

    pub fn from_framed(framed: Framed<S, RespCodec>) -> Self {
        Self {
            framed,
            reader: OpState::Idle,
            writer: OpState::Idle,
            closed: false,
        }
    }
}

fn stream_error(err: ProtocolError) -> TransportError {
    match err {
        ProtocolError::Io(e) => e.into(),
        other => TransportError::Protocol(other),
    }
}

impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_frame(&mut self, value: &RespValue<'_>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Aborted);
        }
        self.writer.begin()?;
        match self.framed.send(value).await {
            Ok(()) => {
                self.writer.finish();
                Ok(())
            }
            // The encoder validates before writing anything.
            Err(e @ (ProtocolError::InvalidSimpleString | ProtocolError::InvalidBigNumber)) => {
                self.writer.finish();
                Err(e.into())
            }
            Err(e) => {
                self.writer.fault();
                Err(stream_error(e))
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Lifetime<'_, RespValue<'_>>, TransportError> {
        if self.closed {
            return Err(TransportError::Aborted);
        }
        self.reader.begin()?;
        match self.framed.next().await {
            Some(Ok(value)) => {
                self.reader.finish();
                Ok(Lifetime::detached(value))
            }
            Some(Err(e)) => {
                self.reader.fault();
                Err(stream_error(e))
            }
            None => {
                self.reader.fault();
                Err(TransportError::Aborted)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        SinkExt::<&RespValue<'_>>::close(&mut self.framed)
            .await
            .map_err(stream_error)?;
        tracing::debug!("framed transport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, duplex};

    #[tokio::test]
    async fn test_framed_round_trip() {
        let (client, server) = duplex(256);
        let mut left = FramedTransport::new(client);
        let mut right = FramedTransport::new(server);

        left.write_frame(&RespValue::command(["ECHO", "hi"]))
            .await
            .unwrap();
        let frame = right.read_frame().await.unwrap();
        assert_eq!(frame.as_slice().map(<[_]>::len), Some(2));
        frame.release();
    }

    #[tokio::test]
    async fn test_framed_eof_is_aborted() {
        let (client, mut server) = duplex(64);
        let mut transport = FramedTransport::new(client);
        server.write_all(b"+partial").await.unwrap();
        server.shutdown().await.unwrap();
        drop(server);

        assert!(matches!(
            transport.read_frame().await,
            Err(TransportError::Aborted)
        ));
        assert!(matches!(
            transport.read_frame().await,
            Err(TransportError::Aborted)
        ));
    }

    #[tokio::test]
    async fn test_framed_clean_eof_is_aborted() {
        let (client, server) = duplex(64);
        let mut transport = FramedTransport::new(client);
        drop(server);
        assert!(matches!(
            transport.read_frame().await,
            Err(TransportError::Aborted)
        ));
    }

    #[tokio::test]
    async fn test_framed_violation_is_protocol_error() {
        let (client, mut server) = duplex(64);
        let mut transport = FramedTransport::new(client);
        server.write_all(b"?\r\n").await.unwrap();
        assert!(matches!(
            transport.read_frame().await,
            Err(TransportError::Protocol(ProtocolError::InvalidMarker(b'?')))
        ));
        assert!(matches!(
            transport.read_frame().await,
            Err(TransportError::Aborted)
        ));
    }
}

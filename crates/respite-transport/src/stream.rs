//! Transport over any tokio byte stream.
//!
//! Shares [`ReceiveBuffer`] with the socket transport, so frames are
//! scanned in place and handed out aliasing the buffer. A peer that hangs
//! up or resets the stream surfaces as [`TransportError::Aborted`].

use respite_protocol::RespValue;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::buffer::{OpState, ReceiveBuffer};
use crate::{Lifetime, Transport, TransportConfig, TransportError};

/// [`Transport`] over any async byte stream: a `tokio::net::TcpStream`, a
/// TLS stream, a Unix socket or an in-memory duplex.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
    buffer: ReceiveBuffer,
    send_buffer: Vec<u8>,
    writer: OpState,
    closed: bool,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, &TransportConfig::default())
    }

    pub fn with_config(stream: S, config: &TransportConfig) -> Self {
        Self {
            stream,
            buffer: ReceiveBuffer::new(config),
            send_buffer: Vec::new(),
            writer: OpState::Idle,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    async fn send_encoded(&mut self) -> Result<(), TransportError> {
        let mut written = 0;
        while written < self.send_buffer.len() {
            let n = self.stream.write(&self.send_buffer[written..]).await?;
            if n == 0 {
                return Err(TransportError::Aborted);
            }
            written += n;
        }
        self.stream.flush().await?;
        Ok(())
    }

    async fn fill_frame(&mut self) -> Result<usize, TransportError> {
        loop {
            if let Some(len) = self.buffer.complete_frame()? {
                return Ok(len);
            }
            self.buffer.reserve()?;
            let n = self.stream.read(self.buffer.spare_mut()).await?;
            if n == 0 {
                return Err(TransportError::Aborted);
            }
            self.buffer.commit(n);
        }
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_frame(&mut self, value: &RespValue<'_>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Aborted);
        }
        self.writer.begin()?;
        self.send_buffer.clear();
        if let Err(e) = respite_protocol::encode(value, &mut self.send_buffer) {
            self.writer.finish();
            return Err(e.into());
        }
        match self.send_encoded().await {
            Ok(()) => {
                self.writer.finish();
                tracing::trace!(bytes = self.send_buffer.len(), "frame written");
                Ok(())
            }
            Err(e) => {
                self.writer.fault();
                Err(e)
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Lifetime<'_, RespValue<'_>>, TransportError> {
        if self.closed {
            return Err(TransportError::Aborted);
        }
        self.buffer.begin()?;
        match self.fill_frame().await {
            Ok(len) => self.buffer.finish(len),
            Err(e) => {
                self.buffer.fault();
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.fault();
        self.writer.fault();
        match self.stream.shutdown().await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!("stream transport closed");
        Ok(())
    }
}

//! # respite
//!
//! Client-side connection core for the Redis serialization protocol
//! (RESP2 and RESP3).
//!
//! A [`RespConnection`] wraps a transport and exchanges whole frames with a
//! server. Every operation exists in a blocking and an async flavor; on a
//! socket connection the blocking flavor completes inline whenever the
//! kernel can satisfy the call right away.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use respite::prelude::*;
//!
//! # async fn run() -> Result<(), RespiteError> {
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:6379").await?;
//! let mut conn = RespConnection::from_stream(stream);
//! let cancel = CancellationToken::new();
//!
//! conn.send_async(&RespValue::command(["PING"]), &cancel).await?;
//! let reply = conn.receive_async(&cancel).await?;
//! assert_eq!(reply.as_bytes(), Some(&b"PONG"[..]));
//! reply.release();
//! # Ok(())
//! # }
//! ```

mod blocking;
mod connection;
mod error;

pub use connection::{ConnectionBuilder, RespConnection};
pub use error::RespiteError;

pub use respite_protocol as protocol;
pub use respite_transport as transport;

/// Common imports for respite users.
pub mod prelude {
    pub use crate::{ConnectionBuilder, RespConnection, RespiteError};
    pub use respite_protocol::{FrameKind, ProtocolError, RespValue};
    #[cfg(unix)]
    pub use respite_transport::{AbortHandle, SocketTransport};
    pub use respite_transport::{
        ConnectionId, FramedTransport, Lifetime, StreamTransport, Transport, TransportConfig,
        TransportError,
    };
    pub use tokio_util::sync::CancellationToken;
}

//! Sends `PING` to a RESP server, first blocking over a raw socket, then
//! async over a tokio stream.
//!
//! ```text
//! RESPITE_ADDR=127.0.0.1:6379 RUST_LOG=respite=debug cargo run --example ping
//! ```

use respite::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> Result<(), RespiteError> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = std::env::var("RESPITE_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string());

    #[cfg(unix)]
    {
        let socket = std::net::TcpStream::connect(&addr)?;
        let mut conn = RespConnection::from_socket(socket)?;
        let id = conn.id();
        conn.send(&RespValue::command(["PING"]))?;
        let reply = conn.receive()?;
        let value: &RespValue<'_> = &reply;
        tracing::info!(%id, reply = ?value, "blocking ping");
        reply.release();
        conn.close_blocking()?;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let stream = tokio::net::TcpStream::connect(&addr).await?;
        let mut conn = RespConnection::from_stream(stream);
        let id = conn.id();
        let cancel = CancellationToken::new();

        conn.send_async(&RespValue::command(["HELLO", "3"]), &cancel)
            .await?;
        let hello = conn.receive_async(&cancel).await?.into_owned();
        tracing::info!(kind = %hello.kind(), "hello");

        conn.send_async(&RespValue::command(["PING", "async"]), &cancel)
            .await?;
        let reply = conn.receive_async(&cancel).await?;
        let value: &RespValue<'_> = &reply;
        tracing::info!(%id, reply = ?value, "async ping");
        drop(reply);
        conn.close().await?;
        Ok::<_, RespiteError>(())
    })
}

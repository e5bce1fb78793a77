//! Wire protocol for respite.
//!
//! This crate defines what travels over a RESP connection:
//!
//! - **Frames** ([`RespValue`], [`FrameKind`]): one decoded protocol unit,
//!   RESP2 kinds plus the RESP3 additions.
//! - **Codec** ([`encode`], [`decode`], [`frame_len`]): stateless conversion
//!   between frames and bytes. Decoded byte payloads borrow from the input.
//! - **Errors** ([`ProtocolError`]): malformed input, plus the internal
//!   [`ProtocolError::Incomplete`] signal used by buffering read loops.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets or buffers it does not
//! own. Transports feed it byte slices and decide what to do when a slice
//! does not yet hold a whole frame.
//!
//! ```text
//! Transport (bytes) → Protocol (RespValue) → Connection (Lifetime<RespValue>)
//! ```
//!
//! # Feature Flags
//!
//! - `codec` (default): [`RespCodec`], a `tokio_util::codec` adapter

mod codec;
mod error;
mod frame;

pub use codec::{MAX_BULK_LEN, MAX_DEPTH, MAX_LINE_LEN, decode, encode, frame_len};
#[cfg(feature = "codec")]
pub use codec::RespCodec;
pub use error::ProtocolError;
pub use frame::{FrameKind, RespValue};

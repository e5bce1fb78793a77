//! Receive buffering and per-direction operation state.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use respite_protocol::{ProtocolError, RespValue, frame_len};

use crate::{Lifetime, Release, TransportConfig, TransportError};

/// Progress of one direction (read or write) of a transport.
///
/// An operation that is dropped mid-flight leaves the direction `Busy`;
/// the next call then observes the cancellation instead of continuing from
/// an unknown stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum OpState {
    #[default]
    Idle,
    Busy,
    Faulted,
}

impl OpState {
    pub(crate) fn begin(&mut self) -> Result<(), TransportError> {
        match *self {
            Self::Idle => {
                *self = Self::Busy;
                Ok(())
            }
            Self::Busy => Err(TransportError::Canceled),
            Self::Faulted => Err(TransportError::Aborted),
        }
    }

    pub(crate) fn finish(&mut self) {
        *self = Self::Idle;
    }

    pub(crate) fn fault(&mut self) {
        *self = Self::Faulted;
    }
}

/// Tracks the frame currently handed out to a caller.
#[derive(Debug, Default)]
struct FrameLease {
    outstanding: AtomicBool,
    released: AtomicUsize,
}

impl Release for FrameLease {
    fn release(&self, consumed: usize) {
        self.released.fetch_add(consumed, Ordering::AcqRel);
        self.outstanding.store(false, Ordering::Release);
    }
}

/// Growable receive buffer that hands out frames aliasing its storage.
///
/// Layout: `data[start..end]` holds received bytes not yet consumed,
/// `data[end..]` is free space for the next receive.
#[derive(Debug)]
pub(crate) struct ReceiveBuffer {
    data: Vec<u8>,
    start: usize,
    end: usize,
    max_frame_size: usize,
    state: OpState,
    lease: FrameLease,
}

impl ReceiveBuffer {
    pub(crate) fn new(config: &TransportConfig) -> Self {
        Self {
            data: vec![0; config.receive_buffer_size.max(64)],
            start: 0,
            end: 0,
            max_frame_size: config.max_frame_size,
            state: OpState::Idle,
            lease: FrameLease::default(),
        }
    }

    /// Starts a read: reclaims the space of the previously released frame
    /// and marks the direction busy.
    pub(crate) fn begin(&mut self) -> Result<(), TransportError> {
        if self.state == OpState::Idle && self.lease.outstanding.load(Ordering::Acquire) {
            return Err(TransportError::FrameNotReleased);
        }
        self.state.begin()?;
        self.start += self.lease.released.swap(0, Ordering::AcqRel);
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
        Ok(())
    }

    /// Length of the first complete frame in the unread bytes, or `None`
    /// if more bytes are needed.
    pub(crate) fn complete_frame(&self) -> Result<Option<usize>, TransportError> {
        match frame_len(&self.data[self.start..self.end]) {
            Ok(len) => Ok(Some(len)),
            Err(ProtocolError::Incomplete) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Guarantees free space after the unread bytes, compacting first and
    /// growing only when a single frame fills the whole buffer.
    pub(crate) fn reserve(&mut self) -> Result<(), TransportError> {
        if self.end < self.data.len() {
            return Ok(());
        }
        if self.start > 0 {
            self.data.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
            return Ok(());
        }
        let len = self.data.len();
        if len >= self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }
        let grown = len.saturating_mul(2).min(self.max_frame_size);
        tracing::trace!(from = len, to = grown, "growing receive buffer");
        self.data.resize(grown, 0);
        Ok(())
    }

    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    pub(crate) fn spare_range(&self) -> Range<usize> {
        self.end..self.data.len()
    }

    /// Marks `n` bytes of free space as received.
    pub(crate) fn commit(&mut self, n: usize) {
        debug_assert!(self.end + n <= self.data.len());
        self.end += n;
    }

    /// Lends the storage to an I/O operation running elsewhere.
    pub(crate) fn take_storage(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    pub(crate) fn restore_storage(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub(crate) fn fault(&mut self) {
        self.state.fault();
    }

    /// Ends the read by decoding the `len`-byte frame at the cursor. The
    /// frame borrows the buffer until released.
    pub(crate) fn finish(&mut self, len: usize) -> Result<Lifetime<'_, RespValue<'_>>, TransportError> {
        let decoded = respite_protocol::decode(&self.data[self.start..self.start + len]);
        if decoded.is_err() {
            self.state.fault();
        } else {
            self.state.finish();
        }
        let (value, _) = decoded?;
        self.lease.outstanding.store(true, Ordering::Release);
        Ok(Lifetime::new(value, &self.lease, len))
    }
}

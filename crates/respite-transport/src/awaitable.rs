//! Allocation-free completion source for one raw socket operation.
//!
//! A [`SocketAwaitable`] coordinates a single outstanding send or receive
//! with the task awaiting it. It is reused for every operation in its
//! direction, so awaiting a socket call costs no allocation.
//!
//! # Protocol
//!
//! ```text
//! issue ──► (pending) ──complete()/abort()──► COMPLETE ──get_result()──► idle
//!               ▲                                  │
//!               └──────── on_completed(waker) ─────┘ (wakes, never polls inline)
//! ```
//!
//! The continuation slot holds at most one [`Waker`]. Registration and
//! completion race from different threads; both go through compare-and-swap
//! on a single state word, and whichever side arrives second wakes the
//! continuation. Waking hands the task back to its executor, so a result
//! that is already available never recurses into the awaiting code.
//!
//! State bits:
//! - `REGISTERING`: a registrant owns the slot and is writing to it.
//! - `WAKING`: the completer owns the slot and is taking from it.
//! - `COMPLETE`: a result (or forced error) is ready.

use std::cell::UnsafeCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI32, AtomicU8, AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};

use crate::TransportError;

const REGISTERING: u8 = 0b001;
const WAKING: u8 = 0b010;
const COMPLETE: u8 = 0b100;

/// The "no error" code. [`SocketAwaitable::abort`] rejects it.
pub const SUCCESS: i32 = 0;

/// Completion source for a single in-flight socket operation.
pub struct SocketAwaitable {
    state: AtomicU8,
    continuation: UnsafeCell<Option<Waker>>,
    forced_error: AtomicI32,
    socket_error: AtomicI32,
    transferred: AtomicUsize,
}

// SAFETY: the continuation slot is only touched by the party holding the
// REGISTERING or WAKING bit, and only one party can hold either at a time.
unsafe impl Sync for SocketAwaitable {}

impl SocketAwaitable {
    /// Creates an idle completion source.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
            continuation: UnsafeCell::new(None),
            forced_error: AtomicI32::new(SUCCESS),
            socket_error: AtomicI32::new(SUCCESS),
            transferred: AtomicUsize::new(0),
        }
    }

    /// Returns `true` once a result or forced error is available.
    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) & COMPLETE != 0
    }

    /// Returns the error code passed to [`abort`](Self::abort), if any.
    pub fn forced_error(&self) -> Option<i32> {
        match self.forced_error.load(Ordering::Acquire) {
            SUCCESS => None,
            code => Some(code),
        }
    }

    /// Records the outcome of the operation: bytes transferred or an OS
    /// error code. Must precede [`complete`](Self::complete).
    pub fn set_result(&self, result: Result<usize, i32>) {
        match result {
            Ok(n) => {
                self.transferred.store(n, Ordering::Relaxed);
                self.socket_error.store(SUCCESS, Ordering::Relaxed);
            }
            Err(code) => {
                self.transferred.store(0, Ordering::Relaxed);
                self.socket_error.store(code, Ordering::Relaxed);
            }
        }
    }

    /// Registers the continuation to run when the operation completes.
    ///
    /// Replaces a previously registered waker. If the operation has already
    /// completed (or completes while registering), the waker is woken right
    /// away, which schedules the task instead of running it here.
    pub fn on_completed(&self, waker: Waker) {
        if self
            .state
            .compare_exchange(0, REGISTERING, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            // Complete already, or a concurrent registration holds the slot.
            waker.wake();
            return;
        }

        // SAFETY: REGISTERING is held, nobody else touches the slot.
        unsafe { *self.continuation.get() = Some(waker) };

        if self
            .state
            .compare_exchange(REGISTERING, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // The completer ran while we held the slot and left the wake to us.
            // SAFETY: REGISTERING is still held.
            let waker = unsafe { (*self.continuation.get()).take() };
            self.state.fetch_and(!REGISTERING, Ordering::AcqRel);
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }

    /// Completion callback: marks the operation complete and wakes the
    /// registered continuation, if any.
    ///
    /// Completing an already completed operation is a no-op.
    pub fn complete(&self) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & COMPLETE != 0 {
                return;
            }
            let next = if state == 0 {
                COMPLETE | WAKING
            } else {
                state | COMPLETE
            };
            match self
                .state
                .compare_exchange_weak(state, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => state = actual,
            }
        }

        if state == 0 {
            // SAFETY: WAKING is held, nobody else touches the slot.
            let waker = unsafe { (*self.continuation.get()).take() };
            self.state.fetch_and(!WAKING, Ordering::AcqRel);
            if let Some(waker) = waker {
                waker.wake();
            }
        }
        // Otherwise a registration is in flight and will see COMPLETE.
    }

    /// Consumes the result of the completed operation and resets the source
    /// for the next one.
    ///
    /// # Errors
    /// [`TransportError::Socket`] carrying the forced or OS error code, or
    /// [`TransportError::NotCompleted`] if called before completion.
    pub fn get_result(&self) -> Result<usize, TransportError> {
        loop {
            match self.state.compare_exchange_weak(
                COMPLETE,
                0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(state) if state & COMPLETE == 0 => return Err(TransportError::NotCompleted),
                // A wake hand-off is finishing, or the CAS failed spuriously.
                Err(_) => std::hint::spin_loop(),
            }
        }

        if let Some(code) = self.forced_error() {
            return Err(TransportError::Socket { code });
        }
        match self.socket_error.swap(SUCCESS, Ordering::Relaxed) {
            SUCCESS => Ok(self.transferred.swap(0, Ordering::Relaxed)),
            code => Err(TransportError::Socket { code }),
        }
    }

    /// Forces the current operation to complete with `code` and wakes any
    /// registered continuation.
    ///
    /// The forced error sticks: every later operation on this source
    /// completes with it immediately.
    ///
    /// # Errors
    /// [`TransportError::InvalidArgument`] if `code` is [`SUCCESS`].
    pub fn abort(&self, code: i32) -> Result<(), TransportError> {
        if code == SUCCESS {
            return Err(TransportError::InvalidArgument(
                "abort requires a non-success error code",
            ));
        }
        self.forced_error.store(code, Ordering::Release);
        self.complete();
        Ok(())
    }

    /// Returns a future resolving to [`get_result`](Self::get_result) once
    /// the operation completes.
    pub fn wait(&self) -> Wait<'_> {
        Wait { awaitable: self }
    }
}

impl Default for SocketAwaitable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SocketAwaitable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketAwaitable")
            .field("state", &self.state.load(Ordering::Relaxed))
            .field("forced_error", &self.forced_error())
            .finish_non_exhaustive()
    }
}

/// Await adapter returned by [`SocketAwaitable::wait`].
#[must_use = "futures do nothing unless polled"]
pub struct Wait<'a> {
    awaitable: &'a SocketAwaitable,
}

impl Future for Wait<'_> {
    type Output = Result<usize, TransportError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.awaitable.is_completed() {
            return Poll::Ready(self.awaitable.get_result());
        }
        self.awaitable.on_completed(cx.waker().clone());
        Poll::Pending
    }
}

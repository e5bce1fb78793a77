//! Transport over a connected TCP socket, driven by [`SocketAwaitable`].
//!
//! Every send and receive first tries the syscall without blocking. On a
//! request/response connection most sends, and any receive whose reply is
//! already buffered, finish right there and never leave the calling thread.
//!
//! When the kernel has nothing to give (or no room to take), how the
//! operation finishes depends on the caller:
//!
//! - inside a tokio runtime, a task waits on the reactor's readiness for the
//!   socket, retries the syscall and completes the awaitable. No thread is
//!   parked.
//! - without a runtime (the blocking facade on a plain thread), the
//!   operation is queued to a per-direction I/O thread that performs the
//!   blocking call.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::ops::Range;
use std::os::fd::AsRawFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;

use respite_protocol::RespValue;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::buffer::{OpState, ReceiveBuffer};
use crate::{Lifetime, SocketAwaitable, Transport, TransportConfig, TransportError};

/// Error code used to fail operations when a socket transport is torn down.
pub const ABORT_CODE: i32 = libc::ECONNABORTED;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Receive,
    Send,
}

impl Direction {
    fn thread_name(self) -> &'static str {
        match self {
            Self::Receive => "respite-recv",
            Self::Send => "respite-send",
        }
    }
}

#[derive(Debug, Default)]
struct IoBuffer {
    data: Vec<u8>,
    range: Range<usize>,
}

/// One direction's reusable operation: the completion source and the bytes
/// it reads into or writes from.
#[derive(Debug)]
struct Operation {
    direction: Direction,
    awaitable: SocketAwaitable,
    io: Mutex<IoBuffer>,
}

impl Operation {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            awaitable: SocketAwaitable::new(),
            io: Mutex::new(IoBuffer::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IoBuffer> {
        self.io.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, data: Vec<u8>, range: Range<usize>) {
        *self.lock() = IoBuffer { data, range };
    }

    fn advance(&self, range: Range<usize>) {
        self.lock().range = range;
    }

    /// Takes the storage back, unless an aborted call still holds it.
    fn unload(&self) -> Option<Vec<u8>> {
        match self.io.try_lock() {
            Ok(mut io) => Some(std::mem::take(&mut io.data)),
            Err(TryLockError::Poisoned(poisoned)) => {
                Some(std::mem::take(&mut poisoned.into_inner().data))
            }
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Attempts the syscall without blocking. `None` means it would block.
    fn try_now(&self, socket: &TcpStream) -> Option<Result<usize, i32>> {
        let mut io = self.lock();
        let IoBuffer { data, range } = &mut *io;
        let buf = &mut data[range.clone()];
        let fd = socket.as_raw_fd();
        // SAFETY: `buf` is a live, exclusively borrowed region of `buf.len()`
        // bytes for the duration of the call.
        let n = unsafe {
            match self.direction {
                Direction::Receive => {
                    libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), libc::MSG_DONTWAIT)
                }
                Direction::Send => libc::send(fd, buf.as_ptr().cast(), buf.len(), SEND_FLAGS),
            }
        };
        if n >= 0 {
            return Some(Ok(n as usize));
        }
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => None,
            _ => Some(Err(os_code(&err))),
        }
    }

    /// Performs the syscall, blocking the calling I/O thread.
    fn run_blocking(&self, socket: &TcpStream) -> Result<usize, i32> {
        let mut io = self.lock();
        let IoBuffer { data, range } = &mut *io;
        let buf = &mut data[range.clone()];
        let mut stream = socket;
        loop {
            let result = match self.direction {
                Direction::Receive => stream.read(buf),
                Direction::Send => stream.write(buf),
            };
            match result {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(os_code(&e)),
                Ok(n) => return Ok(n),
            }
        }
    }
}

fn os_code(err: &io::Error) -> i32 {
    err.raw_os_error().unwrap_or(libc::EIO)
}

/// Dedicated thread performing one direction's blocking calls.
#[derive(Debug)]
struct IoWorker {
    queue: mpsc::UnboundedSender<Arc<Operation>>,
}

impl IoWorker {
    fn spawn(direction: Direction, socket: Arc<TcpStream>) -> io::Result<Self> {
        let (queue, mut rx) = mpsc::unbounded_channel::<Arc<Operation>>();
        thread::Builder::new()
            .name(direction.thread_name().to_string())
            .spawn(move || {
                while let Some(op) = rx.blocking_recv() {
                    if op.awaitable.forced_error().is_none() {
                        let result = op.run_blocking(&socket);
                        op.awaitable.set_result(result);
                    }
                    op.awaitable.complete();
                }
                tracing::trace!(?direction, "socket i/o thread exiting");
            })?;
        tracing::debug!(?direction, "spawned socket i/o thread");
        Ok(Self { queue })
    }
}

/// The socket's registration with the tokio reactor, shared by both
/// directions.
///
/// The socket stays in blocking mode for the I/O threads; reactor-driven
/// retries pass `MSG_DONTWAIT` instead.
type Readiness = AsyncFd<Arc<TcpStream>>;

/// Completes an operation when the readiness task ends.
///
/// Runs on drop so that a task the runtime discards unpolled (at shutdown)
/// still releases the awaiting side.
struct ReadyCompletion {
    op: Arc<Operation>,
    result: Option<Result<usize, i32>>,
}

impl Drop for ReadyCompletion {
    fn drop(&mut self) {
        if self.op.awaitable.forced_error().is_none() {
            let result = self.result.take().unwrap_or(Err(ABORT_CODE));
            self.op.awaitable.set_result(result);
        }
        self.op.awaitable.complete();
    }
}

async fn complete_when_ready(op: Arc<Operation>, readiness: Arc<Readiness>) {
    let mut completion = ReadyCompletion { op, result: None };
    loop {
        let ready = match completion.op.direction {
            Direction::Receive => readiness.readable().await,
            Direction::Send => readiness.writable().await,
        };
        let mut guard = match ready {
            Ok(guard) => guard,
            Err(e) => {
                completion.result = Some(Err(os_code(&e)));
                return;
            }
        };
        if completion.op.awaitable.forced_error().is_some() {
            return;
        }
        match completion.op.try_now(readiness.get_ref()) {
            Some(result) => {
                completion.result = Some(result);
                return;
            }
            None => guard.clear_ready(),
        }
    }
}

/// Finishes operations the kernel could not complete immediately.
///
/// Both the reactor registration and the I/O threads are created on first
/// need.
#[derive(Debug, Default)]
struct Driver {
    readiness: Option<Arc<Readiness>>,
    receive_worker: Option<IoWorker>,
    send_worker: Option<IoWorker>,
}

impl Driver {
    /// Starts `op`; its outcome is observed through `op.awaitable`.
    fn issue(&mut self, op: &Arc<Operation>, socket: &Arc<TcpStream>) {
        if op.awaitable.forced_error().is_some() {
            op.awaitable.complete();
            return;
        }

        if let Some(result) = op.try_now(socket) {
            op.awaitable.set_result(result);
            op.awaitable.complete();
            return;
        }

        match Handle::try_current() {
            Ok(runtime) => self.await_readiness(&runtime, op, socket),
            Err(_) => self.hand_off(op, socket),
        }
    }

    fn await_readiness(&mut self, runtime: &Handle, op: &Arc<Operation>, socket: &Arc<TcpStream>) {
        let readiness = match &self.readiness {
            Some(readiness) => Arc::clone(readiness),
            None => {
                let interest = Interest::READABLE | Interest::WRITABLE;
                match AsyncFd::with_interest(Arc::clone(socket), interest) {
                    Ok(registered) => {
                        let registered = Arc::new(registered);
                        self.readiness = Some(Arc::clone(&registered));
                        tracing::debug!("socket registered with the tokio reactor");
                        registered
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "reactor registration failed, using an i/o thread");
                        self.hand_off(op, socket);
                        return;
                    }
                }
            }
        };
        runtime.spawn(complete_when_ready(Arc::clone(op), readiness));
    }

    fn hand_off(&mut self, op: &Arc<Operation>, socket: &Arc<TcpStream>) {
        let worker = match op.direction {
            Direction::Receive => &mut self.receive_worker,
            Direction::Send => &mut self.send_worker,
        };
        if worker.is_none() {
            match IoWorker::spawn(op.direction, Arc::clone(socket)) {
                Ok(spawned) => *worker = Some(spawned),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to spawn socket i/o thread");
                    op.awaitable.set_result(Err(os_code(&e)));
                    op.awaitable.complete();
                    return;
                }
            }
        }

        let queued = worker
            .as_ref()
            .is_some_and(|w| w.queue.send(Arc::clone(op)).is_ok());
        if !queued {
            op.awaitable.set_result(Err(ABORT_CODE));
            op.awaitable.complete();
        }
    }
}

/// [`Transport`] over a connected [`TcpStream`].
///
/// Socket errors surface as [`TransportError::Socket`]; teardown (via
/// [`close`](Transport::close), drop or an [`AbortHandle`]) fails anything in
/// flight with [`TransportError::Aborted`].
#[derive(Debug)]
pub struct SocketTransport {
    socket: Arc<TcpStream>,
    receive: Arc<Operation>,
    send: Arc<Operation>,
    driver: Driver,
    buffer: ReceiveBuffer,
    send_buffer: Vec<u8>,
    writer: OpState,
    closed: bool,
}

impl SocketTransport {
    /// Wraps `socket` with the default [`TransportConfig`].
    pub fn new(socket: TcpStream) -> io::Result<Self> {
        Self::with_config(socket, &TransportConfig::default())
    }

    pub fn with_config(socket: TcpStream, config: &TransportConfig) -> io::Result<Self> {
        socket.set_nonblocking(false)?;
        socket.set_nodelay(config.nodelay)?;
        tracing::debug!(peer = ?socket.peer_addr().ok(), "socket transport opened");
        Ok(Self {
            socket: Arc::new(socket),
            receive: Arc::new(Operation::new(Direction::Receive)),
            send: Arc::new(Operation::new(Direction::Send)),
            driver: Driver::default(),
            buffer: ReceiveBuffer::new(config),
            send_buffer: Vec::new(),
            writer: OpState::Idle,
            closed: false,
        })
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }

    /// Returns a handle that can tear the transport down from any thread.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            socket: Arc::clone(&self.socket),
            receive: Arc::clone(&self.receive),
            send: Arc::clone(&self.send),
        }
    }

    /// Translates a completion result, reporting teardown as `Aborted`.
    fn outcome(op: &Operation, result: Result<usize, TransportError>) -> Result<usize, TransportError> {
        match result {
            Ok(0) => Err(TransportError::Aborted),
            Ok(n) => Ok(n),
            Err(_) if op.awaitable.forced_error().is_some() => Err(TransportError::Aborted),
            Err(e) => Err(e),
        }
    }

    async fn receive_some(&mut self) -> Result<usize, TransportError> {
        let range = self.buffer.spare_range();
        self.receive.load(self.buffer.take_storage(), range);
        self.driver.issue(&self.receive, &self.socket);
        let result = self.receive.awaitable.wait().await;
        match self.receive.unload() {
            Some(data) => self.buffer.restore_storage(data),
            None => return Err(TransportError::Aborted),
        }
        Self::outcome(&self.receive, result)
    }

    async fn fill_frame(&mut self) -> Result<usize, TransportError> {
        loop {
            if let Some(len) = self.buffer.complete_frame()? {
                return Ok(len);
            }
            self.buffer.reserve()?;
            let n = self.receive_some().await?;
            self.buffer.commit(n);
        }
    }

    async fn send_loaded(&mut self, total: usize) -> Result<(), TransportError> {
        let mut written = 0;
        while written < total {
            if written > 0 {
                self.send.advance(written..total);
            }
            self.driver.issue(&self.send, &self.socket);
            let result = self.send.awaitable.wait().await;
            written += Self::outcome(&self.send, result)?;
        }
        Ok(())
    }

    fn shutdown(&mut self, reason: &'static str) {
        if self.closed {
            return;
        }
        self.closed = true;
        for op in [&self.receive, &self.send] {
            if let Err(e) = op.awaitable.abort(ABORT_CODE) {
                tracing::warn!(error = %e, "failed to abort socket operation");
            }
        }
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            tracing::trace!(error = %e, "socket shutdown");
        }
        // Dropping the queues lets the I/O threads exit; pending readiness
        // tasks wake on the shutdown and see the forced error.
        self.driver.receive_worker = None;
        self.driver.send_worker = None;
        tracing::debug!(reason, "socket transport closed");
    }
}

impl Transport for SocketTransport {
    async fn write_frame(&mut self, value: &RespValue<'_>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Aborted);
        }
        self.writer.begin()?;

        let mut data = std::mem::take(&mut self.send_buffer);
        data.clear();
        if let Err(e) = respite_protocol::encode(value, &mut data) {
            // Nothing reached the wire; the stream is still in sync.
            self.send_buffer = data;
            self.writer.finish();
            return Err(e.into());
        }
        let total = data.len();
        self.send.load(data, 0..total);

        let result = self.send_loaded(total).await;
        if let Some(data) = self.send.unload() {
            self.send_buffer = data;
        }
        match result {
            Ok(()) => {
                self.writer.finish();
                tracing::trace!(bytes = total, "frame sent");
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
        self.shutdown("closed");
        Ok(())
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.shutdown("dropped");
    }
}

/// Cross-thread handle that aborts a [`SocketTransport`].
///
/// Aborting fails both directions' current and future operations with
/// [`TransportError::Aborted`] and shuts the socket down.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    socket: Arc<TcpStream>,
    receive: Arc<Operation>,
    send: Arc<Operation>,
}

impl AbortHandle {
    pub fn abort(&self) {
        for op in [&self.receive, &self.send] {
            if let Err(e) = op.awaitable.abort(ABORT_CODE) {
                tracing::warn!(error = %e, "failed to abort socket operation");
            }
        }
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            tracing::trace!(error = %e, "socket shutdown");
        }
        tracing::warn!("socket transport aborted");
    }
}

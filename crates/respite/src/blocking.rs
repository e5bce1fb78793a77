//! Drives transport futures to completion on the calling thread.

use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll};

/// Runs `future` to completion, blocking the calling thread.
///
/// The first poll uses a no-op waker: an operation the socket finishes
/// synchronously returns here without touching an executor. Anything
/// still pending is handed to `futures::executor::block_on`, which parks
/// the thread until the completion wakes it.
///
/// Must not be called from inside an async runtime worker: the pending
/// operation waits on that runtime's reactor, which the parked worker can
/// no longer drive.
pub(crate) fn wait<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
        return output;
    }
    futures::executor::block_on(future)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_ready_future_completes_inline() {
        assert_eq!(wait(async { 7 }), 7);
    }

    #[test]
    fn test_pending_future_parks_until_woken() {
        let (tx, rx) = futures::channel::oneshot::channel();
        let sent = Arc::new(AtomicBool::new(false));
        let sender = {
            let sent = Arc::clone(&sent);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                sent.store(true, Ordering::SeqCst);
                tx.send("done").unwrap();
            })
        };

        assert_eq!(wait(rx).unwrap(), "done");
        assert!(sent.load(Ordering::SeqCst));
        sender.join().unwrap();
    }
}

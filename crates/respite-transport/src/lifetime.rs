//! Buffer-aliasing wrapper for received frames.

use std::fmt;
use std::ops::Deref;

use respite_protocol::RespValue;

/// Owner of the storage a [`Lifetime`] borrows from.
///
/// `release` is called exactly once per [`Lifetime`] created with
/// [`Lifetime::new`], with the token it was created with.
pub trait Release: Sync {
    fn release(&self, token: usize);
}

/// A value that may alias transport-owned storage, paired with the callback
/// that hands the storage back.
///
/// While the `Lifetime` is alive the transport cannot be read from again
/// (it is borrowed), so the aliased bytes stay valid. Releasing happens on
/// [`release`](Self::release) or on drop, whichever comes first, and never
/// twice.
pub struct Lifetime<'a, T> {
    value: T,
    guard: ReleaseGuard<'a>,
}

struct ReleaseGuard<'a> {
    owner: Option<(&'a dyn Release, usize)>,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if let Some((owner, token)) = self.owner.take() {
            owner.release(token);
        }
    }
}

impl<'a, T> Lifetime<'a, T> {
    /// Wraps `value`; `owner.release(token)` runs when the wrapper is
    /// released or dropped.
    pub fn new(value: T, owner: &'a dyn Release, token: usize) -> Self {
        Self {
            value,
            guard: ReleaseGuard {
                owner: Some((owner, token)),
            },
        }
    }

    /// Wraps a value that owns its storage. Releasing does nothing.
    pub fn detached(value: T) -> Self {
        Self {
            value,
            guard: ReleaseGuard { owner: None },
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Hands the storage back to its owner.
    pub fn release(self) {
        drop(self);
    }

    /// Transforms the wrapped value, keeping the release obligation.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lifetime<'a, U> {
        let Lifetime { value, guard } = self;
        Lifetime {
            value: f(value),
            guard,
        }
    }
}

impl Lifetime<'_, RespValue<'_>> {
    /// Copies the frame out of transport storage and releases it.
    pub fn into_owned(self) -> RespValue<'static> {
        let Lifetime { value, guard } = self;
        let owned = value.into_owned();
        drop(guard);
        owned
    }
}

impl<T> Deref for Lifetime<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Lifetime<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifetime")
            .field("value", &self.value)
            .field("detached", &self.guard.owner.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
        last_token: AtomicUsize,
    }

    impl Release for Counter {
        fn release(&self, token: usize) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_token.store(token, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_explicit_release_runs_callback_once() {
        let counter = Counter::default();
        let frame = Lifetime::new(RespValue::simple("OK"), &counter, 5);
        assert_eq!(frame.as_bytes(), Some(&b"OK"[..]));
        frame.release();
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(counter.last_token.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_drop_releases() {
        let counter = Counter::default();
        {
            let _frame = Lifetime::new(7_i64, &counter, 1);
        }
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_map_keeps_single_release() {
        let counter = Counter::default();
        let frame = Lifetime::new(RespValue::Integer(4), &counter, 3);
        let number = frame.map(|v| v.as_integer());
        assert_eq!(*number, Some(4));
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
        drop(number);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_into_owned_copies_then_releases() {
        let storage = b"payload".to_vec();
        let counter = Counter::default();
        let frame = Lifetime::new(RespValue::bulk(&storage[..]), &counter, 7);
        let owned = frame.into_owned();
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        drop(storage);
        assert_eq!(owned.as_bytes(), Some(&b"payload"[..]));
    }

    #[test]
    fn test_detached_release_is_noop() {
        let frame = Lifetime::detached(RespValue::Null);
        assert!(frame.value().is_null());
        frame.release();
    }
}

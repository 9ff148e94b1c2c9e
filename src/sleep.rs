//! # Cancellable Waits
//!
//! Every wait in crema (backoff delays, post-flush settle time) goes through
//! a [`Sleeper`] paired with a [`CancelToken`]. Tripping the token wakes the
//! waiter immediately with [`Interrupted`], which callers propagate instead of
//! retrying.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

/// A wait ended because its cancel token was tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait interrupted")]
pub struct Interrupted;

/// Cancellation flag shared between an operation and whoever may abandon it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token and wake every waiter.
    pub fn cancel(&self) {
        let (flag, signal) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail fast if the token has been tripped.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Block for `duration` unless the token is tripped first.
    pub fn wait(&self, duration: Duration) -> Result<(), Interrupted> {
        let (flag, signal) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if *cancelled {
                return Err(Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            cancelled = signal
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Something that can block the current thread for a while.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Interrupted>;
}

/// Production sleeper: parks the thread on the token's condition variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Interrupted> {
        if duration.is_zero() {
            return cancel.check();
        }
        cancel.wait(duration)
    }
}

/// A sleeper bound to the cancel token of one operation.
#[derive(Clone, Copy)]
pub struct Pacer<'a> {
    sleeper: &'a dyn Sleeper,
    cancel: &'a CancelToken,
}

impl<'a> Pacer<'a> {
    pub fn new(sleeper: &'a dyn Sleeper, cancel: &'a CancelToken) -> Self {
        Self { sleeper, cancel }
    }

    pub fn pause(&self, duration: Duration) -> Result<(), Interrupted> {
        self.sleeper.sleep(duration, self.cancel)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.cancel
    }
}

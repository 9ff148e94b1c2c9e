//! # Backoff Retry
//!
//! Bounded retry with exponentially growing, capped delays.
//!
//! ## Delay Schedule
//!
//! ```text
//! attempt 1      -> initial_delay
//! attempt a > 1  -> min(max_delay, initial_delay * multiplier^(a-1))
//! ```
//!
//! With the transmission defaults (300 ms, x2.0, cap 1500 ms) the waits after
//! attempts 1, 2, 3, 4 are 300, 600, 1200, 1500 ms.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PrinterError;
use crate::sleep::{Interrupted, Pacer};

/// Decides whether a failure may be attempted again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Serialized form of a policy, validated on conversion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawPolicy {
    max_attempts: u32,
    initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    multiplier: f64,
    max_delay_ms: Option<u64>,
}

fn default_multiplier() -> f64 {
    2.0
}

/// # Retry Policy
///
/// Immutable, validated retry parameters. Invalid combinations are rejected
/// at construction (and at deserialization), never deferred to first use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Discovery defaults: looser, longer delays.
    pub const DISCOVERY: Self = Self {
        max_attempts: 3,
        initial_delay: Duration::from_millis(500),
        multiplier: 1.5,
        max_delay: Duration::from_millis(2_000),
    };

    /// Transmission defaults: tighter, shorter delays.
    pub const TRANSMISSION: Self = Self {
        max_attempts: 3,
        initial_delay: Duration::from_millis(300),
        multiplier: 2.0,
        max_delay: Duration::from_millis(1_500),
    };

    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Result<Self, PrinterError> {
        if max_attempts == 0 {
            return Err(PrinterError::InvalidPolicy("max_attempts must be > 0".into()));
        }
        // NaN fails this comparison too.
        if !(multiplier >= 1.0) || multiplier.is_infinite() {
            return Err(PrinterError::InvalidPolicy(format!(
                "multiplier must be >= 1.0, got {multiplier}"
            )));
        }
        if max_delay < initial_delay {
            return Err(PrinterError::InvalidPolicy(format!(
                "max_delay ({max_delay:?}) must be >= initial_delay ({initial_delay:?})"
            )));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_delay,
        })
    }

    /// A policy with no growth: `max_delay == initial_delay`, multiplier 1.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Result<Self, PrinterError> {
        Self::new(max_attempts, delay, 1.0, delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay to wait after a failed `attempt` (1-based).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial_delay;
        }
        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let raw = initial_ms * self.multiplier.powi(exponent);
        // 0 * inf is NaN; a zero initial delay never grows.
        if raw.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_millis(raw.min(max_ms) as u64)
    }

    pub fn backoff(self) -> BackoffRetry {
        BackoffRetry::new(self)
    }
}

impl TryFrom<RawPolicy> for RetryPolicy {
    type Error = PrinterError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        let initial = Duration::from_millis(raw.initial_delay_ms);
        let max = raw.max_delay_ms.map(Duration::from_millis).unwrap_or(initial);
        RetryPolicy::new(raw.max_attempts, initial, raw.multiplier, max)
    }
}

impl From<RetryPolicy> for RawPolicy {
    fn from(policy: RetryPolicy) -> Self {
        RawPolicy {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            max_delay_ms: Some(policy.max_delay.as_millis() as u64),
        }
    }
}

/// # Backoff Retry
///
/// Runs a fallible block up to `max_attempts` times, sleeping between
/// attempts according to its [`RetryPolicy`].
///
/// ## Example
///
/// ```
/// use crema::retry::{RetryPolicy, BackoffRetry};
/// use crema::sleep::{CancelToken, Pacer, ThreadSleeper};
/// use crema::PrinterError;
/// use std::time::Duration;
///
/// let retry = BackoffRetry::new(RetryPolicy::fixed(3, Duration::ZERO)?);
/// let cancel = CancelToken::new();
/// let pacer = Pacer::new(&ThreadSleeper, &cancel);
///
/// let value = retry.run(&pacer, |attempt| {
///     if attempt < 2 { Err(PrinterError::NotConnected) } else { Ok(attempt) }
/// })?;
/// assert_eq!(value, 2);
/// # Ok::<(), PrinterError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffRetry {
    policy: RetryPolicy,
}

impl BackoffRetry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.policy.next_delay(attempt)
    }

    /// Execute `block(attempt)` until it succeeds or attempts run out.
    ///
    /// The last failure is returned unchanged. Failures that are not
    /// [`Retryable`] are returned immediately, and an interrupted wait aborts
    /// the loop with `E::from(Interrupted)`.
    pub fn run<T, E, F>(&self, pacer: &Pacer<'_>, mut block: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: Retryable + From<Interrupted> + std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match block(attempt) {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retryable() || attempt >= self.policy.max_attempts => {
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.next_delay(attempt);
                    debug!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "attempt failed, backing off"
                    );
                    pacer.pause(delay)?;
                    attempt += 1;
                }
            }
        }
    }
}

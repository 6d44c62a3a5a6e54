// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! Retry budget and backoff delay computation shared by exporters.
//!
//! Every export call computes a [`Deadline`] once at entry; each retry
//! consults the remaining budget rather than the original timeout, so the
//! sum of waits and attempts can never exceed the caller's SLA by more than
//! one in-flight attempt.
//!
//! Delay selection: a positive server-supplied `Retry-After` hint wins;
//! otherwise the delay is drawn uniformly from `[0, 2^retry_count)` seconds.
//! The draw carries no upper clamp near the ceiling; the deadline check
//! bounds what actually gets slept.

use std::time::{Duration, Instant};

use rand::Rng;

/// Attempt ceiling per export call. Once the counter reaches it, a
/// retryable outcome converts to a failure.
pub const MAX_EXPORT_ATTEMPTS: u32 = 5;

/// How long to wait before the next attempt.
///
/// `retry_count` is the number of attempts that have already failed within
/// this export call. `server_hint` is a parsed `Retry-After` value, honored
/// only when positive.
#[must_use]
pub fn backoff_delay(retry_count: u32, server_hint: Option<Duration>) -> Duration {
    if let Some(hint) = server_hint {
        if !hint.is_zero() {
            return hint;
        }
    }
    let ceiling = 2f64.powi(retry_count.min(31) as i32);
    let secs = rand::thread_rng().gen_range(0f64..ceiling);
    Duration::from_secs_f64(secs)
}

/// A fixed point in time bounding an operation and all of its sub-steps.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Deadline {
            at: Instant::now() + budget,
        }
    }

    /// Budget still available; zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Clamps a step duration to the remaining budget.
    #[must_use]
    pub fn clamp(&self, step: Duration) -> Duration {
        step.min(self.remaining())
    }

    /// Whether sleeping `delay` would still leave budget for an attempt.
    #[must_use]
    pub fn fits(&self, delay: Duration) -> bool {
        delay < self.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_server_hint_wins() {
        let hint = Duration::from_secs(7);
        assert_eq!(backoff_delay(3, Some(hint)), hint);
    }

    #[test]
    fn zero_hint_falls_back_to_jitter() {
        let delay = backoff_delay(1, Some(Duration::ZERO));
        assert!(delay < Duration::from_secs(2));
    }

    #[test]
    fn jitter_stays_under_exponential_ceiling() {
        for retry_count in 1..=MAX_EXPORT_ATTEMPTS {
            for _ in 0..50 {
                let delay = backoff_delay(retry_count, None);
                let ceiling = Duration::from_secs(1 << retry_count);
                assert!(
                    delay < ceiling,
                    "retry {} produced {:?}, ceiling {:?}",
                    retry_count,
                    delay,
                    ceiling
                );
            }
        }
    }

    #[test]
    fn deadline_clamps_steps_to_remaining_budget() {
        let deadline = Deadline::after(Duration::from_millis(100));
        assert!(deadline.clamp(Duration::from_secs(30)) <= Duration::from_millis(100));
        assert!(!deadline.expired());
        assert!(deadline.fits(Duration::from_millis(10)));
        assert!(!deadline.fits(Duration::from_secs(1)));
    }

    #[test]
    fn deadline_expires() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert_eq!(deadline.clamp(Duration::from_secs(1)), Duration::ZERO);
    }
}

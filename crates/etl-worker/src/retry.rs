//! Retry and backoff policy for the delivery loop
//!
//! Decides how long the loop pauses after an empty poll or a failed cycle,
//! and whether a failed message is left for redelivery or dead-lettered.

use std::time::Duration;

use crate::error::ErrorClass;

/// What to do with a message whose processing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Leave it on the queue; it reappears after the visibility window
    Retain,
    /// Move it to the dead-letter queue and remove it from the main queue
    DeadLetter,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Pause after a poll that returned no message
    pub idle_pause: Duration,
    /// Pause after the first failed cycle
    pub failure_backoff: Duration,
    /// Upper bound for the failure pause
    pub max_failure_backoff: Duration,
    /// Deliveries after which a transiently failing message is dead-lettered
    pub max_receive_count: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            idle_pause: Duration::from_secs(1),
            failure_backoff: Duration::from_secs(2),
            max_failure_backoff: Duration::from_secs(30),
            max_receive_count: 5,
        }
    }
}

impl RetryPolicy {
    /// Pause after `consecutive_failures` failed cycles in a row.
    ///
    /// Doubles from `failure_backoff` and saturates at `max_failure_backoff`.
    pub fn failure_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (consecutive_failures - 1).min(16);
        self.failure_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_failure_backoff)
    }

    pub fn disposition(
        &self,
        class: ErrorClass,
        receive_count: u32,
        dead_letter_available: bool,
    ) -> Disposition {
        if !dead_letter_available {
            return Disposition::Retain;
        }
        match class {
            ErrorClass::Permanent => Disposition::DeadLetter,
            ErrorClass::Transient if receive_count >= self.max_receive_count => {
                Disposition::DeadLetter
            },
            ErrorClass::Transient => Disposition::Retain,
        }
    }
}

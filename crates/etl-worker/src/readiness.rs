//! Startup readiness gate
//!
//! Dependencies (queue, database) may come up after the worker does. The gate
//! probes a dependency a bounded number of times and either returns the
//! resolved handle or fails with [`WorkerError::DependencyUnavailable`].

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};

#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    max_attempts: u32,
    interval: Duration,
}

impl ReadinessGate {
    /// `max_attempts` is clamped to at least one probe.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Invoke `probe` until it succeeds or the attempts run out.
    ///
    /// Sleeps `interval` between failed attempts, not after the last one.
    pub async fn wait_until_ready<T, E, F, Fut>(
        &self,
        dependency: &str,
        mut probe: F,
    ) -> WorkerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            debug!(dependency, attempt, max_attempts = self.max_attempts, "Probing dependency");

            match probe().await {
                Ok(value) => {
                    info!(dependency, attempt, "Dependency ready");
                    return Ok(value);
                },
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        dependency,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %last_error,
                        "Dependency not ready"
                    );
                },
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(WorkerError::DependencyUnavailable {
            dependency: dependency.to_string(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}

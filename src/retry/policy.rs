//! Declarative retry policy and its executor

use crate::error::{Classify, Error, FailureKind, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Generic "retry" policy.
///
/// - `max_attempts`: the maximum number of attempts before giving up
/// - `max_delay`: delay, in seconds, above which we give up (0 = unbounded)
/// - `wait_time`: time, in seconds, between each attempt (0 = no wait)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryPolicy {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Give up once this many seconds have elapsed
    pub max_delay: f64,
    /// Seconds to wait between attempts
    pub wait_time: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            max_delay: 0.0,
            wait_time: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy bounded by attempt count only
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the delay bound (seconds)
    #[must_use]
    pub fn with_max_delay(mut self, seconds: f64) -> Self {
        self.max_delay = seconds;
        self
    }

    /// Set the fixed wait between attempts (seconds)
    #[must_use]
    pub fn with_wait_time(mut self, seconds: f64) -> Self {
        self.wait_time = seconds;
        self
    }

    /// Check the policy invariants
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::validation(
                "RetryPolicy",
                "max_attempts must be at least 1",
            ));
        }
        for (field, value) in [("max_delay", self.max_delay), ("wait_time", self.wait_time)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::validation(
                    "RetryPolicy",
                    format!("{field} must be a non-negative number of seconds, got {value}"),
                ));
            }
        }
        Ok(())
    }

    /// Stopping condition: attempt count OR elapsed delay, whichever hits first
    pub fn stop_condition(&self) -> Option<StopCondition> {
        let max_attempts = (self.max_attempts > 1).then_some(self.max_attempts);
        let max_delay = (self.max_delay > 0.0).then(|| Duration::from_secs_f64(self.max_delay));
        if max_attempts.is_none() && max_delay.is_none() {
            return None;
        }
        Some(StopCondition {
            max_attempts,
            max_delay,
        })
    }

    /// Fixed wait between attempts
    pub fn wait_condition(&self) -> Option<Duration> {
        (self.wait_time > 0.0).then(|| Duration::from_secs_f64(self.wait_time))
    }

    /// Build the executor corresponding to this policy.
    ///
    /// Returns `None` when neither a stop, a wait nor a filter condition is
    /// configured: the operation should then simply run once. The `logger`
    /// scope is only attached when a failure-kind filter is configured.
    ///
    /// An executor without a stop condition never retries forever: it stops
    /// after a single attempt.
    pub fn compile(&self, retry_on: &[FailureKind], logger: Option<&str>) -> Option<Retrying> {
        let stop = self.stop_condition();
        let wait = self.wait_condition();
        let retry_on = (!retry_on.is_empty()).then(|| retry_on.to_vec());

        if stop.is_none() && wait.is_none() && retry_on.is_none() {
            return None;
        }

        Some(Retrying {
            stop: stop.unwrap_or(StopCondition {
                max_attempts: Some(1),
                max_delay: None,
            }),
            wait,
            after: retry_on
                .as_ref()
                .and(logger)
                .map(ToString::to_string),
            retry_on,
        })
    }
}

/// Stopping condition of a compiled policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopCondition {
    /// Stop once this many attempts were made
    pub max_attempts: Option<u32>,
    /// Stop once this much time has elapsed since the first attempt
    pub max_delay: Option<Duration>,
}

impl StopCondition {
    /// Whether to give up after `attempt` attempts and `elapsed` time
    pub fn should_stop(&self, attempt: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
            || self.max_delay.is_some_and(|max| elapsed >= max)
    }
}

/// Executable retry wrapper produced by [`RetryPolicy::compile`]
#[derive(Debug, Clone)]
pub struct Retrying {
    stop: StopCondition,
    wait: Option<Duration>,
    retry_on: Option<Vec<FailureKind>>,
    after: Option<String>,
}

impl Retrying {
    /// The stopping condition in effect
    pub fn stop(&self) -> StopCondition {
        self.stop
    }

    /// Whether a failure of this kind may be retried
    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        self.retry_on
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&kind))
    }

    /// Run `op` until it succeeds, a non-retryable failure occurs, or the stop
    /// condition is met. The last failure is returned unchanged.
    ///
    /// Blocks the calling thread for the configured wait between attempts.
    pub fn call<T, E, F>(&self, mut op: F) -> std::result::Result<T, E>
    where
        E: Classify + std::fmt::Display,
        F: FnMut() -> std::result::Result<T, E>,
    {
        let start = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let error = match op() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let kind = error.failure_kind();
            if !self.is_retryable(kind) {
                return Err(error);
            }

            if let Some(logger) = &self.after {
                debug!(
                    logger = %logger,
                    attempt,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    kind = %kind,
                    error = %error,
                    "Finished attempt, will retry unless stopped"
                );
            }

            if self.stop.should_stop(attempt, start.elapsed()) {
                if attempt > 1 {
                    warn!(
                        "Giving up after {} attempts in {:?}: {}",
                        attempt,
                        start.elapsed(),
                        error
                    );
                }
                return Err(error);
            }

            if let Some(wait) = self.wait {
                std::thread::sleep(wait);
            }
        }
    }
}

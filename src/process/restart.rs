use crate::error::PolicyError;
use crate::process::types::{ExitEvent, ProcessSpec};
use std::time::Duration;

/// Cap on exponential backoff when none is configured
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Restart policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    /// Delay before the first restart in a failure streak
    pub base_delay: Duration,
    /// Give up once a streak grows beyond this many failures
    pub max_consecutive_failures: usize,
    /// Failures older than this (relative to the newest exit) do not count
    pub failure_window: Duration,
    /// A run at least this long resets the failure streak
    pub healthy_run: Duration,
    /// Backoff strategy to use
    pub backoff: BackoffStrategy,
}

impl RestartPolicy {
    /// Create a new restart policy with default values
    pub fn new() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_consecutive_failures: 5,
            failure_window: Duration::from_secs(60),
            healthy_run: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential {
                max_delay: DEFAULT_MAX_DELAY,
            },
        }
    }

    /// Count the failure streak ending at the newest exit.
    ///
    /// Walks newest-first and stops at the first healthy run or at the
    /// first exit outside the failure window.
    pub fn consecutive_failures(&self, history: &[ExitEvent]) -> Result<usize, PolicyError> {
        let newest = history.last().ok_or(PolicyError::EmptyHistory)?;

        let count = history
            .iter()
            .rev()
            .take_while(|event| {
                let age = newest
                    .timestamp
                    .duration_since(event.timestamp)
                    .unwrap_or(Duration::from_secs(0));
                age <= self.failure_window && event.run_duration() < self.healthy_run
            })
            .count();

        Ok(count)
    }

    /// Evaluate the policy, surfacing internal errors
    pub fn evaluate(&self, history: &[ExitEvent]) -> Result<RestartDecision, PolicyError> {
        let failures = self.consecutive_failures(history)?;

        if failures == 0 {
            return Ok(RestartDecision::RestartNow);
        }

        if failures > self.max_consecutive_failures {
            return Ok(RestartDecision::GiveUp(GiveUpReason::TooManyFailures {
                failures,
            }));
        }

        Ok(RestartDecision::RestartAfter(
            self.backoff.calculate_delay(self.base_delay, failures - 1),
        ))
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff strategy for restart delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between restarts
    Fixed,
    /// Exponential backoff with maximum delay
    Exponential { max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay for the given restart attempt (zero-based)
    pub fn calculate_delay(&self, base_delay: Duration, attempt: usize) -> Duration {
        match self {
            BackoffStrategy::Fixed => base_delay,
            BackoffStrategy::Exponential { max_delay } => {
                // delay = base * 2^attempt
                let factor = 2_u32.saturating_pow(attempt.min(u32::MAX as usize) as u32);
                base_delay.saturating_mul(factor).min(*max_delay)
            }
        }
    }
}

/// What to do after a process exits
#[derive(Debug, Clone, PartialEq)]
pub enum RestartDecision {
    RestartNow,
    RestartAfter(Duration),
    GiveUp(GiveUpReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GiveUpReason {
    PolicyDisabled,
    TooManyFailures { failures: usize },
    Policy(PolicyError),
}

impl std::fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GiveUpReason::PolicyDisabled => write!(f, "auto-restart disabled"),
            GiveUpReason::TooManyFailures { failures } => {
                write!(f, "too many failures ({} consecutive)", failures)
            }
            GiveUpReason::Policy(e) => write!(f, "restart policy error: {}", e),
        }
    }
}

/// Decide how to follow up on the newest exit in `history`
pub fn decide(spec: &ProcessSpec, history: &[ExitEvent]) -> RestartDecision {
    if !spec.auto_restart {
        return RestartDecision::GiveUp(GiveUpReason::PolicyDisabled);
    }

    spec.restart
        .evaluate(history)
        .unwrap_or_else(|e| RestartDecision::GiveUp(GiveUpReason::Policy(e)))
}

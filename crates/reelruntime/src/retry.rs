use reelcore::{ErrorHandling, RunOptions};
use std::time::Duration;

/// What to do after a node invocation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Fail the run.
    Stop,
    /// Record the failure and let the rest of the run proceed.
    Continue,
    /// Invoke the node again after `delay`.
    Retry { delay: Duration },
    /// Retry policy ran out of attempts; fails the run like `Stop`.
    Exhausted,
}

/// A run's error policy, resolved from its options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub handling: ErrorHandling,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl ErrorPolicy {
    pub fn new(options: &RunOptions, base_delay: Duration) -> Self {
        Self {
            handling: options.error_handling,
            max_retries: options.max_retries,
            base_delay,
        }
    }

    /// Decide the follow-up to a failure of invocation number `attempt`
    /// (zero for the first call).
    pub fn decide(&self, attempt: u32) -> FailureAction {
        match self.handling {
            ErrorHandling::Stop => FailureAction::Stop,
            ErrorHandling::Continue => FailureAction::Continue,
            ErrorHandling::Retry if attempt < self.max_retries => FailureAction::Retry {
                delay: self.backoff(attempt),
            },
            ErrorHandling::Retry => FailureAction::Exhausted,
        }
    }

    /// `2^attempt * base`, saturating.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(20);
        self.base_delay.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(handling: ErrorHandling, max_retries: u32) -> ErrorPolicy {
        ErrorPolicy {
            handling,
            max_retries,
            base_delay: Duration::from_millis(1000),
        }
    }

    #[test]
    fn stop_and_continue_ignore_attempts() {
        assert_eq!(policy(ErrorHandling::Stop, 3).decide(0), FailureAction::Stop);
        assert_eq!(
            policy(ErrorHandling::Continue, 3).decide(5),
            FailureAction::Continue
        );
    }

    #[test]
    fn retry_doubles_delay_until_exhausted() {
        let policy = policy(ErrorHandling::Retry, 3);
        let delays: Vec<_> = (0..3)
            .map(|attempt| match policy.decide(attempt) {
                FailureAction::Retry { delay } => delay.as_millis(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000]);
        assert_eq!(policy.decide(3), FailureAction::Exhausted);
    }

    #[test]
    fn zero_retries_exhausts_immediately() {
        assert_eq!(
            policy(ErrorHandling::Retry, 0).decide(0),
            FailureAction::Exhausted
        );
    }

    #[test]
    fn backoff_saturates() {
        let policy = ErrorPolicy {
            handling: ErrorHandling::Retry,
            max_retries: u32::MAX,
            base_delay: Duration::MAX,
        };
        assert_eq!(policy.backoff(40), Duration::MAX);
    }
}

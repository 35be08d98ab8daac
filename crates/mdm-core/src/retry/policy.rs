//! Retry-or-fail decision with linear backoff.

use std::time::Duration;

use super::classify::ErrorCategory;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given delay.
    Retry { delay: Duration },
    /// Give up; the category is what the user gets told.
    Fail(ErrorCategory),
}

/// Pure decision function: (attempt number, error category) → retry or fail.
///
/// Backoff grows linearly (`attempt × base_delay`), deliberately not
/// exponential: with a small attempt budget the total wait stays bounded and
/// predictable.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first. Valid range 1–10.
    pub max_attempts: u32,
    /// Backoff unit; attempt N waits N × this.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Build a policy, clamping `max_attempts` into the supported 1–10 range.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, 10),
            base_delay,
        }
    }

    /// Decide for a failed attempt. `attempt` is 1-based; once it reaches
    /// `max_attempts` the answer is `Fail` regardless of category.
    pub fn decide(&self, attempt: u32, category: ErrorCategory) -> RetryDecision {
        if !category.is_transient() {
            return RetryDecision::Fail(category);
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Fail(category);
        }
        RetryDecision::Retry {
            delay: self.base_delay.saturating_mul(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_error_gets_exactly_max_attempts() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.decide(1, ErrorCategory::Network),
            RetryDecision::Retry {
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(
            p.decide(2, ErrorCategory::Network),
            RetryDecision::Retry {
                delay: Duration::from_secs(4)
            }
        );
        assert_eq!(
            p.decide(3, ErrorCategory::Network),
            RetryDecision::Fail(ErrorCategory::Network),
            "third failure is final and keeps the category"
        );
    }

    #[test]
    fn backoff_is_linear_in_attempt_number() {
        let p = RetryPolicy::new(10, Duration::from_millis(500));
        for attempt in 1..=9 {
            match p.decide(attempt, ErrorCategory::Unknown) {
                RetryDecision::Retry { delay } => {
                    assert_eq!(delay, Duration::from_millis(500) * attempt)
                }
                other => panic!("expected retry, got {other:?}"),
            }
        }
    }

    #[test]
    fn non_transient_fails_immediately() {
        let p = RetryPolicy::default();
        for cat in [
            ErrorCategory::Storage,
            ErrorCategory::Configuration,
            ErrorCategory::AccessDenied,
            ErrorCategory::NotFound,
            ErrorCategory::ContentUnavailable,
        ] {
            assert_eq!(p.decide(1, cat), RetryDecision::Fail(cat));
        }
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let p = RetryPolicy::new(1, Duration::from_secs(2));
        assert_eq!(
            p.decide(1, ErrorCategory::Network),
            RetryDecision::Fail(ErrorCategory::Network)
        );
    }

    #[test]
    fn new_clamps_attempts_into_range() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::new(99, Duration::ZERO).max_attempts, 10);
    }
}

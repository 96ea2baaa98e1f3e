use std::time::Duration;

use crate::config::ChatConfig;
use crate::errors::StreamError;

/// Where a logical send stands.
///
/// `Sending(0)` is the start; a retryable failure moves to
/// `Sending(attempt + 1)`, anything else ends in `Success` or `Reported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Sending { attempt: u32 },
    Success,
    Reported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.backoff_base(),
        }
    }

    /// Delay before retrying after failed attempt `attempt`: `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Retry only transient transport failures, only while attempts remain,
    /// and never once anything reached the message.
    pub fn decide(&self, error: &StreamError, attempt: u32, delivered: bool) -> RetryDecision {
        if attempt >= self.max_retries || delivered || !error.is_transient() {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.backoff(attempt),
        }
    }

    /// Next state after `attempt` failed with `error`.
    pub fn next_state(&self, error: &StreamError, attempt: u32, delivered: bool) -> SendState {
        match self.decide(error, attempt, delivered) {
            RetryDecision::Retry { .. } => SendState::Sending {
                attempt: attempt + 1,
            },
            RetryDecision::GiveUp => SendState::Reported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NetworkErrorKind;

    fn lost() -> StreamError {
        StreamError::network(NetworkErrorKind::ConnectionLost, "lost")
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_transient_errors_retry_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(&lost(), 0, false),
            RetryDecision::Retry {
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            policy.decide(&lost(), 1, false),
            RetryDecision::Retry {
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(policy.decide(&lost(), 2, false), RetryDecision::GiveUp);
    }

    #[test]
    fn test_no_retry_after_delivery() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(&lost(), 0, true), RetryDecision::GiveUp);
    }

    #[test]
    fn test_terminal_errors_never_retry() {
        let policy = RetryPolicy::default();
        for error in [
            StreamError::HttpStatus(503),
            StreamError::InvalidRequest("bad".into()),
            StreamError::network(NetworkErrorKind::DnsFailure, "dns"),
            StreamError::network(NetworkErrorKind::TlsFailure, "cert"),
            StreamError::network(NetworkErrorKind::InsecureTransport, "ats"),
            StreamError::network(NetworkErrorKind::Other, "??"),
        ] {
            assert_eq!(policy.decide(&error, 0, false), RetryDecision::GiveUp);
        }
    }

    #[test]
    fn test_state_transitions() {
        let policy = RetryPolicy::default();
        let timeout = StreamError::network(NetworkErrorKind::TimedOut, "slow");
        assert_eq!(
            policy.next_state(&timeout, 0, false),
            SendState::Sending { attempt: 1 }
        );
        assert_eq!(policy.next_state(&timeout, 2, false), SendState::Reported);
        assert_eq!(
            policy.next_state(&StreamError::HttpStatus(401), 0, false),
            SendState::Reported
        );
    }
}

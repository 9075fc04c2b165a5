//! Retry/fallback policy
//!
//! Pure decision logic over a failure kind and the session's retry counter.
//! A conflicting server-side session gets exactly one grace-period retry;
//! transient failures get a doubling, capped backoff schedule up to the
//! configured attempt limit.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::signaling::SignalingErrorKind;

/// Failure classification fed into the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Request could not be sent, no response, or server error
    Network,
    /// Explicit rejection (session conflict or other 4xx)
    ServerRejected,
    /// No expected event within its bound
    Timeout,
    /// Peer handle reported failed/disconnected, or media setup failed
    Media,
}

impl From<SignalingErrorKind> for FailureKind {
    fn from(kind: SignalingErrorKind) -> Self {
        match kind {
            SignalingErrorKind::Network => FailureKind::Network,
            SignalingErrorKind::ServerRejected => FailureKind::ServerRejected,
            SignalingErrorKind::Timeout => FailureKind::Timeout,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Network => write!(f, "network"),
            FailureKind::ServerRejected => write!(f, "server-rejected"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Media => write!(f, "media"),
        }
    }
}

/// Next action for a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Release the peer handle, wait, re-negotiate
    Retry { delay: Duration },
    /// Ask the server to release its side, then give up
    TeardownThenFail,
    /// Give up
    Fail,
}

/// Retry/fallback policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Decide the next action for a failure observed at `retry_count`
    /// prior retries.
    pub fn decide(&self, kind: FailureKind, retry_count: u32) -> RetryDecision {
        match kind {
            FailureKind::ServerRejected if retry_count == 0 => RetryDecision::Retry {
                delay: Duration::from_millis(self.config.grace_period_ms),
            },
            // A second rejection means the conflicting session is stuck;
            // have the server drop it so a later start can succeed.
            FailureKind::ServerRejected => RetryDecision::TeardownThenFail,
            _ if retry_count < self.config.max_retries => RetryDecision::Retry {
                delay: self.backoff(retry_count),
            },
            _ => RetryDecision::Fail,
        }
    }

    /// Backoff delay for the (retry_count + 1)-th attempt: doubles from the
    /// configured base, capped at the ceiling.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exp = retry_count.min(16);
        let ms = self
            .config
            .initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.config.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries: 2,
            grace_period_ms: 2000,
            initial_backoff_ms: 500,
            max_backoff_ms: 15_000,
        })
    }

    #[test]
    fn conflict_gets_one_grace_retry() {
        let p = policy();
        assert_eq!(
            p.decide(FailureKind::ServerRejected, 0),
            RetryDecision::Retry {
                delay: Duration::from_millis(2000)
            }
        );
        assert_eq!(
            p.decide(FailureKind::ServerRejected, 1),
            RetryDecision::TeardownThenFail
        );
    }

    #[test]
    fn transient_failures_retry_until_limit() {
        let p = policy();
        assert!(matches!(
            p.decide(FailureKind::Network, 0),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            p.decide(FailureKind::Timeout, 1),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(p.decide(FailureKind::Network, 2), RetryDecision::Fail);
        assert_eq!(p.decide(FailureKind::Media, 2), RetryDecision::Fail);
    }

    #[test]
    fn backoff_is_strictly_increasing_up_to_cap() {
        let p = policy();
        let delays: Vec<_> = (0..4).map(|n| p.backoff(n)).collect();
        assert_eq!(delays[0], Duration::from_millis(500));
        assert_eq!(delays[1], Duration::from_millis(1000));
        assert_eq!(delays[2], Duration::from_millis(2000));
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn backoff_caps_at_ceiling() {
        let p = policy();
        assert_eq!(p.backoff(10), Duration::from_millis(15_000));
        // Large counters must not overflow the shift
        assert_eq!(p.backoff(u32::MAX), Duration::from_millis(15_000));
    }

    #[test]
    fn disconnect_is_treated_like_network() {
        let p = policy();
        assert_eq!(
            p.decide(FailureKind::Media, 0),
            p.decide(FailureKind::Network, 0)
        );
    }
}

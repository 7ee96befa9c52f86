//! Error classification and per-provider retry budget.

use automatosx_types::{Error, ErrorKind};
use std::time::Duration;

const RETRYABLE_SUBSTRINGS: &[&str] = &[
    "rate_limit",
    "overloaded",
    "timeout",
    "connection",
    "internal_server",
    "econnreset",
    "econnrefused",
    "etimedout",
    "enotfound",
];

const FATAL_SUBSTRINGS: &[&str] = &["authentication", "api key", "not found", "permission denied"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Fatal,
}

/// Classifies an error by `ErrorKind` first (the router's own typed
/// errors), falling back to substring matching on the message the way
/// an opaque subprocess backend's stderr would need to be classified.
pub fn classify(err: &Error) -> Classification {
    match err.kind() {
        ErrorKind::ProviderRateLimit | ErrorKind::ProviderTimeout | ErrorKind::ProviderUnavailable => {
            Classification::Retryable
        }
        ErrorKind::ProviderAuthError => Classification::Fatal,
        _ => classify_message(&err.message),
    }
}

fn classify_message(message: &str) -> Classification {
    let lower = message.to_lowercase();
    if FATAL_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return Classification::Fatal;
    }
    if RETRYABLE_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return Classification::Retryable;
    }
    // Unknown errors default to retryable: an unrecognized subprocess
    // failure is more often transient (crash, truncated output) than
    // a permanent rejection.
    Classification::Retryable
}

/// Per-provider retry policy: a fixed attempt budget with exponential
/// backoff between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, attempt: u32, classification: Classification) -> bool {
        classification == Classification::Retryable && attempt < self.max_attempts
    }

    /// Exponential backoff: `base * 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let scaled = self.base_delay.saturating_mul(factor);
        scaled.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_error_kind_is_retryable() {
        let err = Error::provider_rate_limit("p1");
        assert_eq!(classify(&err), Classification::Retryable);
    }

    #[test]
    fn auth_error_kind_is_fatal() {
        let err = Error::provider_auth_error("p1", "bad key");
        assert_eq!(classify(&err), Classification::Fatal);
    }

    #[test]
    fn message_substring_classifies_opaque_errors() {
        let err = Error::provider_exec_error("p1", "Permission denied reading socket");
        assert_eq!(classify(&err), Classification::Fatal);

        let err2 = Error::provider_exec_error("p1", "connection reset by peer");
        assert_eq!(classify(&err2), Classification::Retryable);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500)); // capped
    }

    #[test]
    fn should_retry_respects_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0, Classification::Retryable));
        assert!(!policy.should_retry(3, Classification::Retryable));
        assert!(!policy.should_retry(0, Classification::Fatal));
    }
}

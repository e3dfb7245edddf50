//! Per-connection settings.

use std::time::Duration;

use crate::{codec::RecoveryPolicy, correlation::DEFAULT_REQUEST_TIMEOUT};

/// Settings applied to every connection of an endpoint.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use packetwire::{codec::RecoveryPolicy, connection::ConnectionConfig};
///
/// let config = ConnectionConfig::default()
///     .request_timeout(Duration::from_secs(2))
///     .violation_policy(RecoveryPolicy::Disconnect);
/// assert_eq!(config.get_request_timeout(), Duration::from_secs(2));
/// assert_eq!(config.get_violation_policy(), RecoveryPolicy::Disconnect);
/// assert!(config.get_zero_copy());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    request_timeout: Duration,
    violation_policy: RecoveryPolicy,
    zero_copy: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            violation_policy: RecoveryPolicy::Drop,
            zero_copy: true,
        }
    }
}

impl ConnectionConfig {
    /// Timeout used by requests that do not pass their own.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// How protocol violations are handled.
    ///
    /// [`RecoveryPolicy::Drop`] logs the violation, discards the frame, and
    /// keeps the connection open. [`RecoveryPolicy::Disconnect`] closes it.
    #[must_use]
    pub fn violation_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.violation_policy = policy;
        self
    }

    /// Whether inbound frames are sliced out of the read buffer rather than
    /// copied.
    #[must_use]
    pub fn zero_copy(mut self, enabled: bool) -> Self {
        self.zero_copy = enabled;
        self
    }

    /// Configured request timeout.
    #[must_use]
    pub const fn get_request_timeout(&self) -> Duration { self.request_timeout }

    /// Configured protocol-violation policy.
    #[must_use]
    pub const fn get_violation_policy(&self) -> RecoveryPolicy { self.violation_policy }

    /// Whether zero-copy framing is enabled.
    #[must_use]
    pub const fn get_zero_copy(&self) -> bool { self.zero_copy }
}
